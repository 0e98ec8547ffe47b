//! Principal extraction from incoming requests.

mod middleware;

pub use middleware::*;
