//! Request handlers for sync operations.

mod blobs;
mod pull;
mod push;
mod records;
mod tenants;

pub use blobs::*;
pub use pull::*;
pub use push::*;
pub use records::*;
pub use tenants::*;
