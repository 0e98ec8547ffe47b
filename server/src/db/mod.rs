//! Database module for PostgreSQL persistence.
//!
//! Every query addresses its rows through a tenant-prefixed composite key;
//! there is no cross-tenant table scan anywhere in this module.

mod blobs;
mod changelog;
mod checkpoints;
mod idempotency;
mod pool;
mod records;
mod tenants;

pub use blobs::*;
pub use changelog::*;
pub use checkpoints::*;
pub use idempotency::*;
pub use pool::*;
pub use records::*;
pub use tenants::*;
