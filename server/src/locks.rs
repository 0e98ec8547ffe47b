//! Per-tenant writer serialization.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Funnels all applies for one tenant through a single writer while other
/// tenants proceed in parallel. The tenant row lock taken inside each
/// apply transaction backs this up across server instances; this
/// in-process lock keeps a whole batch contiguous and pushes contention
/// out of the database.
#[derive(Default)]
pub struct TenantLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TenantLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the writer lock for a tenant, creating it on first use.
    pub async fn acquire(&self, tenant_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
