//! Record lookup handler - reads the materialized projection.

use crate::db;
use crate::error::{AppError, Result};
use crate::AppState;
use tidemark_engine::scope::Principal;
use tidemark_engine::SyncRecord;

/// Fetch the current projected state of one entity. Tombstones are
/// returned like any other record, with `deletedAt` set.
pub async fn handle_get_record(
    state: &AppState,
    principal: &Principal,
    entity_type: &str,
    entity_id: &str,
) -> Result<SyncRecord> {
    if !db::tenant_exists(&state.pool, &principal.tenant_id).await? {
        return Err(tidemark_engine::Error::TenantNotFound(principal.tenant_id.clone()).into());
    }

    db::get_record(&state.pool, &principal.tenant_id, entity_type, entity_id)
        .await?
        .map(db::StoredRecord::into_record)
        .ok_or_else(|| AppError::NotFound(format!("{entity_type}/{entity_id}")))
}
