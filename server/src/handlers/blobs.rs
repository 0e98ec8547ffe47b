//! Blob manifest handlers - the need-list contract.
//!
//! Clients ask which content identifiers the server does not yet hold and
//! ship only those; the byte transfer itself happens outside this service.

use crate::db;
use crate::error::Result;
use crate::AppState;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tidemark_engine::scope::Principal;

/// Request body for a need-list query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedListRequest {
    pub content_ids: Vec<String>,
}

/// Response for a need-list query.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedListResponse {
    /// Content ids not yet present server-side, input order preserved
    pub missing: Vec<String>,
}

/// Request body for registering manifest entries.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBlobsRequest {
    pub content_ids: Vec<String>,
}

/// Response for registering manifest entries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBlobsResponse {
    /// How many ids were newly recorded
    pub registered: u64,
}

/// Answer which of the given content ids the tenant's manifest lacks.
pub async fn handle_need_list(
    state: &AppState,
    principal: &Principal,
    request: NeedListRequest,
) -> Result<NeedListResponse> {
    if !db::tenant_exists(&state.pool, &principal.tenant_id).await? {
        return Err(tidemark_engine::Error::TenantNotFound(principal.tenant_id.clone()).into());
    }

    let present: HashSet<String> =
        db::present_content_ids(&state.pool, &principal.tenant_id, &request.content_ids)
            .await?
            .into_iter()
            .collect();

    let mut seen = HashSet::new();
    let missing = request
        .content_ids
        .into_iter()
        .filter(|id| !present.contains(id) && seen.insert(id.clone()))
        .collect();

    Ok(NeedListResponse { missing })
}

/// Record content ids as present in the tenant's manifest.
pub async fn handle_register_blobs(
    state: &AppState,
    principal: &Principal,
    request: RegisterBlobsRequest,
) -> Result<RegisterBlobsResponse> {
    if !db::tenant_exists(&state.pool, &principal.tenant_id).await? {
        return Err(tidemark_engine::Error::TenantNotFound(principal.tenant_id.clone()).into());
    }

    let registered =
        db::register_content_ids(&state.pool, &principal.tenant_id, &request.content_ids).await?;

    Ok(RegisterBlobsResponse { registered })
}
