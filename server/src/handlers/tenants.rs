//! Tenant provisioning handler.
//!
//! Minimal surface for standing up a tenant; real installations drive
//! this from their admin plane.

use crate::db;
use crate::error::{AppError, Result};
use crate::AppState;
use serde::{Deserialize, Serialize};
use tidemark_engine::scope::Principal;

/// Request body for tenant creation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    pub tenant_id: String,
}

/// Response for tenant creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantResponse {
    pub tenant_id: String,
    pub created: bool,
}

/// Register a tenant. Requires a privileged caller.
pub async fn handle_create_tenant(
    state: &AppState,
    principal: &Principal,
    request: CreateTenantRequest,
) -> Result<CreateTenantResponse> {
    if !principal.is_privileged() {
        return Err(AppError::Unauthorized);
    }
    if request.tenant_id.is_empty() {
        return Err(AppError::BadRequest("tenantId must not be empty".into()));
    }

    let created = db::create_tenant(&state.pool, &request.tenant_id).await?;

    Ok(CreateTenantResponse {
        tenant_id: request.tenant_id,
        created,
    })
}
