//! Sync endpoint routes.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use tidemark_engine::{PullBundle, PullRequest, PushBatch, PushOutcome, SyncRecord};

use crate::auth::SyncPrincipal;
use crate::error::Result;
use crate::handlers::{
    handle_create_tenant, handle_get_record, handle_need_list, handle_pull, handle_push,
    handle_register_blobs, CreateTenantRequest, CreateTenantResponse, NeedListRequest,
    NeedListResponse, RegisterBlobsRequest, RegisterBlobsResponse,
};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/push", post(push_handler))
        .route("/sync/pull", post(pull_handler))
        .route("/sync/records/{entity_type}/{entity_id}", get(record_handler))
        .route("/sync/blobs/need-list", post(need_list_handler))
        .route("/sync/blobs", put(register_blobs_handler))
        .route("/tenants", post(create_tenant_handler))
}

/// POST /sync/push - apply a device's mutation batch.
async fn push_handler(
    State(state): State<AppState>,
    SyncPrincipal(principal): SyncPrincipal,
    Json(batch): Json<PushBatch>,
) -> Result<Json<PushOutcome>> {
    let outcome = handle_push(&state, &principal, batch).await?;
    Ok(Json(outcome))
}

/// POST /sync/pull - serve new change entries to a device.
async fn pull_handler(
    State(state): State<AppState>,
    SyncPrincipal(principal): SyncPrincipal,
    Json(request): Json<PullRequest>,
) -> Result<Json<PullBundle>> {
    let bundle = handle_pull(&state, &principal, request).await?;
    Ok(Json(bundle))
}

/// GET /sync/records/{entityType}/{entityId} - current projected state.
async fn record_handler(
    State(state): State<AppState>,
    SyncPrincipal(principal): SyncPrincipal,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Json<SyncRecord>> {
    let record = handle_get_record(&state, &principal, &entity_type, &entity_id).await?;
    Ok(Json(record))
}

/// POST /sync/blobs/need-list - which content ids are missing server-side.
async fn need_list_handler(
    State(state): State<AppState>,
    SyncPrincipal(principal): SyncPrincipal,
    Json(request): Json<NeedListRequest>,
) -> Result<Json<NeedListResponse>> {
    let response = handle_need_list(&state, &principal, request).await?;
    Ok(Json(response))
}

/// PUT /sync/blobs - record content ids as present.
async fn register_blobs_handler(
    State(state): State<AppState>,
    SyncPrincipal(principal): SyncPrincipal,
    Json(request): Json<RegisterBlobsRequest>,
) -> Result<Json<RegisterBlobsResponse>> {
    let response = handle_register_blobs(&state, &principal, request).await?;
    Ok(Json(response))
}

/// POST /tenants - provision a tenant (privileged).
async fn create_tenant_handler(
    State(state): State<AppState>,
    SyncPrincipal(principal): SyncPrincipal,
    Json(request): Json<CreateTenantRequest>,
) -> Result<Json<CreateTenantResponse>> {
    let response = handle_create_tenant(&state, &principal, request).await?;
    Ok(Json(response))
}
