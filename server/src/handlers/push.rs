//! Push handler - applies incoming mutation batches idempotently.

use crate::db;
use crate::error::Result;
use crate::AppState;
use chrono::{SecondsFormat, Utc};
use tidemark_engine::scope::Principal;
use tidemark_engine::{validate, PushBatch, PushOutcome, RejectCode, RejectedEvent, SyncEvent};

/// How a single event settled.
enum Applied {
    Accepted,
    Replayed,
}

/// Process a push request from a device.
///
/// The whole batch runs under the tenant's writer lock, so sequence
/// assignment is serialized per tenant while other tenants push in
/// parallel. Each event applies in its own transaction: a storage failure
/// rejects that event alone, leaves already-applied siblings in place, and
/// keeps the batch marker unwritten so the client's retry reprocesses the
/// remainder (the per-event guard skips what already landed).
pub async fn handle_push(
    state: &AppState,
    principal: &Principal,
    batch: PushBatch,
) -> Result<PushOutcome> {
    validate::validate_batch(&batch)?;

    let _writer = state.tenant_locks.acquire(&principal.tenant_id).await;

    if !db::tenant_exists(&state.pool, &principal.tenant_id).await? {
        return Err(tidemark_engine::Error::TenantNotFound(principal.tenant_id.clone()).into());
    }

    // Batch-level replay guard: the fast path for a lost acknowledgment
    if db::batch_processed(&state.pool, &principal.tenant_id, &batch.device_id, &batch.batch_id)
        .await?
    {
        let watermark = db::last_seq(&state.pool, &principal.tenant_id).await?;
        return Ok(PushOutcome::replayed(watermark as u64));
    }

    let received_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for event in &batch.events {
        match apply_event(state, principal, event, &received_at).await {
            Ok(Applied::Accepted) => accepted.push(event.event_id.clone()),
            Ok(Applied::Replayed) => rejected.push(RejectedEvent {
                event_id: event.event_id.clone(),
                code: RejectCode::IdempotentReplay,
                message: "event was already applied".into(),
            }),
            Err(e) => {
                tracing::error!("failed to apply event {}: {:?}", event.event_id, e);
                rejected.push(RejectedEvent {
                    event_id: event.event_id.clone(),
                    code: RejectCode::InternalError,
                    message: "storage failure".into(),
                });
            }
        }
    }

    // The batch marker is written only once every event was evaluated;
    // replay rejections count as evaluated, storage failures do not.
    let all_settled = rejected
        .iter()
        .all(|r| r.code == RejectCode::IdempotentReplay);
    if all_settled {
        db::mark_batch(&state.pool, &principal.tenant_id, &batch.device_id, &batch.batch_id)
            .await?;
    }

    let watermark = db::last_seq(&state.pool, &principal.tenant_id).await?;
    Ok(PushOutcome {
        replayed: false,
        accepted,
        rejected,
        server_watermark: watermark as u64,
    })
}

/// Apply one event in its own transaction: replay guard, projection
/// update, log append, and event marker commit or roll back together.
async fn apply_event(
    state: &AppState,
    principal: &Principal,
    event: &SyncEvent,
    received_at: &str,
) -> std::result::Result<Applied, sqlx::Error> {
    let mut tx = state.pool.begin().await?;

    db::lock_tenant(&mut tx, &principal.tenant_id).await?;

    if db::event_processed(&mut tx, &principal.tenant_id, &event.event_id).await? {
        return Ok(Applied::Replayed);
    }

    let occurred_at = event
        .occurred_at
        .clone()
        .unwrap_or_else(|| received_at.to_string());

    if event.body.is_delete() {
        db::delete_record(
            &mut tx,
            &principal.tenant_id,
            &event.entity_type,
            &event.entity_id,
            &occurred_at,
        )
        .await?;
    } else {
        db::upsert_record(
            &mut tx,
            &principal.tenant_id,
            &event.entity_type,
            &event.entity_id,
            event.body.data(),
            &occurred_at,
        )
        .await?;
    }

    let entry_id = uuid::Uuid::new_v4().to_string();
    db::append_entry(
        &mut tx,
        &principal.tenant_id,
        &entry_id,
        &event.entity_type,
        &event.entity_id,
        event.body.op_name(),
        event.body.data(),
        &occurred_at,
        Some(&principal.user_id),
    )
    .await?;

    db::mark_event(&mut tx, &principal.tenant_id, &event.event_id).await?;

    tx.commit().await?;
    Ok(Applied::Accepted)
}
