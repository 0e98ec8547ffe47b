//! Idempotency ledger table access.
//!
//! Markers are write-once and never removed.

use sqlx::{PgPool, Postgres, Transaction};

/// Whether a batch from this device was already fully processed.
pub async fn batch_processed(
    pool: &PgPool,
    tenant_id: &str,
    device_id: &str,
    batch_id: &str,
) -> Result<bool, sqlx::Error> {
    let result: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM processed_batches
            WHERE tenant_id = $1 AND device_id = $2 AND batch_id = $3
        )
        "#,
    )
    .bind(tenant_id)
    .bind(device_id)
    .bind(batch_id)
    .fetch_one(pool)
    .await?;

    Ok(result.0)
}

/// Record a batch as processed.
pub async fn mark_batch(
    pool: &PgPool,
    tenant_id: &str,
    device_id: &str,
    batch_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO processed_batches (tenant_id, device_id, batch_id)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(tenant_id)
    .bind(device_id)
    .bind(batch_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Whether an event was already applied.
pub async fn event_processed(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    event_id: &str,
) -> Result<bool, sqlx::Error> {
    let result: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM processed_events
            WHERE tenant_id = $1 AND event_id = $2
        )
        "#,
    )
    .bind(tenant_id)
    .bind(event_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(result.0)
}

/// Record an event as applied, in the same transaction as its apply.
pub async fn mark_event(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    event_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO processed_events (tenant_id, event_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(tenant_id)
    .bind(event_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
