//! Checkpoint table access.

use sqlx::PgPool;

/// Stored cursor for a `(tenant, user, device, scope)` key, defaulting to
/// zero when none was ever written.
pub async fn get_checkpoint(
    pool: &PgPool,
    tenant_id: &str,
    user_id: &str,
    device_id: &str,
    scope: &str,
) -> Result<i64, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT cursor_seq FROM checkpoints
        WHERE tenant_id = $1 AND user_id = $2 AND device_id = $3 AND scope = $4
        "#,
    )
    .bind(tenant_id)
    .bind(user_id)
    .bind(device_id)
    .bind(scope)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(cursor,)| cursor).unwrap_or(0))
}

/// Persist a cursor for the exact `(tenant, user, device, scope)` key.
pub async fn set_checkpoint(
    pool: &PgPool,
    tenant_id: &str,
    user_id: &str,
    device_id: &str,
    scope: &str,
    cursor_seq: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO checkpoints (tenant_id, user_id, device_id, scope, cursor_seq)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (tenant_id, user_id, device_id, scope) DO UPDATE SET
            cursor_seq = EXCLUDED.cursor_seq,
            updated_at = now()
        "#,
    )
    .bind(tenant_id)
    .bind(user_id)
    .bind(device_id)
    .bind(scope)
    .bind(cursor_seq)
    .execute(pool)
    .await?;

    Ok(())
}
