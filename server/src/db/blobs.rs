//! Blob manifest table access.
//!
//! Only the manifest/need-list contract lives here; blob bytes move
//! through a separate channel.

use sqlx::PgPool;

/// The subset of `content_ids` already present in the tenant's manifest.
pub async fn present_content_ids(
    pool: &PgPool,
    tenant_id: &str,
    content_ids: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT content_id FROM blob_manifest
        WHERE tenant_id = $1 AND content_id = ANY($2)
        "#,
    )
    .bind(tenant_id)
    .bind(content_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Record content ids as present. Returns how many were new.
pub async fn register_content_ids(
    pool: &PgPool,
    tenant_id: &str,
    content_ids: &[String],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO blob_manifest (tenant_id, content_id)
        SELECT $1, unnest($2::text[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(tenant_id)
    .bind(content_ids)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
