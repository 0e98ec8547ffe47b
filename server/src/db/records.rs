//! Materialized projection table access.

use sqlx::{PgPool, Postgres, Row, Transaction};
use tidemark_engine::{Fields, SyncRecord};

/// A stored projection row.
#[derive(Debug)]
pub struct StoredRecord {
    pub entity_type: String,
    pub entity_id: String,
    pub value: serde_json::Value,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            value: row.try_get("value")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl StoredRecord {
    /// Convert a database row into an engine sync record.
    pub fn into_record(self) -> SyncRecord {
        SyncRecord {
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            value: self.value.as_object().cloned().unwrap_or_default(),
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}

/// Apply an upsert: shallow-merge `data` over the current value (jsonb
/// `||` merges top-level keys only, matching the engine's merge), stamp
/// `updated_at`, and clear any tombstone — the entity was recreated.
pub async fn upsert_record(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    entity_type: &str,
    entity_id: &str,
    data: Option<&Fields>,
    occurred_at: &str,
) -> Result<(), sqlx::Error> {
    let data = data
        .map(|fields| serde_json::Value::Object(fields.clone()))
        .unwrap_or_else(|| serde_json::json!({}));

    sqlx::query(
        r#"
        INSERT INTO sync_records (
            tenant_id, entity_type, entity_id, value, updated_at, deleted_at
        )
        VALUES ($1, $2, $3, $4, $5, NULL)
        ON CONFLICT (tenant_id, entity_type, entity_id) DO UPDATE SET
            value = sync_records.value || EXCLUDED.value,
            updated_at = EXCLUDED.updated_at,
            deleted_at = NULL
        "#,
    )
    .bind(tenant_id)
    .bind(entity_type)
    .bind(entity_id)
    .bind(data)
    .bind(occurred_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Apply a delete: keep the last known value and stamp `deleted_at`.
/// Deleting an unknown entity stores an empty tombstone.
pub async fn delete_record(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    entity_type: &str,
    entity_id: &str,
    occurred_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_records (
            tenant_id, entity_type, entity_id, value, updated_at, deleted_at
        )
        VALUES ($1, $2, $3, '{}'::jsonb, $4, $4)
        ON CONFLICT (tenant_id, entity_type, entity_id) DO UPDATE SET
            updated_at = EXCLUDED.updated_at,
            deleted_at = EXCLUDED.deleted_at
        "#,
    )
    .bind(tenant_id)
    .bind(entity_type)
    .bind(entity_id)
    .bind(occurred_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Get a record by type and id, tombstones included.
pub async fn get_record(
    pool: &PgPool,
    tenant_id: &str,
    entity_type: &str,
    entity_id: &str,
) -> Result<Option<StoredRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT entity_type, entity_id, value, updated_at, deleted_at
        FROM sync_records
        WHERE tenant_id = $1 AND entity_type = $2 AND entity_id = $3
        "#,
    )
    .bind(tenant_id)
    .bind(entity_type)
    .bind(entity_id)
    .fetch_optional(pool)
    .await
}
