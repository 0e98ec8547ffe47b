//! Change log table access.

use sqlx::{PgPool, Postgres, Row, Transaction};
use tidemark_engine::{ChangeEntry, EventBody, Fields};

/// A stored change log row.
#[derive(Debug)]
pub struct StoredEntry {
    pub tenant_id: String,
    pub seq: i64,
    pub entry_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub op: String,
    pub data: Option<serde_json::Value>,
    pub occurred_at: String,
    pub actor_id: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredEntry {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEntry {
            tenant_id: row.try_get("tenant_id")?,
            seq: row.try_get("seq")?,
            entry_id: row.try_get("entry_id")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            op: row.try_get("op")?,
            data: row.try_get("data")?,
            occurred_at: row.try_get("occurred_at")?,
            actor_id: row.try_get("actor_id")?,
        })
    }
}

impl StoredEntry {
    /// Convert a database row into an engine change entry.
    pub fn into_entry(self) -> Result<ChangeEntry, String> {
        let body = match self.op.as_str() {
            "upsert" => EventBody::Upsert {
                data: self.data.as_ref().and_then(|v| v.as_object()).cloned(),
            },
            "delete" => EventBody::Delete,
            other => return Err(format!("unknown op: {other}")),
        };

        Ok(ChangeEntry {
            id: self.entry_id,
            tenant_id: self.tenant_id,
            seq: self.seq as u64,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            body,
            occurred_at: self.occurred_at,
            actor_id: self.actor_id,
        })
    }
}

/// Append an entry, assigning the next sequence number for the tenant.
///
/// The caller must hold the tenant row lock in the same transaction; under
/// it, `MAX(seq) + 1` is gapless and assigned exactly once.
#[allow(clippy::too_many_arguments)]
pub async fn append_entry(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    entry_id: &str,
    entity_type: &str,
    entity_id: &str,
    op: &str,
    data: Option<&Fields>,
    occurred_at: &str,
    actor_id: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let data = data.map(|fields| serde_json::Value::Object(fields.clone()));

    let result: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO change_log (
            tenant_id, seq, entry_id, entity_type, entity_id,
            op, data, occurred_at, actor_id
        )
        VALUES (
            $1,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM change_log WHERE tenant_id = $1),
            $2, $3, $4, $5, $6, $7, $8
        )
        RETURNING seq
        "#,
    )
    .bind(tenant_id)
    .bind(entry_id)
    .bind(entity_type)
    .bind(entity_id)
    .bind(op)
    .bind(data)
    .bind(occurred_at)
    .bind(actor_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(result.0)
}

/// Entries with `seq > since`, ascending, truncated to `limit`.
pub async fn entries_since(
    pool: &PgPool,
    tenant_id: &str,
    since: i64,
    limit: i64,
) -> Result<Vec<StoredEntry>, sqlx::Error> {
    sqlx::query_as::<_, StoredEntry>(
        r#"
        SELECT tenant_id, seq, entry_id, entity_type, entity_id,
               op, data, occurred_at, actor_id
        FROM change_log
        WHERE tenant_id = $1 AND seq > $2
        ORDER BY seq ASC
        LIMIT $3
        "#,
    )
    .bind(tenant_id)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Current watermark for a tenant; zero for an empty log.
pub async fn last_seq(pool: &PgPool, tenant_id: &str) -> Result<i64, sqlx::Error> {
    let result: (i64,) =
        sqlx::query_as(r#"SELECT COALESCE(MAX(seq), 0) FROM change_log WHERE tenant_id = $1"#)
            .bind(tenant_id)
            .fetch_one(pool)
            .await?;

    Ok(result.0)
}
