//! Tenant registry access.

use sqlx::{PgPool, Postgres, Transaction};

/// Register a tenant. Returns false if it already existed.
pub async fn create_tenant(pool: &PgPool, tenant_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"INSERT INTO tenants (tenant_id) VALUES ($1) ON CONFLICT DO NOTHING"#)
        .bind(tenant_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Whether a tenant is registered.
pub async fn tenant_exists(pool: &PgPool, tenant_id: &str) -> Result<bool, sqlx::Error> {
    let result: (bool,) =
        sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM tenants WHERE tenant_id = $1)"#)
            .bind(tenant_id)
            .fetch_one(pool)
            .await?;

    Ok(result.0)
}

/// Take the tenant's row lock for the rest of the transaction.
///
/// All sequence assignment for a tenant happens under this lock, so two
/// concurrent applies can neither share a seq nor skip one, across any
/// number of server instances. Returns false for an unknown tenant.
pub async fn lock_tenant(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
) -> Result<bool, sqlx::Error> {
    let row: Option<(String,)> =
        sqlx::query_as(r#"SELECT tenant_id FROM tenants WHERE tenant_id = $1 FOR UPDATE"#)
            .bind(tenant_id)
            .fetch_optional(&mut **tx)
            .await?;

    Ok(row.is_some())
}
