//! PostgreSQL-backed tenant registry. The registry table name comes from the
//! `TENANCY_REGISTRY_TABLE` env (default `tenants`) so deployments that keep
//! it in a dedicated schema can qualify it (e.g. `shared.tenants`).

use crate::error::TenancyError;
use crate::tenant::{TenantRecord, TenantRepository};
use async_trait::async_trait;
use sqlx::PgPool;

/// Registry table name from env `TENANCY_REGISTRY_TABLE`, default `tenants`.
/// Must be a valid (optionally schema-qualified) PostgreSQL identifier.
pub fn registry_table() -> String {
    std::env::var("TENANCY_REGISTRY_TABLE").unwrap_or_else(|_| "tenants".into())
}

const TENANT_COLUMNS: &str =
    "id, subdomain, domain, name, is_active, settings, db_host, db_username, db_password, db_name, created_at, updated_at";

pub struct PgTenantRepository {
    pool: PgPool,
    table: String,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        PgTenantRepository {
            pool,
            table: registry_table(),
        }
    }

    pub fn with_table(pool: PgPool, table: impl Into<String>) -> Self {
        PgTenantRepository {
            pool,
            table: table.into(),
        }
    }

    async fn find_one(&self, where_clause: &str, bind: BindArg<'_>) -> Result<Option<TenantRecord>, TenancyError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            TENANT_COLUMNS, self.table, where_clause
        );
        tracing::debug!(sql = %sql, "tenant lookup");
        let query = sqlx::query_as::<_, TenantRecord>(&sql);
        let query = match bind {
            BindArg::Id(id) => query.bind(id),
            BindArg::Text(s) => query.bind(s),
        };
        Ok(query.fetch_optional(&self.pool).await?)
    }
}

enum BindArg<'a> {
    Id(i64),
    Text(&'a str),
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<TenantRecord>, TenancyError> {
        self.find_one("id = $1", BindArg::Id(id)).await
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantRecord>, TenancyError> {
        self.find_one("subdomain = $1", BindArg::Text(subdomain)).await
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>, TenancyError> {
        self.find_one("domain = $1", BindArg::Text(domain)).await
    }

    async fn list_active(&self) -> Result<Vec<TenantRecord>, TenancyError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE is_active ORDER BY id",
            TENANT_COLUMNS, self.table
        );
        tracing::debug!(sql = %sql, "active tenant sweep");
        Ok(sqlx::query_as::<_, TenantRecord>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }
}
