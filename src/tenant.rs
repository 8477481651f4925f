//! Tenant entity and repository contract. The core only reads tenant rows;
//! provisioning and updates belong to an external admin flow.

use crate::error::TenancyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// One tenant row. `id` is positive, stable, and never reused. At least one
/// of `subdomain`/`domain` must be set for host-based identification to find
/// the row; path/header identification only needs the id.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantRecord {
    pub id: i64,
    /// Unique, lowercase alphanumeric-with-hyphens, 2-50 chars.
    #[serde(default)]
    pub subdomain: Option<String>,
    /// Unique full hostname, matched verbatim against the request host.
    #[serde(default)]
    pub domain: Option<String>,
    pub name: String,
    pub is_active: bool,
    /// Opaque per-tenant settings blob; flattened by the settings adapter.
    #[serde(default)]
    pub settings: serde_json::Value,
    /// Connection fields for an optional dedicated database.
    #[serde(default)]
    pub db_host: Option<String>,
    #[serde(default)]
    pub db_username: Option<String>,
    #[serde(default)]
    pub db_password: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TenantRecord {
    /// Minimal active record for tests and seed data.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        TenantRecord {
            id,
            subdomain: None,
            domain: None,
            name: name.into(),
            is_active: true,
            settings: serde_json::Value::Null,
            db_host: None,
            db_username: None,
            db_password: None,
            db_name: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Read-only lookup contract over the tenant registry.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<TenantRecord>, TenancyError>;
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantRecord>, TenancyError>;
    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>, TenancyError>;
    /// Active tenants ordered by id; drives the batch sweep.
    async fn list_active(&self) -> Result<Vec<TenantRecord>, TenancyError>;
}

/// In-memory registry. Used by tests and by deployments small enough to load
/// the whole registry up front.
#[derive(Default)]
pub struct InMemoryTenantRepository {
    by_id: RwLock<HashMap<i64, TenantRecord>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenants(tenants: impl IntoIterator<Item = TenantRecord>) -> Self {
        let repo = Self::new();
        for t in tenants {
            repo.insert(t);
        }
        repo
    }

    pub fn insert(&self, tenant: TenantRecord) {
        self.by_id
            .write()
            .expect("tenant registry lock poisoned")
            .insert(tenant.id, tenant);
    }

    pub fn is_empty(&self) -> bool {
        self.by_id
            .read()
            .expect("tenant registry lock poisoned")
            .is_empty()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<TenantRecord>, TenancyError> {
        let map = self.by_id.read().expect("tenant registry lock poisoned");
        Ok(map.get(&id).cloned())
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantRecord>, TenancyError> {
        let map = self.by_id.read().expect("tenant registry lock poisoned");
        Ok(map
            .values()
            .find(|t| t.subdomain.as_deref() == Some(subdomain))
            .cloned())
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantRecord>, TenancyError> {
        let map = self.by_id.read().expect("tenant registry lock poisoned");
        Ok(map
            .values()
            .find(|t| t.domain.as_deref() == Some(domain))
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<TenantRecord>, TenancyError> {
        let map = self.by_id.read().expect("tenant registry lock poisoned");
        let mut out: Vec<TenantRecord> = map.values().filter(|t| t.is_active).cloned().collect();
        out.sort_by_key(|t| t.id);
        Ok(out)
    }
}
