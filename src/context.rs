//! Request-scoped tenant context: the canonical source of truth once
//! identification succeeds. Unresolved is a first-class state, not an error;
//! later code treats "no tenant" as "no filtering".

use crate::config::TenancyConfig;
use crate::error::TenancyError;
use crate::identify::TenantKey;
use crate::tenant::{TenantRecord, TenantRepository};

#[derive(Debug, Default)]
pub struct TenantContext {
    /// The resolved record. Holding the whole record behind one Option keeps
    /// the id and the record from ever disagreeing.
    tenant: Option<TenantRecord>,
    /// The subdomain/path segment/etc. that produced the match.
    resolved_key: Option<String>,
    detection_attempted: bool,
    base_domain: String,
}

impl TenantContext {
    pub fn new(base_domain: impl Into<String>) -> Self {
        TenantContext {
            base_domain: base_domain.into(),
            ..TenantContext::default()
        }
    }

    /// Context with the base domain resolved through the full precedence
    /// chain (explicit override, env, config, fallback).
    pub fn from_config(config: &TenancyConfig, explicit_base_domain: Option<&str>) -> Self {
        Self::new(config.effective_base_domain(explicit_base_domain))
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    pub fn tenant(&self) -> Option<&TenantRecord> {
        self.tenant.as_ref()
    }

    pub fn tenant_id(&self) -> Option<i64> {
        self.tenant.as_ref().map(|t| t.id)
    }

    pub fn resolved_key(&self) -> Option<&str> {
        self.resolved_key.as_deref()
    }

    pub fn detection_attempted(&self) -> bool {
        self.detection_attempted
    }

    pub fn is_resolved(&self) -> bool {
        self.tenant.is_some()
    }

    /// Record that identification ran and found no signal.
    pub fn mark_detection_attempted(&mut self) {
        self.detection_attempted = true;
    }

    /// The resolved tenant, or `NoTenantContext` for callers that cannot
    /// proceed without one.
    pub fn require_tenant(&self) -> Result<&TenantRecord, TenancyError> {
        self.tenant
            .as_ref()
            .ok_or_else(|| TenancyError::NoTenantContext("operation requires a resolved tenant".into()))
    }

    /// Direct assignment for callers that already hold a record (e.g. a
    /// queued job carrying its tenant).
    pub fn set_tenant(&mut self, tenant: TenantRecord, resolved_key: Option<String>) {
        self.detection_attempted = true;
        self.resolved_key = resolved_key;
        self.tenant = Some(tenant);
    }

    /// Back to Unresolved, unconditionally. Must run at the end of every
    /// unit of work; a context surviving into the next request is a
    /// cross-tenant leak.
    pub fn clear(&mut self) {
        self.tenant = None;
        self.resolved_key = None;
        self.detection_attempted = false;
    }

    /// Resolve a candidate key into a record. `TenantNotFound` when nothing
    /// matches, `TenantInactive` when the record is disabled; both are
    /// recoverable caller conditions, not internal bugs.
    pub async fn resolve_key(
        &mut self,
        repository: &dyn TenantRepository,
        key: &TenantKey,
    ) -> Result<&TenantRecord, TenancyError> {
        self.detection_attempted = true;
        let found = match key {
            TenantKey::Subdomain(s) => repository.find_by_subdomain(s).await?,
            TenantKey::Domain(d) => repository.find_by_domain(d).await?,
            TenantKey::DomainOrSubdomain { domain, subdomain } => {
                // Literal composite rule: full-domain match first, then an
                // unconditional fallback to the subdomain lookup.
                match repository.find_by_domain(domain).await? {
                    Some(t) => Some(t),
                    None => match subdomain {
                        Some(s) => repository.find_by_subdomain(s).await?,
                        None => None,
                    },
                }
            }
            TenantKey::Value(v) => match v.parse::<i64>() {
                Ok(id) if id > 0 => repository.find_by_id(id).await?,
                _ => repository.find_by_subdomain(v).await?,
            },
        };
        self.admit(found, key.to_string())
    }

    /// Resolve a concrete id; same failure modes as [`Self::resolve_key`].
    pub async fn resolve_by_id(
        &mut self,
        repository: &dyn TenantRepository,
        id: i64,
    ) -> Result<&TenantRecord, TenancyError> {
        self.detection_attempted = true;
        let found = repository.find_by_id(id).await?;
        self.admit(found, id.to_string())
    }

    fn admit(
        &mut self,
        found: Option<TenantRecord>,
        key: String,
    ) -> Result<&TenantRecord, TenancyError> {
        let tenant = found.ok_or_else(|| TenancyError::TenantNotFound(key.clone()))?;
        if !tenant.is_active {
            return Err(TenancyError::TenantInactive(key));
        }
        self.resolved_key = Some(key);
        Ok(self.tenant.insert(tenant))
    }
}
