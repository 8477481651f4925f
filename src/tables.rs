//! Tenant-scoped table naming: logical name -> physical name through a
//! format template, with a per-tenant cache and a template inverter.
//!
//! Resolution fails closed: a non-global name with no active tenant is an
//! error, never an unprefixed passthrough to a shared table.

use crate::config::{validate_template, TenancyConfig};
use crate::error::TenancyError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

struct ResolverState {
    template: String,
    pattern: Regex,
    active_tenant: Option<i64>,
    cache: HashMap<String, String>,
}

/// Cheaply cloneable handle; clones share the active tenant and cache, so
/// the table-isolation adapter and downstream readers see one state.
#[derive(Clone)]
pub struct TableNameResolver {
    inner: Arc<RwLock<ResolverState>>,
    global_tables: Arc<HashSet<String>>,
}

impl TableNameResolver {
    pub fn new(config: &TenancyConfig) -> Result<Self, TenancyError> {
        Self::with_template(
            &config.table_template,
            config.global_tables.iter().cloned(),
        )
    }

    pub fn with_template(
        template: &str,
        global_tables: impl IntoIterator<Item = String>,
    ) -> Result<Self, TenancyError> {
        validate_template(template)?;
        Ok(TableNameResolver {
            inner: Arc::new(RwLock::new(ResolverState {
                template: template.to_string(),
                pattern: compile_template(template),
                active_tenant: None,
                cache: HashMap::new(),
            })),
            global_tables: Arc::new(global_tables.into_iter().collect()),
        })
    }

    pub fn active_tenant(&self) -> Option<i64> {
        self.inner.read().expect("resolver lock poisoned").active_tenant
    }

    /// Switch the active tenant. A change drops every cached entry; a stale
    /// entry surviving into another tenant's request is the worst failure
    /// mode this resolver guards against.
    pub fn set_active_tenant(&self, tenant_id: Option<i64>) {
        let mut state = self.inner.write().expect("resolver lock poisoned");
        if state.active_tenant != tenant_id {
            state.cache.clear();
        }
        state.active_tenant = tenant_id;
    }

    /// Swap the format template; validates and drops the cache.
    pub fn set_template(&self, template: &str) -> Result<(), TenancyError> {
        validate_template(template)?;
        let mut state = self.inner.write().expect("resolver lock poisoned");
        state.template = template.to_string();
        state.pattern = compile_template(template);
        state.cache.clear();
        Ok(())
    }

    pub fn is_global(&self, logical: &str) -> bool {
        self.global_tables.contains(logical)
    }

    /// Logical -> physical. Global names pass through unchanged (the system
    /// cannot bootstrap if the registry or migration bookkeeping tables get
    /// prefixed). Everything else requires an active tenant.
    pub fn resolve(&self, logical: &str) -> Result<String, TenancyError> {
        if self.is_global(logical) {
            return Ok(logical.to_string());
        }
        {
            let state = self.inner.read().expect("resolver lock poisoned");
            if let Some(hit) = state.cache.get(logical) {
                return Ok(hit.clone());
            }
        }
        let mut state = self.inner.write().expect("resolver lock poisoned");
        let tenant_id = state.active_tenant.ok_or_else(|| {
            TenancyError::NoTenantContext(format!(
                "table '{}' cannot be resolved without an active tenant",
                logical
            ))
        })?;
        let physical = state
            .template
            .replace("{id}", &tenant_id.to_string())
            .replace("{table}", logical);
        state.cache.insert(logical.to_string(), physical.clone());
        Ok(physical)
    }

    pub fn resolve_many<S: AsRef<str>>(
        &self,
        logical: &[S],
    ) -> Result<HashMap<String, String>, TenancyError> {
        let mut out = HashMap::with_capacity(logical.len());
        for name in logical {
            let name = name.as_ref();
            out.insert(name.to_string(), self.resolve(name)?);
        }
        Ok(out)
    }

    /// Invert the template: the tenant id embedded in a physical name, or
    /// None when the string does not match the template shape.
    pub fn extract_tenant_id(&self, physical: &str) -> Option<i64> {
        let state = self.inner.read().expect("resolver lock poisoned");
        state
            .pattern
            .captures(physical)
            .and_then(|c| c.name("id"))
            .and_then(|m| m.as_str().parse::<i64>().ok())
    }
}

/// `{id}` becomes a numeric capture, `{table}` a greedy wildcard, literal
/// parts are escaped. Named groups keep the inversion independent of the
/// placeholder order in the template.
fn compile_template(template: &str) -> Regex {
    let escaped = regex::escape(template)
        .replace(r"\{id\}", r"(?P<id>\d+)")
        .replace(r"\{table\}", r"(?P<table>.+)");
    Regex::new(&format!("^{}$", escaped)).expect("template validated before compile")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TableNameResolver {
        TableNameResolver::with_template(
            "tenant_{id}_{table}",
            ["tenants".to_string(), "_sqlx_migrations".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn resolve_round_trips_through_extract() {
        let r = resolver();
        for id in [1_i64, 7, 424242, i64::MAX] {
            r.set_active_tenant(Some(id));
            let physical = r.resolve("invoices").unwrap();
            assert_eq!(physical, format!("tenant_{}_invoices", id));
            assert_eq!(r.extract_tenant_id(&physical), Some(id));
        }
    }

    #[test]
    fn no_context_fails_closed() {
        let r = resolver();
        let err = r.resolve("invoices").unwrap_err();
        assert!(matches!(err, TenancyError::NoTenantContext(_)));

        r.set_active_tenant(Some(3));
        r.set_active_tenant(None);
        assert!(r.resolve("invoices").is_err());
    }

    #[test]
    fn global_tables_pass_through() {
        let r = resolver();
        assert_eq!(r.resolve("tenants").unwrap(), "tenants");
        assert_eq!(r.resolve("_sqlx_migrations").unwrap(), "_sqlx_migrations");
        r.set_active_tenant(Some(5));
        assert_eq!(r.resolve("tenants").unwrap(), "tenants");
    }

    #[test]
    fn tenant_change_invalidates_cache() {
        let r = resolver();
        r.set_active_tenant(Some(1));
        assert_eq!(r.resolve("grades").unwrap(), "tenant_1_grades");
        r.set_active_tenant(Some(2));
        assert_eq!(r.resolve("grades").unwrap(), "tenant_2_grades");
    }

    #[test]
    fn template_change_invalidates_cache() {
        let r = resolver();
        r.set_active_tenant(Some(1));
        assert_eq!(r.resolve("grades").unwrap(), "tenant_1_grades");
        r.set_template("t{id}__{table}").unwrap();
        assert_eq!(r.resolve("grades").unwrap(), "t1__grades");
    }

    #[test]
    fn bad_template_rejected() {
        assert!(TableNameResolver::with_template("tenant_{id}", []).is_err());
        let r = resolver();
        assert!(r.set_template("{table} only").is_err());
    }

    #[test]
    fn extract_rejects_foreign_shapes() {
        let r = resolver();
        assert_eq!(r.extract_tenant_id("grades"), None);
        assert_eq!(r.extract_tenant_id("tenant_x_grades"), None);
        assert_eq!(r.extract_tenant_id("tenant_12"), None);
        assert_eq!(r.extract_tenant_id(""), None);
    }

    #[test]
    fn placeholder_order_does_not_matter_for_extract() {
        let r = TableNameResolver::with_template("{table}@{id}", []).unwrap();
        r.set_active_tenant(Some(88));
        let physical = r.resolve("ledger").unwrap();
        assert_eq!(physical, "ledger@88");
        assert_eq!(r.extract_tenant_id(&physical), Some(88));
    }

    #[test]
    fn resolve_many_maps_all_names() {
        let r = resolver();
        r.set_active_tenant(Some(4));
        let map = r.resolve_many(&["grades", "tenants"]).unwrap();
        assert_eq!(map["grades"], "tenant_4_grades");
        assert_eq!(map["tenants"], "tenants");
    }
}
