//! Default subsystem adapters and the read handles downstream code keeps.
//!
//! Each adapter owns a cloneable handle; the scope hands clones to whatever
//! reads the subsystem (cache client, storage layer, request span). Handles
//! go back to their unscoped state on shutdown.

use crate::bootstrap::SubsystemAdapter;
use crate::error::TenancyError;
use crate::tables::TableNameResolver;
use crate::tenant::TenantRecord;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Wires the shared table resolver to the booted tenant.
pub struct TableIsolationAdapter {
    resolver: TableNameResolver,
}

impl TableIsolationAdapter {
    pub fn new(resolver: TableNameResolver) -> Self {
        TableIsolationAdapter { resolver }
    }
}

impl SubsystemAdapter for TableIsolationAdapter {
    fn boot(&mut self, tenant_id: Option<i64>, _tenant: Option<&TenantRecord>) -> Result<(), TenancyError> {
        self.resolver.set_active_tenant(tenant_id);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), TenancyError> {
        self.resolver.set_active_tenant(None);
        Ok(())
    }
}

/// Cache key prefix for the active tenant; empty in the unscoped state.
#[derive(Clone, Default)]
pub struct CachePrefix(Arc<RwLock<Option<String>>>);

impl CachePrefix {
    pub fn get(&self) -> Option<String> {
        self.0.read().expect("cache prefix lock poisoned").clone()
    }

    /// Prefix a cache key, or return it unchanged when no tenant is active.
    pub fn apply(&self, key: &str) -> String {
        match &*self.0.read().expect("cache prefix lock poisoned") {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn set(&self, value: Option<String>) {
        *self.0.write().expect("cache prefix lock poisoned") = value;
    }
}

pub struct CacheKeyPrefixAdapter {
    format: String,
    handle: CachePrefix,
}

impl CacheKeyPrefixAdapter {
    /// `format` must contain `{id}` (validated with the rest of the config).
    pub fn new(format: impl Into<String>, handle: CachePrefix) -> Self {
        CacheKeyPrefixAdapter {
            format: format.into(),
            handle,
        }
    }
}

impl SubsystemAdapter for CacheKeyPrefixAdapter {
    fn boot(&mut self, tenant_id: Option<i64>, _tenant: Option<&TenantRecord>) -> Result<(), TenancyError> {
        self.handle
            .set(tenant_id.map(|id| self.format.replace("{id}", &id.to_string())));
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), TenancyError> {
        self.handle.set(None);
        Ok(())
    }
}

/// Tenant-scoped filesystem path; shared by the storage and session
/// adapters, which differ only in root and directory creation policy.
#[derive(Clone, Default)]
pub struct ScopedPath(Arc<RwLock<Option<PathBuf>>>);

impl ScopedPath {
    pub fn get(&self) -> Option<PathBuf> {
        self.0.read().expect("scoped path lock poisoned").clone()
    }

    fn set(&self, value: Option<PathBuf>) {
        *self.0.write().expect("scoped path lock poisoned") = value;
    }
}

pub type StoragePath = ScopedPath;
pub type SessionPath = ScopedPath;

pub struct StoragePathAdapter {
    root: PathBuf,
    handle: StoragePath,
}

impl StoragePathAdapter {
    pub fn new(root: impl Into<PathBuf>, handle: StoragePath) -> Self {
        StoragePathAdapter {
            root: root.into(),
            handle,
        }
    }
}

impl SubsystemAdapter for StoragePathAdapter {
    fn boot(&mut self, tenant_id: Option<i64>, _tenant: Option<&TenantRecord>) -> Result<(), TenancyError> {
        match tenant_id {
            Some(id) => {
                let dir = self.root.join(format!("tenant_{}", id));
                std::fs::create_dir_all(&dir)
                    .map_err(|e| TenancyError::adapter("storage", format!("{}: {}", dir.display(), e)))?;
                self.handle.set(Some(dir));
            }
            None => self.handle.set(None),
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), TenancyError> {
        self.handle.set(None);
        Ok(())
    }
}

/// Session save path. Must boot before any session store is opened; the
/// orchestrator cannot enforce that, it is a caller obligation on adapter
/// ordering and pipeline layout.
pub struct SessionPathAdapter {
    root: PathBuf,
    handle: SessionPath,
}

impl SessionPathAdapter {
    pub fn new(root: impl Into<PathBuf>, handle: SessionPath) -> Self {
        SessionPathAdapter {
            root: root.into(),
            handle,
        }
    }
}

impl SubsystemAdapter for SessionPathAdapter {
    fn boot(&mut self, tenant_id: Option<i64>, _tenant: Option<&TenantRecord>) -> Result<(), TenancyError> {
        match tenant_id {
            Some(id) => {
                let dir = self.root.join(format!("tenant_{}", id));
                std::fs::create_dir_all(&dir)
                    .map_err(|e| TenancyError::adapter("session", format!("{}: {}", dir.display(), e)))?;
                self.handle.set(Some(dir));
            }
            None => self.handle.set(None),
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), TenancyError> {
        self.handle.set(None);
        Ok(())
    }
}

/// Ambient log-correlation value: a span carrying tenant id and name that
/// request handling can instrument work with.
#[derive(Clone, Default)]
pub struct LogContext(Arc<RwLock<Option<tracing::Span>>>);

impl LogContext {
    pub fn is_set(&self) -> bool {
        self.0.read().expect("log context lock poisoned").is_some()
    }

    /// The tenant span, or a disabled span outside a tenant scope.
    pub fn span(&self) -> tracing::Span {
        self.0
            .read()
            .expect("log context lock poisoned")
            .clone()
            .unwrap_or_else(tracing::Span::none)
    }

    fn set(&self, value: Option<tracing::Span>) {
        *self.0.write().expect("log context lock poisoned") = value;
    }
}

#[derive(Default)]
pub struct LoggingContextAdapter {
    handle: LogContext,
}

impl LoggingContextAdapter {
    pub fn new(handle: LogContext) -> Self {
        LoggingContextAdapter { handle }
    }
}

impl SubsystemAdapter for LoggingContextAdapter {
    fn boot(&mut self, tenant_id: Option<i64>, tenant: Option<&TenantRecord>) -> Result<(), TenancyError> {
        self.handle.set(match (tenant_id, tenant) {
            (Some(id), Some(t)) => Some(tracing::info_span!(
                "tenancy",
                tenant_id = id,
                tenant_name = %t.name
            )),
            _ => None,
        });
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), TenancyError> {
        self.handle.set(None);
        Ok(())
    }
}

/// The tenant's opaque settings blob flattened into dot-keyed entries for
/// the duration of the request.
#[derive(Clone, Default)]
pub struct TenantSettings(Arc<RwLock<HashMap<String, Value>>>);

impl TenantSettings {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .read()
            .expect("tenant settings lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().expect("tenant settings lock poisoned").is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .0
            .read()
            .expect("tenant settings lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn replace(&self, value: HashMap<String, Value>) {
        *self.0.write().expect("tenant settings lock poisoned") = value;
    }
}

#[derive(Default)]
pub struct SettingsMergeAdapter {
    handle: TenantSettings,
}

impl SettingsMergeAdapter {
    pub fn new(handle: TenantSettings) -> Self {
        SettingsMergeAdapter { handle }
    }
}

impl SubsystemAdapter for SettingsMergeAdapter {
    fn boot(&mut self, _tenant_id: Option<i64>, tenant: Option<&TenantRecord>) -> Result<(), TenancyError> {
        let mut flat = HashMap::new();
        if let Some(t) = tenant {
            flatten_settings(None, &t.settings, &mut flat);
        }
        self.handle.replace(flat);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), TenancyError> {
        self.handle.replace(HashMap::new());
        Ok(())
    }
}

/// Nested objects flatten into dot-joined keys; arrays and scalars are
/// terminal values.
fn flatten_settings(prefix: Option<&str>, value: &Value, out: &mut HashMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = match prefix {
                    Some(p) => format!("{}.{}", p, k),
                    None => k.clone(),
                };
                flatten_settings(Some(&key), v, out);
            }
        }
        Value::Null if prefix.is_none() => {}
        other => {
            if let Some(p) = prefix {
                out.insert(p.to_string(), other.clone());
            }
        }
    }
}
