//! Per-unit-of-work tenancy scope. One `Tenancy` is built per request, job,
//! or CLI invocation and owns every piece of mutable tenancy state: context,
//! table resolver, orchestrator, and the subsystem handles. Nothing here is
//! a process-wide static; concurrent units of work each own their scope.

use crate::bootstrap::{
    CacheKeyPrefixAdapter, CachePrefix, LogContext, LoggingContextAdapter, SessionPath,
    SessionPathAdapter, SettingsMergeAdapter, StoragePath, StoragePathAdapter,
    SubsystemOrchestrator, TableIsolationAdapter, TenantSettings,
};
use crate::config::{compile_glob, validate, TenancyConfig};
use crate::context::TenantContext;
use crate::error::TenancyError;
use crate::events::EventSink;
use crate::guard::{CallerIdentity, TamperGuard};
use crate::identify::{strategy_from_config, IdentificationStrategy, RequestView};
use crate::tables::TableNameResolver;
use crate::tenant::{TenantRecord, TenantRepository};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub struct Tenancy {
    config: Arc<TenancyConfig>,
    repository: Arc<dyn TenantRepository>,
    context: TenantContext,
    strategy: Box<dyn IdentificationStrategy>,
    bypass: Vec<Regex>,
    tables: TableNameResolver,
    cache_prefix: CachePrefix,
    storage_path: StoragePath,
    session_path: SessionPath,
    log_context: LogContext,
    settings: TenantSettings,
    guard: TamperGuard,
    orchestrator: SubsystemOrchestrator,
}

impl Tenancy {
    pub fn new(
        config: Arc<TenancyConfig>,
        repository: Arc<dyn TenantRepository>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, TenancyError> {
        Self::with_base_domain(config, repository, events, None)
    }

    /// `explicit_base_domain` wins over env and config (precedence lives in
    /// [`TenancyConfig::effective_base_domain`]).
    pub fn with_base_domain(
        config: Arc<TenancyConfig>,
        repository: Arc<dyn TenantRepository>,
        events: Arc<dyn EventSink>,
        explicit_base_domain: Option<&str>,
    ) -> Result<Self, TenancyError> {
        validate(&config)?;
        let base_domain = config.effective_base_domain(explicit_base_domain);

        let mut bypass = Vec::with_capacity(config.bypass_patterns.len());
        for pattern in &config.bypass_patterns {
            bypass.push(compile_glob(pattern)?);
        }

        let tables = TableNameResolver::new(&config)?;
        let cache_prefix = CachePrefix::default();
        let storage_path = StoragePath::default();
        let session_path = SessionPath::default();
        let log_context = LogContext::default();
        let settings = TenantSettings::default();

        let mut orchestrator = SubsystemOrchestrator::new(events.clone());
        for name in &config.adapters {
            match name.as_str() {
                "tables" => orchestrator
                    .register_adapter("tables", Box::new(TableIsolationAdapter::new(tables.clone()))),
                "cache" => orchestrator.register_adapter(
                    "cache",
                    Box::new(CacheKeyPrefixAdapter::new(
                        config.cache_prefix_format.clone(),
                        cache_prefix.clone(),
                    )),
                ),
                "storage" => orchestrator.register_adapter(
                    "storage",
                    Box::new(StoragePathAdapter::new(
                        config.storage_root.clone(),
                        storage_path.clone(),
                    )),
                ),
                "session" => orchestrator.register_adapter(
                    "session",
                    Box::new(SessionPathAdapter::new(
                        config.session_root.clone(),
                        session_path.clone(),
                    )),
                ),
                "logging" => orchestrator
                    .register_adapter("logging", Box::new(LoggingContextAdapter::new(log_context.clone()))),
                "settings" => orchestrator
                    .register_adapter("settings", Box::new(SettingsMergeAdapter::new(settings.clone()))),
                other => {
                    return Err(crate::error::ConfigError::UnknownAdapter(other.to_string()).into())
                }
            }
        }

        Ok(Tenancy {
            strategy: strategy_from_config(&config.identification, &base_domain),
            context: TenantContext::new(base_domain),
            guard: TamperGuard::new(&config, events),
            config,
            repository,
            bypass,
            tables,
            cache_prefix,
            storage_path,
            session_path,
            log_context,
            settings,
            orchestrator,
        })
    }

    /// Whether identification is skipped for this path.
    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass.iter().any(|re| re.is_match(path))
    }

    /// The whole request-entry sequence: bypass check, identification,
    /// resolution, subsystem boot. Returns the resolved record, or None when
    /// no tenant governs this request (bypass route, no signal, or a
    /// non-strict resolution miss). Subsystems are booted either way so they
    /// land in the matching scoped/unscoped state.
    pub async fn handle_request(
        &mut self,
        request: &RequestView,
    ) -> Result<Option<TenantRecord>, TenancyError> {
        if self.is_bypassed(&request.path) {
            // identification is skipped, not attempted; subsystems still
            // boot into the unscoped state
            self.orchestrator.boot(&self.context);
            return Ok(None);
        }

        let resolved = match self.strategy.identify(request) {
            None => {
                self.context.mark_detection_attempted();
                None
            }
            Some(key) => match self.context.resolve_key(self.repository.as_ref(), &key).await {
                Ok(tenant) => Some(tenant.clone()),
                Err(e @ (TenancyError::TenantNotFound(_) | TenancyError::TenantInactive(_))) => {
                    if self.config.strict_resolution {
                        return Err(e);
                    }
                    tracing::info!(key = %key, error = %e, "tenant resolution miss, continuing without tenant");
                    None
                }
                Err(e) => return Err(e),
            },
        };

        self.orchestrator.boot(&self.context);
        Ok(resolved)
    }

    /// Force request-time isolation for a specific tenant id; for batch/CLI
    /// work with no HTTP host.
    pub async fn boot_for_tenant(&mut self, id: i64) -> Result<(), TenancyError> {
        self.orchestrator
            .boot_for_tenant(&mut self.context, self.repository.as_ref(), id)
            .await
    }

    /// End of the unit of work: subsystem shutdown, then context clear. Must
    /// run before the scope is reused; a scope surviving a request with its
    /// context intact is a cross-tenant leak.
    pub fn finish(&mut self) {
        self.orchestrator.shutdown();
        self.context.clear();
    }

    /// Scrub a JSON body against the resolved tenant; no-op when no tenant
    /// is active (nothing to disagree with).
    pub fn scrub_body(
        &self,
        data: &mut Map<String, Value>,
        caller: &CallerIdentity,
        path: &str,
    ) -> usize {
        match self.context.tenant_id() {
            Some(id) => self.guard.scrub(id, data, caller, path),
            None => 0,
        }
    }

    /// Scrub a string parameter map; same contract as [`Self::scrub_body`].
    pub fn scrub_params(
        &self,
        params: &mut HashMap<String, String>,
        caller: &CallerIdentity,
        path: &str,
    ) -> usize {
        match self.context.tenant_id() {
            Some(id) => self.guard.scrub_params(id, params, caller, path),
            None => 0,
        }
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    pub fn repository(&self) -> &dyn TenantRepository {
        self.repository.as_ref()
    }

    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut TenantContext {
        &mut self.context
    }

    pub fn tables(&self) -> &TableNameResolver {
        &self.tables
    }

    pub fn cache_prefix(&self) -> &CachePrefix {
        &self.cache_prefix
    }

    pub fn storage_path(&self) -> &StoragePath {
        &self.storage_path
    }

    pub fn session_path(&self) -> &SessionPath {
        &self.session_path
    }

    pub fn log_context(&self) -> &LogContext {
        &self.log_context
    }

    pub fn settings(&self) -> &TenantSettings {
        &self.settings
    }

    pub fn guard(&self) -> &TamperGuard {
        &self.guard
    }

    pub fn was_successful(&self) -> bool {
        self.orchestrator.was_successful()
    }

    pub fn boot_errors(&self) -> &std::collections::BTreeMap<String, String> {
        self.orchestrator.errors()
    }
}
