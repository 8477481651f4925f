//! Tenancy config types matching the deployment's JSON/TOML surface.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hardcoded safe default for the base domain, and the literal sentinel a
/// config value is checked against: a config entry equal to this string is
/// treated as unset so a misdeployed default never drives host matching.
pub const FALLBACK_BASE_DOMAIN: &str = "localhost";

/// Env override for the base domain; takes precedence over config.
pub const BASE_DOMAIN_ENV: &str = "TENANCY_BASE_DOMAIN";

/// Which identification strategy maps a request to a candidate tenant key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Subdomain,
    Domain,
    DomainOrSubdomain,
    Path,
    HeaderOrQuery,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentificationConfig {
    /// Priority chain; the first strategy yielding a key wins.
    #[serde(default = "default_chain")]
    pub chain: Vec<StrategyKind>,
    /// 1-indexed path segment consulted by the path strategy.
    #[serde(default = "default_segment_index")]
    pub path_segment_index: usize,
    /// Header consulted by header_or_query; None disables the header side.
    #[serde(default = "default_header_name")]
    pub header_name: Option<String>,
    /// Query parameter consulted by header_or_query; None disables it.
    #[serde(default = "default_query_param")]
    pub query_param: Option<String>,
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        IdentificationConfig {
            chain: default_chain(),
            path_segment_index: default_segment_index(),
            header_name: default_header_name(),
            query_param: default_query_param(),
        }
    }
}

fn default_chain() -> Vec<StrategyKind> {
    vec![StrategyKind::DomainOrSubdomain]
}

fn default_segment_index() -> usize {
    1
}

fn default_header_name() -> Option<String> {
    Some("X-Tenant".into())
}

fn default_query_param() -> Option<String> {
    Some("tenant".into())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Base domain for subdomain identification. Ignored when equal to
    /// [`FALLBACK_BASE_DOMAIN`]; see [`resolve_base_domain`].
    #[serde(default)]
    pub base_domain: Option<String>,
    #[serde(default)]
    pub identification: IdentificationConfig,
    /// Glob patterns matched against the request path; a match skips
    /// identification entirely (health checks, webhooks, asset routes).
    #[serde(default)]
    pub bypass_patterns: Vec<String>,
    /// Caller-supplied field names the tamper guard protects.
    #[serde(default = "default_protected_fields")]
    pub protected_fields: Vec<String>,
    /// Physical-name template; must contain `{id}` and `{table}` once each.
    #[serde(default = "default_table_template")]
    pub table_template: String,
    /// Logical names exempt from templating. The registry and migration
    /// bookkeeping tables must stay here or the system cannot bootstrap.
    #[serde(default = "default_global_tables")]
    pub global_tables: Vec<String>,
    /// Subsystem adapters to register, in boot order.
    #[serde(default = "default_adapters")]
    pub adapters: Vec<String>,
    /// Cache key prefix template; must contain `{id}`.
    #[serde(default = "default_cache_prefix_format")]
    pub cache_prefix_format: String,
    /// Root under which per-tenant storage directories are created.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    /// Root under which per-tenant session save paths are created.
    #[serde(default = "default_session_root")]
    pub session_root: PathBuf,
    /// true: resolution failures (not found / inactive) surface to the
    /// caller. false: they are logged and treated as "no tenant identified".
    #[serde(default)]
    pub strict_resolution: bool,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        TenancyConfig {
            base_domain: None,
            identification: IdentificationConfig::default(),
            bypass_patterns: Vec::new(),
            protected_fields: default_protected_fields(),
            table_template: default_table_template(),
            global_tables: default_global_tables(),
            adapters: default_adapters(),
            cache_prefix_format: default_cache_prefix_format(),
            storage_root: default_storage_root(),
            session_root: default_session_root(),
            strict_resolution: false,
        }
    }
}

fn default_protected_fields() -> Vec<String> {
    ["tenant_id", "organization_id", "school_id"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_table_template() -> String {
    "tenant_{id}_{table}".into()
}

fn default_global_tables() -> Vec<String> {
    vec![crate::store::registry_table(), "_sqlx_migrations".into()]
}

fn default_adapters() -> Vec<String> {
    ["tables", "cache", "storage", "session", "logging", "settings"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_cache_prefix_format() -> String {
    "tenant_{id}:".into()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("storage/tenants")
}

fn default_session_root() -> PathBuf {
    PathBuf::from("storage/sessions")
}

/// Base-domain precedence: explicit override, then env, then config (unless
/// it is exactly the fallback sentinel), then the fallback. The ordering is
/// load-bearing: a misconfigured default must never beat an operator
/// override, or every host resolves against the wrong domain.
pub fn resolve_base_domain(
    explicit: Option<&str>,
    env_value: Option<&str>,
    config_value: Option<&str>,
) -> String {
    if let Some(v) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
        return v.to_string();
    }
    if let Some(v) = env_value.map(str::trim).filter(|v| !v.is_empty()) {
        return v.to_string();
    }
    if let Some(v) = config_value.map(str::trim).filter(|v| !v.is_empty()) {
        if v != FALLBACK_BASE_DOMAIN {
            return v.to_string();
        }
    }
    FALLBACK_BASE_DOMAIN.to_string()
}

impl TenancyConfig {
    /// Resolve the effective base domain for this config, consulting the
    /// `TENANCY_BASE_DOMAIN` env. `explicit` wins over everything.
    pub fn effective_base_domain(&self, explicit: Option<&str>) -> String {
        let env_value = std::env::var(BASE_DOMAIN_ENV).ok();
        resolve_base_domain(explicit, env_value.as_deref(), self.base_domain.as_deref())
    }
}
