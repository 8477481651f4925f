//! Tenancy SDK: request-scoped multi-tenancy library.
//!
//! Resolves which tenant a request/job belongs to and makes downstream
//! subsystems (cache keys, storage paths, sessions, table naming, logging,
//! settings) behave as if running against that tenant's isolated slice.
//! Scoped operations fail closed: no tenant in context is an error, never a
//! silent fallback to shared data.

pub mod config;
pub mod error;
pub mod events;
pub mod tenant;
pub mod store;
pub mod identify;
pub mod context;
pub mod tables;
pub mod guard;
pub mod bootstrap;
pub mod scope;
pub mod sweep;
pub mod extractors;

pub use config::{resolve_base_domain, validate, IdentificationConfig, StrategyKind, TenancyConfig};
pub use context::TenantContext;
pub use error::{ConfigError, TenancyError};
pub use events::{EventSink, MemorySink, TenancyEvent, TracingSink};
pub use guard::{CallerIdentity, TamperGuard};
pub use identify::{strategy_from_config, IdentificationStrategy, RequestView, TenantKey};
pub use bootstrap::{SubsystemAdapter, SubsystemOrchestrator};
pub use scope::Tenancy;
pub use store::PgTenantRepository;
pub use sweep::{for_each_active_tenant, SweepReport};
pub use tables::TableNameResolver;
pub use tenant::{InMemoryTenantRepository, TenantRecord, TenantRepository};
