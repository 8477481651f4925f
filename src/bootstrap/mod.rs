//! Subsystem boot/shutdown orchestration around a tenant change.

pub mod adapters;

pub use adapters::*;

use crate::context::TenantContext;
use crate::error::TenancyError;
use crate::events::{EventSink, TenancyEvent};
use crate::tenant::{TenantRecord, TenantRepository};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One reconfigurable subsystem. Adapters are independent of each other and
/// must tolerate `boot` with no tenant (reset to the unscoped state) and
/// `shutdown` without a prior boot.
pub trait SubsystemAdapter: Send + Sync {
    fn boot(
        &mut self,
        tenant_id: Option<i64>,
        tenant: Option<&TenantRecord>,
    ) -> Result<(), TenancyError>;

    fn shutdown(&mut self) -> Result<(), TenancyError>;
}

/// Boots registered adapters in order when the tenant in context changes and
/// reverses them on shutdown. One adapter's failure never aborts the rest:
/// a cache that cannot be prefixed must not stop logging context or table
/// isolation from being set correctly.
pub struct SubsystemOrchestrator {
    adapters: Vec<(String, Box<dyn SubsystemAdapter>)>,
    /// None = never booted; Some(None) = booted with no tenant.
    last_booted: Option<Option<i64>>,
    /// Last-known record, kept for the ended event.
    last_tenant: Option<TenantRecord>,
    errors: BTreeMap<String, String>,
    events: Arc<dyn EventSink>,
}

impl SubsystemOrchestrator {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        SubsystemOrchestrator {
            adapters: Vec::new(),
            last_booted: None,
            last_tenant: None,
            errors: BTreeMap::new(),
            events,
        }
    }

    /// Adapters run in registration order. The session adapter must be
    /// registered (and thus boot) before anything opens a session store;
    /// the orchestrator cannot see store opens, so ordering is a caller
    /// obligation.
    pub fn register_adapter(&mut self, name: impl Into<String>, adapter: Box<dyn SubsystemAdapter>) {
        self.adapters.push((name.into(), adapter));
    }

    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Boot against the tenant currently in context. No-op when that tenant
    /// id (including the no-tenant id) matches the last booted one, so the
    /// pipeline may call this freely at several points in a request.
    pub fn boot(&mut self, context: &TenantContext) {
        let current = context.tenant_id();
        if self.last_booted == Some(current) {
            return;
        }
        self.errors.clear();
        let tenant = context.tenant();
        for (name, adapter) in &mut self.adapters {
            if let Err(e) = adapter.boot(current, tenant) {
                let message = error_message(e);
                tracing::error!(adapter = %name, error = %message, "subsystem boot failed");
                self.errors.insert(name.clone(), message);
            }
        }
        self.last_booted = Some(current);
        self.last_tenant = tenant.cloned();
        if let (Some(tenant_id), Some(t)) = (current, tenant) {
            self.events.emit(TenancyEvent::TenancyInitialized {
                tenant_id,
                tenant: t.clone(),
            });
        }
    }

    /// Tear adapters down. The ended event goes out first so listeners can
    /// still see what they are cleaning up after. Idempotent; safe without
    /// a prior boot.
    pub fn shutdown(&mut self) {
        self.events.emit(TenancyEvent::TenancyEnded {
            tenant_id: self.last_booted.flatten(),
            tenant: self.last_tenant.clone(),
        });
        for (name, adapter) in &mut self.adapters {
            if let Err(e) = adapter.shutdown() {
                let message = error_message(e);
                tracing::error!(adapter = %name, error = %message, "subsystem shutdown failed");
                self.errors.insert(name.clone(), message);
            }
        }
        self.last_booted = None;
        self.last_tenant = None;
        self.errors.clear();
    }

    /// Force a boot cycle for a specific tenant id, bypassing the no-op
    /// guard. For batch/CLI work reproducing request-time isolation without
    /// an HTTP host.
    pub async fn boot_for_tenant(
        &mut self,
        context: &mut TenantContext,
        repository: &dyn TenantRepository,
        id: i64,
    ) -> Result<(), TenancyError> {
        context.resolve_by_id(repository, id).await?;
        self.last_booted = None;
        self.boot(context);
        Ok(())
    }

    pub fn was_successful(&self) -> bool {
        self.last_booted.is_some() && self.errors.is_empty()
    }

    /// Per-boot-cycle failures, keyed by adapter name.
    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn last_booted_tenant(&self) -> Option<i64> {
        self.last_booted.flatten()
    }
}

fn error_message(e: TenancyError) -> String {
    match e {
        TenancyError::Adapter { message, .. } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use crate::tenant::InMemoryTenantRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingAdapter {
        boots: Arc<AtomicUsize>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl SubsystemAdapter for CountingAdapter {
        fn boot(&mut self, _id: Option<i64>, _t: Option<&TenantRecord>) -> Result<(), TenancyError> {
            self.boots.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown(&mut self) -> Result<(), TenancyError> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingAdapter;

    impl SubsystemAdapter for FailingAdapter {
        fn boot(&mut self, _id: Option<i64>, _t: Option<&TenantRecord>) -> Result<(), TenancyError> {
            Err(TenancyError::adapter("broken", "disk full"))
        }

        fn shutdown(&mut self) -> Result<(), TenancyError> {
            Ok(())
        }
    }

    /// Writes interleaved markers so event-vs-teardown ordering is visible.
    struct SeqAdapter {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl SubsystemAdapter for SeqAdapter {
        fn boot(&mut self, _id: Option<i64>, _t: Option<&TenantRecord>) -> Result<(), TenancyError> {
            self.log.lock().unwrap().push("adapter:boot".into());
            Ok(())
        }

        fn shutdown(&mut self) -> Result<(), TenancyError> {
            self.log.lock().unwrap().push("adapter:shutdown".into());
            Ok(())
        }
    }

    struct SeqSink {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl EventSink for SeqSink {
        fn emit(&self, event: TenancyEvent) {
            let tag = match event {
                TenancyEvent::TenancyInitialized { .. } => "event:initialized",
                TenancyEvent::TenancyEnded { .. } => "event:ended",
                TenancyEvent::TamperDetected { .. } => "event:tamper",
            };
            self.log.lock().unwrap().push(tag.into());
        }
    }

    fn counting_orchestrator(
        events: Arc<dyn EventSink>,
    ) -> (SubsystemOrchestrator, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let boots = Arc::new(AtomicUsize::new(0));
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let mut orch = SubsystemOrchestrator::new(events);
        orch.register_adapter(
            "counting",
            Box::new(CountingAdapter {
                boots: boots.clone(),
                shutdowns: shutdowns.clone(),
            }),
        );
        (orch, boots, shutdowns)
    }

    fn resolved_context(id: i64) -> TenantContext {
        let mut ctx = TenantContext::new("example.com");
        ctx.set_tenant(TenantRecord::new(id, format!("Tenant {}", id)), None);
        ctx
    }

    #[test]
    fn boot_is_idempotent_until_tenant_changes() {
        let (mut orch, boots, _) = counting_orchestrator(Arc::new(MemorySink::new()));
        let ctx = resolved_context(1);

        orch.boot(&ctx);
        orch.boot(&ctx);
        assert_eq!(boots.load(Ordering::SeqCst), 1);

        let ctx2 = resolved_context(2);
        orch.boot(&ctx2);
        assert_eq!(boots.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn no_tenant_boot_is_also_guarded() {
        let (mut orch, boots, _) = counting_orchestrator(Arc::new(MemorySink::new()));
        let ctx = TenantContext::new("example.com");

        orch.boot(&ctx);
        orch.boot(&ctx);
        assert_eq!(boots.load(Ordering::SeqCst), 1);
        assert!(orch.was_successful());
    }

    #[test]
    fn one_failure_does_not_stop_remaining_adapters() {
        let sink = Arc::new(MemorySink::new());
        let boots = Arc::new(AtomicUsize::new(0));
        let mut orch = SubsystemOrchestrator::new(sink);
        orch.register_adapter("broken", Box::new(FailingAdapter));
        orch.register_adapter(
            "counting",
            Box::new(CountingAdapter {
                boots: boots.clone(),
                shutdowns: Arc::new(AtomicUsize::new(0)),
            }),
        );

        orch.boot(&resolved_context(1));

        assert_eq!(boots.load(Ordering::SeqCst), 1);
        assert!(!orch.was_successful());
        assert_eq!(orch.errors().len(), 1);
        assert_eq!(orch.errors()["broken"], "disk full");
    }

    #[test]
    fn successful_boot_emits_initialized_with_tenant() {
        let sink = Arc::new(MemorySink::new());
        let (mut orch, _, _) = counting_orchestrator(sink.clone());

        orch.boot(&TenantContext::new("example.com"));
        assert!(sink.take().is_empty(), "no event without a tenant");

        orch.boot(&resolved_context(5));
        let events = sink.take();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            TenancyEvent::TenancyInitialized { tenant_id: 5, tenant } if tenant.id == 5
        ));
    }

    #[test]
    fn shutdown_emits_ended_before_teardown() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut orch = SubsystemOrchestrator::new(Arc::new(SeqSink { log: log.clone() }));
        orch.register_adapter("seq", Box::new(SeqAdapter { log: log.clone() }));

        orch.boot(&resolved_context(1));
        orch.shutdown();

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec![
                "adapter:boot".to_string(),
                "event:initialized".to_string(),
                "event:ended".to_string(),
                "adapter:shutdown".to_string(),
            ]
        );
    }

    #[test]
    fn shutdown_without_boot_is_safe_and_clears_state() {
        let sink = Arc::new(MemorySink::new());
        let (mut orch, _, shutdowns) = counting_orchestrator(sink.clone());

        orch.shutdown();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        let events = sink.take();
        assert!(matches!(
            &events[0],
            TenancyEvent::TenancyEnded { tenant_id: None, tenant: None }
        ));

        orch.shutdown();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shutdown_resets_the_noop_guard() {
        let (mut orch, boots, _) = counting_orchestrator(Arc::new(MemorySink::new()));
        let ctx = resolved_context(1);

        orch.boot(&ctx);
        orch.shutdown();
        orch.boot(&ctx);
        assert_eq!(boots.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn boot_for_tenant_bypasses_guard_for_same_id() {
        let repo = InMemoryTenantRepository::with_tenants([TenantRecord::new(4, "Four")]);
        let (mut orch, boots, _) = counting_orchestrator(Arc::new(MemorySink::new()));
        let mut ctx = TenantContext::new("example.com");

        orch.boot_for_tenant(&mut ctx, &repo, 4).await.unwrap();
        orch.boot_for_tenant(&mut ctx, &repo, 4).await.unwrap();

        assert_eq!(boots.load(Ordering::SeqCst), 2);
        assert_eq!(orch.last_booted_tenant(), Some(4));
    }

    #[tokio::test]
    async fn boot_for_tenant_surfaces_resolution_failures() {
        let repo = InMemoryTenantRepository::new();
        let (mut orch, boots, _) = counting_orchestrator(Arc::new(MemorySink::new()));
        let mut ctx = TenantContext::new("example.com");

        let err = orch.boot_for_tenant(&mut ctx, &repo, 9).await.unwrap_err();
        assert!(matches!(err, TenancyError::TenantNotFound(_)));
        assert_eq!(boots.load(Ordering::SeqCst), 0);
    }
}
