//! Tenancy lifecycle and security-audit events.

use crate::tenant::TenantRecord;
use serde::Serialize;
use std::sync::Mutex;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TenancyEvent {
    /// A boot cycle finished with an active tenant.
    TenancyInitialized {
        tenant_id: i64,
        tenant: TenantRecord,
    },
    /// Emitted before adapter teardown so listeners still see what they are
    /// cleaning up after. Fields are the last-known values; None when no
    /// tenant was ever booted.
    TenancyEnded {
        tenant_id: Option<i64>,
        tenant: Option<TenantRecord>,
    },
    /// A caller-supplied protected field disagreed with the resolved tenant.
    TamperDetected {
        field: String,
        provided_value: serde_json::Value,
        actual_tenant_id: i64,
        caller_id: String,
        path: String,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: TenancyEvent);
}

/// Default sink: structured log records via `tracing`.
#[derive(Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: TenancyEvent) {
        match &event {
            TenancyEvent::TenancyInitialized { tenant_id, tenant } => {
                tracing::info!(tenant_id, tenant_name = %tenant.name, "tenancy initialized");
            }
            TenancyEvent::TenancyEnded { tenant_id, .. } => {
                tracing::info!(?tenant_id, "tenancy ended");
            }
            TenancyEvent::TamperDetected {
                field,
                provided_value,
                actual_tenant_id,
                caller_id,
                path,
            } => {
                tracing::warn!(
                    %field,
                    %provided_value,
                    actual_tenant_id,
                    %caller_id,
                    %path,
                    "tenant field tamper detected"
                );
            }
        }
    }
}

/// Collects events in memory; for tests and introspection endpoints.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TenancyEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TenancyEvent> {
        self.events.lock().expect("event sink lock poisoned").clone()
    }

    pub fn take(&self) -> Vec<TenancyEvent> {
        std::mem::take(&mut *self.events.lock().expect("event sink lock poisoned"))
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: TenancyEvent) {
        self.events.lock().expect("event sink lock poisoned").push(event);
    }
}
