//! Tamper guard: strips caller-supplied tenant-identifying fields that
//! disagree with the resolved context. Operates on the actual
//! request-accessible collections in place, so downstream code can never
//! observe a tampered value.

use crate::config::TenancyConfig;
use crate::events::{EventSink, TenancyEvent};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Who is making the request, as far as the auth layer told us. Carries the
/// superadmin-bypass signal this core consumes but does not define.
#[derive(Clone, Debug, Default)]
pub struct CallerIdentity {
    pub id: Option<String>,
    pub is_superadmin: bool,
}

impl CallerIdentity {
    pub fn guest() -> Self {
        CallerIdentity::default()
    }

    pub fn user(id: impl Into<String>) -> Self {
        CallerIdentity {
            id: Some(id.into()),
            is_superadmin: false,
        }
    }

    pub fn superadmin(id: impl Into<String>) -> Self {
        CallerIdentity {
            id: Some(id.into()),
            is_superadmin: true,
        }
    }

    fn audit_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| "guest".into())
    }
}

pub struct TamperGuard {
    protected_fields: Vec<String>,
    events: Arc<dyn EventSink>,
}

impl TamperGuard {
    pub fn new(config: &TenancyConfig, events: Arc<dyn EventSink>) -> Self {
        TamperGuard {
            protected_fields: config.protected_fields.clone(),
            events,
        }
    }

    pub fn with_fields(fields: Vec<String>, events: Arc<dyn EventSink>) -> Self {
        TamperGuard {
            protected_fields: fields,
            events,
        }
    }

    /// Scrub a JSON body in place. Every protected field whose value
    /// disagrees with the resolved tenant id is removed and audited; fields
    /// that agree are left alone. Superadmins bypass the guard. Returns the
    /// number of fields removed.
    pub fn scrub(
        &self,
        tenant_id: i64,
        data: &mut Map<String, Value>,
        caller: &CallerIdentity,
        path: &str,
    ) -> usize {
        if caller.is_superadmin {
            return 0;
        }
        let mut removed = 0;
        for field in &self.protected_fields {
            let mismatch = match data.get(field) {
                Some(v) => !value_matches_id(v, tenant_id),
                None => false,
            };
            if mismatch {
                let provided = data.remove(field).expect("checked present above");
                self.audit(field, provided, tenant_id, caller, path);
                removed += 1;
            }
        }
        removed
    }

    /// Scrub a string parameter map (query/form) in place; same contract as
    /// [`Self::scrub`].
    pub fn scrub_params(
        &self,
        tenant_id: i64,
        params: &mut HashMap<String, String>,
        caller: &CallerIdentity,
        path: &str,
    ) -> usize {
        if caller.is_superadmin {
            return 0;
        }
        let mut removed = 0;
        for field in &self.protected_fields {
            let mismatch = match params.get(field) {
                Some(v) => v.trim().parse::<i64>() != Ok(tenant_id),
                None => false,
            };
            if mismatch {
                let provided = params.remove(field).expect("checked present above");
                self.audit(field, Value::String(provided), tenant_id, caller, path);
                removed += 1;
            }
        }
        removed
    }

    fn audit(
        &self,
        field: &str,
        provided: Value,
        tenant_id: i64,
        caller: &CallerIdentity,
        path: &str,
    ) {
        self.events.emit(TenancyEvent::TamperDetected {
            field: field.to_string(),
            provided_value: provided,
            actual_tenant_id: tenant_id,
            caller_id: caller.audit_id(),
            path: path.to_string(),
        });
    }
}

/// A provided value agrees with the tenant id when it is that number or its
/// decimal string form; anything else counts as tampering.
fn value_matches_id(value: &Value, tenant_id: i64) -> bool {
    match value {
        Value::Number(n) => n.as_i64() == Some(tenant_id),
        Value::String(s) => s.trim().parse::<i64>() == Ok(tenant_id),
        _ => false,
    }
}
