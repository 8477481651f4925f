//! Batch/CLI sweep: run work against every active tenant with request-time
//! isolation, guaranteeing the context is reset between tenants even when
//! the work fails.

use crate::error::TenancyError;
use crate::scope::Tenancy;
use crate::tenant::TenantRecord;
use std::collections::BTreeMap;
use std::future::Future;

#[derive(Debug, Default)]
pub struct SweepReport {
    pub completed: Vec<i64>,
    pub failed: BTreeMap<i64, String>,
}

impl SweepReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Boot each active tenant in turn, invoke `work`, and always shut down and
/// clear before moving to the next tenant. One tenant's failure is recorded
/// and never stops the sweep. Work that needs subsystem handles should
/// capture clones of them before the sweep starts.
pub async fn for_each_active_tenant<F, Fut>(
    tenancy: &mut Tenancy,
    mut work: F,
) -> Result<SweepReport, TenancyError>
where
    F: FnMut(TenantRecord) -> Fut,
    Fut: Future<Output = Result<(), TenancyError>>,
{
    let tenants = tenancy.repository().list_active().await?;
    let mut report = SweepReport::default();

    for tenant in tenants {
        let id = tenant.id;
        if let Err(e) = tenancy.boot_for_tenant(id).await {
            tracing::error!(tenant_id = id, error = %e, "sweep boot failed");
            report.failed.insert(id, e.to_string());
            tenancy.finish();
            continue;
        }
        match work(tenant).await {
            Ok(()) => report.completed.push(id),
            Err(e) => {
                tracing::error!(tenant_id = id, error = %e, "sweep work failed");
                report.failed.insert(id, e.to_string());
            }
        }
        tenancy.finish();
    }

    Ok(report)
}
