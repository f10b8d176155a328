use tracing::info;

use super::{EtlContext, JobKind, JobReport};
use crate::errors::EtlError;
use crate::handlers::ledger::write_version;
use crate::runtime::contract::Component;
use crate::runtime::versioning::reset_record;

const JOB: JobKind = JobKind::InitDataVersion;

/// Resets every ledger row to version 1 on business days.
pub(super) async fn init_data_version(ctx: &EtlContext<'_>) -> Result<JobReport, EtlError> {
    let today = ctx.today();
    if !ctx.source.is_business_day(today).await? {
        return Ok(JobReport::skipped(JOB, today, "not a business day"));
    }
    let schedule = ctx.schedule().await?;
    for component in Component::ALL {
        let record = reset_record(component, ctx.now, &schedule);
        write_version(ctx.store, &record).await?;
        info!(
            job = JOB.as_str(),
            event = "version_reset",
            component = component.as_str(),
            next_update = record.next_update,
        );
    }
    Ok(JobReport::written(JOB, today, Component::ALL.len(), Some(1)))
}
