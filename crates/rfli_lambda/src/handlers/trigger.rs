//! Schedule and SNS entry points that fan out into asynchronous ETL runs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::adapters::invoke::JobInvoker;
use crate::config::RuntimeConfig;
use crate::errors::TriggerError;
use crate::handlers::etl::{JobKind, JobRequest};

pub const INTRADAY_JOBS: [JobKind; 4] = [
    JobKind::IsinTrackIntra,
    JobKind::CurveCompareIntra,
    JobKind::PortfolioTrackIntra,
    JobKind::SliderIntra,
];

pub const INIT_JOBS: [JobKind; 2] = [JobKind::InitDataVersion, JobKind::IsinSearchInit];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleTrigger {
    Intraday,
    Init,
}

#[derive(Debug, Deserialize)]
struct ScheduleEvent {
    trigger: ScheduleTrigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerReport {
    pub invoked: Vec<JobRequest>,
}

/// Job requests an event stands for, without invoking anything.
pub fn requests_for_event(
    event: &Value,
    config: &RuntimeConfig,
) -> Result<Vec<JobRequest>, TriggerError> {
    if let Some(records) = event.get("Records").and_then(Value::as_array) {
        let mut requests = Vec::new();
        for record in records {
            let message = record
                .pointer("/Sns/Message")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    TriggerError::InvalidMessage("record has no Sns.Message".to_string())
                })?;
            let valuation_date = end_of_day_date(message)?;
            requests.extend(
                config
                    .trigger_eod_jobs
                    .iter()
                    .map(|job| JobRequest::for_date(*job, valuation_date)),
            );
        }
        return Ok(requests);
    }

    let schedule: ScheduleEvent = serde_json::from_value(event.clone())
        .map_err(|_| TriggerError::UnknownEvent(event.to_string()))?;
    let jobs: &[JobKind] = match schedule.trigger {
        ScheduleTrigger::Intraday => &INTRADAY_JOBS,
        ScheduleTrigger::Init => &INIT_JOBS,
    };
    Ok(jobs.iter().map(|job| JobRequest::new(*job)).collect())
}

/// `VALUATION_DATE` of the pricing-done message. The publisher sends either
/// JSON or a single-quoted literal.
fn end_of_day_date(message: &str) -> Result<NaiveDate, TriggerError> {
    let parsed: Value = serde_json::from_str(message)
        .or_else(|_| serde_json::from_str(&message.replace('\'', "\"")))
        .map_err(|error| TriggerError::InvalidMessage(error.to_string()))?;
    let raw = parsed
        .get("VALUATION_DATE")
        .and_then(Value::as_str)
        .ok_or_else(|| TriggerError::InvalidMessage("VALUATION_DATE is missing".to_string()))?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| TriggerError::InvalidMessage(format!("VALUATION_DATE '{raw}' is not a date")))
}

/// Invokes every job of the event; one failed invocation does not stop
/// the others.
pub async fn handle_trigger_event(
    invoker: &dyn JobInvoker,
    config: &RuntimeConfig,
    event: &Value,
) -> Result<TriggerReport, TriggerError> {
    let requests = requests_for_event(event, config)?;
    let mut failures = Vec::new();
    for request in &requests {
        let payload = serde_json::to_vec(request)
            .map_err(|error| TriggerError::InvalidMessage(error.to_string()))?;
        match invoker.invoke_job_async(&payload).await {
            Ok(()) => info!(
                component = "trigger",
                event = "job_invoked",
                job = request.job.as_str(),
                valuation_date = ?request.valuation_date,
            ),
            Err(message) => {
                error!(
                    component = "trigger",
                    event = "job_invoke_failed",
                    job = request.job.as_str(),
                    error = message.as_str(),
                );
                failures.push(message);
            }
        }
    }

    if let Some(first) = failures.first() {
        return Err(TriggerError::Invoke {
            failed: failures.len(),
            total: requests.len(),
            first: first.clone(),
        });
    }
    Ok(TriggerReport { invoked: requests })
}
