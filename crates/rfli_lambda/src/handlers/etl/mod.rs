//! Scheduled ETL jobs: query the market source, build documents, write them
//! and move the component's ledger row.

mod curve_compare;
mod init;
mod isin_search;
mod isin_track;
mod portfolio_track;
mod slider;
mod top_delta;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::adapters::key_value::KeyValueStore;
use crate::adapters::market_source::MarketSource;
use crate::adapters::notify::Notifier;
use crate::adapters::parameters::ParameterSource;
use crate::config::RuntimeConfig;
use crate::errors::EtlError;
use crate::runtime::schedule::{valuation_date, MarketSchedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    InitDataVersion,
    IsinTrackIntra,
    CurveCompareIntra,
    CurveCompareLoadHistorical,
    PortfolioTrackIntra,
    PortfolioTrackEod,
    PortfolioTrackPopulateDefault,
    IsinSearchEod,
    IsinSearchInit,
    TopDeltaCategoryEod,
    SliderIntra,
}

impl JobKind {
    pub const ALL: [JobKind; 11] = [
        JobKind::InitDataVersion,
        JobKind::IsinTrackIntra,
        JobKind::CurveCompareIntra,
        JobKind::CurveCompareLoadHistorical,
        JobKind::PortfolioTrackIntra,
        JobKind::PortfolioTrackEod,
        JobKind::PortfolioTrackPopulateDefault,
        JobKind::IsinSearchEod,
        JobKind::IsinSearchInit,
        JobKind::TopDeltaCategoryEod,
        JobKind::SliderIntra,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitDataVersion => "init-data-version",
            Self::IsinTrackIntra => "isin-track-intra",
            Self::CurveCompareIntra => "curve-compare-intra",
            Self::CurveCompareLoadHistorical => "curve-compare-load-historical",
            Self::PortfolioTrackIntra => "portfolio-track-intra",
            Self::PortfolioTrackEod => "portfolio-track-eod",
            Self::PortfolioTrackPopulateDefault => "portfolio-track-populate-default",
            Self::IsinSearchEod => "isin-search-eod",
            Self::IsinSearchInit => "isin-search-init",
            Self::TopDeltaCategoryEod => "top-delta-category-eod",
            Self::SliderIntra => "slider-intra",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|job| job.as_str() == value)
            .ok_or_else(|| format!("unknown job '{value}'"))
    }
}

/// Payload of an ETL invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job: JobKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl JobRequest {
    pub fn new(job: JobKind) -> Self {
        Self {
            job,
            valuation_date: None,
            start_date: None,
            end_date: None,
        }
    }

    pub fn for_date(job: JobKind, valuation_date: NaiveDate) -> Self {
        Self {
            valuation_date: Some(valuation_date),
            ..Self::new(job)
        }
    }
}

/// Adapters and settings shared by every job of one invocation.
pub struct EtlContext<'a> {
    pub store: &'a dyn KeyValueStore,
    pub source: &'a dyn MarketSource,
    pub parameters: &'a dyn ParameterSource,
    pub config: &'a RuntimeConfig,
    pub now: DateTime<Utc>,
}

impl EtlContext<'_> {
    /// Market day of `now` in Bogota.
    pub fn today(&self) -> NaiveDate {
        valuation_date(self.now)
    }

    pub async fn schedule(&self) -> Result<MarketSchedule, EtlError> {
        Ok(self.config.load_schedule(self.parameters).await?)
    }
}

pub(crate) fn previous_day(date: NaiveDate) -> NaiveDate {
    date - Days::new(1)
}

/// Outcome of one job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: JobKind,
    pub valuation_date: NaiveDate,
    pub documents: usize,
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl JobReport {
    fn written(
        job: JobKind,
        valuation_date: NaiveDate,
        documents: usize,
        version: Option<i64>,
    ) -> Self {
        Self {
            job,
            valuation_date,
            documents,
            version,
            skipped: None,
        }
    }

    fn skipped(job: JobKind, valuation_date: NaiveDate, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        info!(job = job.as_str(), event = "job_skipped", reason = reason.as_str());
        Self {
            job,
            valuation_date,
            documents: 0,
            version: None,
            skipped: Some(reason),
        }
    }
}

pub async fn run_job(ctx: &EtlContext<'_>, request: &JobRequest) -> Result<JobReport, EtlError> {
    info!(
        job = request.job.as_str(),
        event = "job_started",
        valuation_date = ?request.valuation_date,
    );
    let report = match request.job {
        JobKind::InitDataVersion => init::init_data_version(ctx).await?,
        JobKind::IsinTrackIntra => isin_track::isin_track_intra(ctx).await?,
        JobKind::CurveCompareIntra => curve_compare::curve_compare_intra(ctx).await?,
        JobKind::CurveCompareLoadHistorical => {
            curve_compare::load_historical(ctx, request).await?
        }
        JobKind::PortfolioTrackIntra => portfolio_track::portfolio_track_intra(ctx).await?,
        JobKind::PortfolioTrackEod => portfolio_track::portfolio_track_eod(ctx, request).await?,
        JobKind::PortfolioTrackPopulateDefault => portfolio_track::populate_default(ctx).await?,
        JobKind::IsinSearchEod => isin_search::isin_search_eod(ctx, request).await?,
        JobKind::IsinSearchInit => isin_search::isin_search_init(ctx).await?,
        JobKind::TopDeltaCategoryEod => top_delta::top_delta_category_eod(ctx, request).await?,
        JobKind::SliderIntra => slider::slider_intra(ctx).await?,
    };
    info!(
        job = report.job.as_str(),
        event = "job_finished",
        valuation_date = %report.valuation_date,
        documents = report.documents,
        version = ?report.version,
    );
    Ok(report)
}

/// Runs a job and mails the failure before handing it back to the caller.
pub async fn execute_job(
    ctx: &EtlContext<'_>,
    notifier: &dyn Notifier,
    request: &JobRequest,
) -> Result<JobReport, EtlError> {
    let failure = match run_job(ctx, request).await {
        Ok(report) => return Ok(report),
        Err(failure) => failure,
    };
    error!(
        job = request.job.as_str(),
        event = "job_failed",
        timeout = failure.is_timeout(),
        error = %failure,
    );
    let (subject, body) = failure_mail(request, ctx.today(), &failure);
    if let Err(message) = notifier.notify(&subject, &body).await {
        warn!(
            job = request.job.as_str(),
            event = "failure_mail_not_sent",
            error = message.as_str(),
        );
    }
    Err(failure)
}

fn failure_mail(request: &JobRequest, today: NaiveDate, failure: &EtlError) -> (String, String) {
    let valuation_date = request.valuation_date.unwrap_or(today);
    if failure.is_timeout() {
        (
            format!("RFLI {}: query timeout", request.job),
            format!(
                "The job {} for {valuation_date} stopped because a query exceeded its time limit.\n\n{failure}",
                request.job
            ),
        )
    } else {
        (
            format!("RFLI {}: job failed", request.job),
            format!(
                "The job {} for {valuation_date} failed.\n\n{failure}",
                request.job
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{
        bogota, market_day, runtime_config, schedule_parameters, CannedSource, CapturingNotifier,
        InMemoryStore,
    };

    #[test]
    fn job_names_parse_and_print_in_kebab_case() {
        for job in JobKind::ALL {
            assert_eq!(job.as_str().parse::<JobKind>(), Ok(job));
            assert_eq!(
                serde_json::to_value(job).expect("serializes"),
                json!(job.as_str())
            );
        }
        assert_eq!(
            "publish-files".parse::<JobKind>(),
            Err("unknown job 'publish-files'".to_string())
        );
    }

    #[test]
    fn requests_accept_optional_dates() {
        let request: JobRequest = serde_json::from_value(json!({
            "job": "curve-compare-load-historical",
            "start_date": "2024-03-01",
            "end_date": "2024-03-12"
        }))
        .expect("request");
        assert_eq!(request.job, JobKind::CurveCompareLoadHistorical);
        assert_eq!(request.valuation_date, None);
        assert_eq!(request.end_date, Some(market_day()));

        let encoded =
            serde_json::to_value(JobRequest::for_date(JobKind::IsinSearchEod, market_day()))
                .expect("serializes");
        assert_eq!(
            encoded,
            json!({"job": "isin-search-eod", "valuation_date": "2024-03-12"})
        );
    }

    #[tokio::test]
    async fn timeouts_send_the_timeout_mail_and_fail_the_run() {
        let store = InMemoryStore::new();
        let source = CannedSource {
            timeout_on: Some("slider_tes"),
            ..CannedSource::default()
        };
        let parameters = schedule_parameters(&[("/rfli/slider", "{}")]);
        let config = runtime_config(&[]);
        let ctx = EtlContext {
            store: &store,
            source: &source,
            parameters: &parameters,
            config: &config,
            now: bogota(10, 0),
        };
        let notifier = CapturingNotifier::default();

        let failure = execute_job(&ctx, &notifier, &JobRequest::new(JobKind::SliderIntra))
            .await
            .expect_err("query timed out");

        assert!(failure.is_timeout());
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "RFLI slider-intra: query timeout");
        assert!(messages[0].1.contains("2024-03-12"));
    }

    #[tokio::test]
    async fn configuration_failures_send_the_generic_mail() {
        let store = InMemoryStore::new();
        let source = CannedSource::default();
        let parameters = schedule_parameters(&[]);
        let config = runtime_config(&[]);
        let ctx = EtlContext {
            store: &store,
            source: &source,
            parameters: &parameters,
            config: &config,
            now: bogota(10, 0),
        };
        let notifier = CapturingNotifier::default();

        let failure = execute_job(&ctx, &notifier, &JobRequest::new(JobKind::SliderIntra))
            .await
            .expect_err("slider parameter missing");

        assert!(!failure.is_timeout());
        assert_eq!(notifier.messages()[0].0, "RFLI slider-intra: job failed");
    }
}
