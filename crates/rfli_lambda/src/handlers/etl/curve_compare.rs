use serde_json::Value;
use tracing::info;

use super::{EtlContext, JobKind, JobReport, JobRequest};
use crate::errors::EtlError;
use crate::handlers::ledger::{advance_version, write_documents};
use crate::runtime::contract::Component;
use crate::runtime::curve_compare::{
    build_end_of_day, build_intraday, days_between, EodCurveDocuments,
};
use crate::runtime::table_names::Table;
use crate::runtime::versioning::advance_intraday;

pub(super) async fn curve_compare_intra(ctx: &EtlContext<'_>) -> Result<JobReport, EtlError> {
    let job = JobKind::CurveCompareIntra;
    let schedule = ctx.schedule().await?;
    let today = ctx.today();

    let curves = ctx.source.curves(today).await?;
    let folios = ctx.source.curve_folios(today).await?;
    let stored: Vec<String> = ctx
        .store
        .scan_items(Table::CurvesIntra)
        .await?
        .iter()
        .filter_map(|item| item.get("cc_curve").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    let documents = build_intraday(&curves, folios, &stored);
    info!(
        job = job.as_str(),
        event = "curves_built",
        published = curves.len(),
        documents = documents.curves.len(),
    );

    let mut written =
        write_documents(ctx.store, job.as_str(), Table::CurvesIntra, &documents.curves).await?;
    written +=
        write_documents(ctx.store, job.as_str(), Table::FoliosIntra, &documents.folios).await?;

    let version = advance_version(ctx.store, Component::CompareCurves, |record| {
        advance_intraday(record, ctx.now, &schedule)
    })
    .await?;
    Ok(JobReport::written(
        job,
        today,
        written,
        version.map(|record| record.version),
    ))
}

/// Loads end-of-day curves for every day of the requested range. A single
/// day range is the daily EOD load. The ledger is not touched.
pub(super) async fn load_historical(
    ctx: &EtlContext<'_>,
    request: &JobRequest,
) -> Result<JobReport, EtlError> {
    let job = JobKind::CurveCompareLoadHistorical;
    let start = request
        .start_date
        .or(request.valuation_date)
        .unwrap_or_else(|| ctx.today());
    let end = request.end_date.or(request.valuation_date).unwrap_or(start);
    if end < start {
        return Err(EtlError::InvalidRequest(format!(
            "end_date {end} is before start_date {start}"
        )));
    }

    let mut documents = EodCurveDocuments::default();
    for day in days_between(start, end) {
        let curves = ctx.source.curves(day).await?;
        let folios = ctx.source.curve_folios(day).await?;
        let day_documents = build_end_of_day(day, &curves, folios);
        if day_documents.curves.is_empty() {
            info!(
                job = job.as_str(),
                event = "curves_skipped",
                valuation_date = %day,
                published = curves.len(),
            );
        }
        documents.extend(day_documents);
    }

    let mut written =
        write_documents(ctx.store, job.as_str(), Table::CurvesEod, &documents.curves).await?;
    written += write_documents(ctx.store, job.as_str(), Table::FoliosEod, &documents.folios).await?;
    Ok(JobReport::written(job, end, written, None))
}
