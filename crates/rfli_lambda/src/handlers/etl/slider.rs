use chrono::Days;

use super::{previous_day, EtlContext, JobKind, JobReport};
use crate::errors::EtlError;
use crate::handlers::ledger::{advance_version, write_documents};
use crate::runtime::contract::Component;
use crate::runtime::slider::{build_document, SliderParams, TOP_TES};
use crate::runtime::table_names::Table;
use crate::runtime::versioning::advance_intraday;

const JOB: JobKind = JobKind::SliderIntra;
const TRADED_VOLUME_DAYS: u64 = 30;

pub(super) async fn slider_intra(ctx: &EtlContext<'_>) -> Result<JobReport, EtlError> {
    let schedule = ctx.schedule().await?;
    let params: SliderParams = ctx
        .config
        .load_json(ctx.parameters, &ctx.config.parameters.slider, "SLIDER_PARAMS")
        .await?;
    let today = ctx.today();
    let yesterday = previous_day(today);

    let mut rows = ctx
        .source
        .slider_tes(today, yesterday, today - Days::new(TRADED_VOLUME_DAYS))
        .await?;
    rows.truncate(TOP_TES);
    for category_id in params.category_ids() {
        rows.extend(ctx.source.slider_category(today, yesterday, category_id).await?);
    }

    let document = build_document(rows, &params);
    let written =
        write_documents(ctx.store, JOB.as_str(), Table::Slider, std::slice::from_ref(&document))
            .await?;
    let version = advance_version(ctx.store, Component::Slider, |record| {
        advance_intraday(record, ctx.now, &schedule)
    })
    .await?;
    Ok(JobReport::written(
        JOB,
        today,
        written,
        version.map(|record| record.version),
    ))
}
