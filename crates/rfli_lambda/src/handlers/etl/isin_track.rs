use tracing::info;

use super::{previous_day, EtlContext, JobKind, JobReport};
use crate::adapters::key_value::scan_documents;
use crate::errors::EtlError;
use crate::handlers::ledger::{advance_version, write_documents};
use crate::runtime::contract::Component;
use crate::runtime::isin_track::{
    build_documents, group_folios_by_category, merge_isines, UserParams,
};
use crate::runtime::ratings::RatingCatalogue;
use crate::runtime::table_names::Table;
use crate::runtime::versioning::advance_intraday;

const JOB: JobKind = JobKind::IsinTrackIntra;

pub(super) async fn isin_track_intra(ctx: &EtlContext<'_>) -> Result<JobReport, EtlError> {
    let schedule = ctx.schedule().await?;
    let today = ctx.today();

    let prices = ctx.source.isin_track_prices(today, previous_day(today)).await?;
    let categories = ctx.source.isin_track_categories(today).await?;
    let ratings = RatingCatalogue::from_rows(&ctx.source.category_ratings().await?);
    let merged = merge_isines(prices, &categories, &ratings);
    info!(
        job = JOB.as_str(),
        event = "isines_merged",
        priced = merged.snapshots.len(),
        end_of_day = merged.end_of_day.len(),
    );

    let folios = group_folios_by_category(ctx.source.isin_track_folios(today).await?);
    let user_params: Vec<UserParams> = scan_documents(ctx.store, Table::IsinTrackUserParams).await?;
    let documents = build_documents(&merged, &folios, &user_params);
    for (margin_type, count) in &documents.folio_counts {
        info!(
            job = JOB.as_str(),
            event = "isines_with_folios",
            margin_type = margin_type.as_str(),
            count,
        );
    }

    let mut written =
        write_documents(ctx.store, JOB.as_str(), Table::IsinTrackAllIsines, &documents.all_isines)
            .await?;
    written +=
        write_documents(ctx.store, JOB.as_str(), Table::IsinTrackFolios, &documents.folios).await?;
    written += write_documents(
        ctx.store,
        JOB.as_str(),
        Table::IsinTrackUserIsines,
        &documents.user_isines,
    )
    .await?;

    let version = advance_version(ctx.store, Component::IsinTrack, |record| {
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
