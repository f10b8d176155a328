use std::collections::BTreeSet;

use serde_json::Value;
use tracing::info;

use super::{previous_day, EtlContext, JobKind, JobReport, JobRequest};
use crate::adapters::key_value::{ItemKey, KeyValueStore};
use crate::errors::{EtlError, StoreError};
use crate::handlers::ledger::{advance_version, write_documents};
use crate::runtime::contract::Component;
use crate::runtime::isin_search::{build_documents, isines_to_delete, IssuerDocument, SearchParams};
use crate::runtime::table_names::Table;
use crate::runtime::versioning::{advance_end_of_day, pre_eod_reached};

pub(super) async fn isin_search_eod(
    ctx: &EtlContext<'_>,
    request: &JobRequest,
) -> Result<JobReport, EtlError> {
    let job = JobKind::IsinSearchEod;
    let schedule = ctx.schedule().await?;
    let valuation_date = request.valuation_date.unwrap_or_else(|| ctx.today());
    if !pre_eod_reached(ctx.now, &schedule) {
        return Ok(JobReport::skipped(job, valuation_date, "pre-EOD time not reached"));
    }
    let params: SearchParams = ctx
        .config
        .load_json(ctx.parameters, &ctx.config.parameters.isin_search, "ISIN_SEARCH_PARAMS")
        .await?;

    let prices = ctx.source.search_prices(valuation_date).await?;
    let categories = ctx.source.search_categories().await?;
    let issuers = ctx.source.isin_issuers().await?;
    let documents = build_documents(prices, &categories, &issuers, &params);
    let written =
        write_documents(ctx.store, job.as_str(), Table::IsinSearchAllIsines, &documents).await?;

    let version = advance_version(ctx.store, Component::IsinSearch, |record| {
        advance_end_of_day(record, ctx.now, &schedule)
    })
    .await?;
    Ok(JobReport::written(
        job,
        valuation_date,
        written,
        version.map(|record| record.version),
    ))
}

/// Drops matured ISINs and reloads the issuer list on business days.
pub(super) async fn isin_search_init(ctx: &EtlContext<'_>) -> Result<JobReport, EtlError> {
    let job = JobKind::IsinSearchInit;
    let today = ctx.today();
    if !ctx.source.is_business_day(today).await? {
        return Ok(JobReport::skipped(job, today, "not a business day"));
    }

    let stored = stored_keys(ctx.store, Table::IsinSearchAllIsines).await?;
    let matured = if ctx.config.empty_all_isines {
        Vec::new()
    } else {
        ctx.source.matured_isines(today, previous_day(today)).await?
    };
    let expired = isines_to_delete(&stored, &matured, ctx.config.empty_all_isines);
    info!(
        job = job.as_str(),
        event = "isines_deleted",
        count = expired.len(),
        empty_all = ctx.config.empty_all_isines,
    );
    if !expired.is_empty() {
        ctx.store
            .delete_items(
                Table::IsinSearchAllIsines,
                expired.into_iter().map(ItemKey::new).collect(),
            )
            .await?;
    }

    let active: BTreeSet<String> = ctx.source.active_issuers().await?.into_iter().collect();
    let retired: Vec<ItemKey> = stored_keys(ctx.store, Table::IsinSearchIssuers)
        .await?
        .into_iter()
        .filter(|issuer| !active.contains(issuer))
        .map(ItemKey::new)
        .collect();
    if !retired.is_empty() {
        ctx.store.delete_items(Table::IsinSearchIssuers, retired).await?;
    }
    let issuers: Vec<IssuerDocument> = active
        .into_iter()
        .map(|issuer| IssuerDocument { issuer })
        .collect();
    let written =
        write_documents(ctx.store, job.as_str(), Table::IsinSearchIssuers, &issuers).await?;
    Ok(JobReport::written(job, today, written, None))
}

/// Partition keys of every stored document, as text.
async fn stored_keys(store: &dyn KeyValueStore, table: Table) -> Result<Vec<String>, StoreError> {
    let (partition, _) = table.key_attributes();
    Ok(store
        .scan_items(table)
        .await?
        .iter()
        .filter_map(|item| item.get(partition).and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}
