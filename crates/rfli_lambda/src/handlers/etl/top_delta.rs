use tracing::info;

use super::{previous_day, EtlContext, JobKind, JobReport, JobRequest};
use crate::errors::EtlError;
use crate::handlers::ledger::{advance_version, write_documents};
use crate::runtime::contract::Component;
use crate::runtime::table_names::Table;
use crate::runtime::top_delta::{
    build_documents, parse_excluded_classes, rank_categories, CurveChanges, DetailInputs,
    TopCategoryParams,
};
use crate::runtime::versioning::advance_end_of_day;

const JOB: JobKind = JobKind::TopDeltaCategoryEod;

pub(super) async fn top_delta_category_eod(
    ctx: &EtlContext<'_>,
    request: &JobRequest,
) -> Result<JobReport, EtlError> {
    let schedule = ctx.schedule().await?;
    let params: TopCategoryParams = ctx
        .config
        .load_json(ctx.parameters, &ctx.config.parameters.top_category, "TOP_CATEGORY_PARAMS")
        .await?;
    let today = request.valuation_date.unwrap_or_else(|| ctx.today());
    let yesterday = previous_day(today);

    let excluded = parse_excluded_classes(&ctx.config.excluded_category_classes);
    let aggregates = ctx.source.category_aggregates(today, yesterday).await?;
    let candidates = aggregates.len();
    let ranked = rank_categories(aggregates, &excluded);
    info!(
        job = JOB.as_str(),
        event = "categories_ranked",
        candidates,
        ranked = ranked.len(),
    );
    if ranked.is_empty() {
        return Ok(JobReport::skipped(JOB, today, "no category has prices for both days"));
    }

    let ids: Vec<i64> = ranked.iter().map(|item| item.category.category_id).collect();
    let mut curve_changes = CurveChanges::default();
    for term in params.range_terms() {
        let rows = ctx.source.curve_changes(today, yesterday, term.max_term).await?;
        curve_changes.push(&term.range, rows);
    }
    let inputs = DetailInputs {
        margins: ctx.source.category_margins(today, &ids).await?,
        folios: ctx.source.category_folios(today, &ids).await?,
        isines: ctx.source.category_isines(today, yesterday, &ids).await?,
        midpoints: ctx.source.range_midpoints(&ids).await?,
        curve_changes,
    };
    let documents = build_documents(&ranked, &inputs, &params)?;

    let mut written = write_documents(
        ctx.store,
        JOB.as_str(),
        Table::TopDeltaCategory,
        std::slice::from_ref(&documents.ranking),
    )
    .await?;
    written += write_documents(
        ctx.store,
        JOB.as_str(),
        Table::TopDeltaCategoryDetails,
        &documents.details,
    )
    .await?;

    let version = advance_version(ctx.store, Component::TopDeltaCategory, |record| {
        advance_end_of_day(record, ctx.now, &schedule)
    })
    .await?;
    Ok(JobReport::written(
        JOB,
        today,
        written,
        version.map(|record| record.version),
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::adapters::key_value::ItemKey;
    use crate::handlers::etl::run_job;
    use crate::handlers::ledger::{read_version, write_version};
    use crate::runtime::contract::{NextStatus, VersionRecord};
    use crate::testing::{
        bogota, market_day, rows, runtime_config, schedule_parameters, CannedSource,
        InMemoryStore,
    };

    const PARAMS: &str = r#"{
        "PARAMETERS_CLASS": {"1": "CDT", "2": "BONOS"},
        "PARAMETERS_CURRENCY_GROUP": {"1": "PESOS"},
        "PARAMETERS_RATE_GROUP": {"2": "TASA FIJA"},
        "PARAMETERS_RATING_GROUP": {"70": "AAA"},
        "PARAMETERS_MATURITY_RANGE": {"3": "DE 1 A 3 AÑOS"},
        "MAX_MATURITY_RANGE": {"3": 1095, "4": 1825},
        "CURVE_RELATION": {"CEC": "1,1,2"}
    }"#;

    fn source() -> CannedSource {
        CannedSource {
            category_aggregates: rows(json!([
                {"category_id": 11, "today_avg": 10.5, "yesterday_avg": 10.25, "volume": 40,
                 "category_class": "1", "currency_group": "1", "rate_group": "2",
                 "rating_group": "70", "maturity_range": "3"},
                {"category_id": 12, "today_avg": 9.0, "yesterday_avg": 9.1, "volume": 20,
                 "category_class": "2", "currency_group": "1", "rate_group": "1",
                 "maturity_range": "4"},
                {"category_id": 13, "today_avg": 8.0, "yesterday_avg": 7.0, "volume": 5,
                 "category_class": "9"},
                {"category_id": 14, "today_avg": 8.0, "volume": 50, "category_class": "1"}
            ])),
            category_margins: rows(json!([
                {"category_id": 11, "margin_type": "H"},
                {"category_id": 12, "margin_type": "C"}
            ])),
            category_folios: rows(json!([
                {"category_id": 12, "nemo": "BCOL27", "yield": 9.1, "amount": 1000,
                 "folio_type": "PRIMARIO"}
            ])),
            category_isines: rows(json!([
                {"category_id": 11, "isin_code": "COB07CB00123", "maturity_days": 400,
                 "yield": 10.5, "yesterday_yield": 10.2, "issuer_name": "BBVA"},
                {"category_id": 11, "isin_code": "COB07CB00999", "maturity_days": 900,
                 "yield": 10.6, "yesterday_yield": 10.4}
            ])),
            range_midpoints: rows(json!([{"category_id": 11, "range_average": 730}])),
            curve_changes: HashMap::from([
                (Some(1095), rows(json!([{"cc_curve": "CEC", "pbs_diff": 12.5}]))),
                (None, rows(json!([{"cc_curve": "CEC", "pbs_diff": 20}]))),
            ]),
            ..CannedSource::default()
        }
    }

    #[tokio::test]
    async fn ranks_categories_and_writes_details() {
        let store = InMemoryStore::new();
        write_version(
            &store,
            &VersionRecord {
                component: Component::TopDeltaCategory,
                version: 1,
                next_update: 0,
                next_status: NextStatus::Intraday,
            },
        )
        .await
        .expect("seed");
        let source = source();
        let parameters = schedule_parameters(&[("/rfli/top-category", PARAMS)]);
        let config = runtime_config(&[("EXCLUDED_CATEGORY_CLASSES", "'9'")]);
        let ctx = EtlContext {
            store: &store,
            source: &source,
            parameters: &parameters,
            config: &config,
            now: bogota(16, 30),
        };

        let report = run_job(
            &ctx,
            &JobRequest::for_date(JobKind::TopDeltaCategoryEod, market_day()),
        )
        .await
        .expect("job");

        assert_eq!(report.documents, 3);
        assert_eq!(report.version, Some(2));
        let calls = source.calls();
        assert!(calls.contains(&"curve_changes max_term=Some(1095)".to_string()));
        assert!(calls.contains(&"curve_changes max_term=None".to_string()));

        let ranking = store
            .document(Table::TopDeltaCategory, &ItemKey::new(1))
            .expect("ranking");
        let entries = ranking["data"].as_array().expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["category_id"], 11);
        assert_eq!(entries[0]["tir_variation"], json!(25.0));
        assert_eq!(
            entries[0]["description"],
            "CDT en PESOS TASA FIJA AAA DE 1 A 3 AÑOS"
        );

        let curve_detail = store
            .document(Table::TopDeltaCategoryDetails, &ItemKey::new(1))
            .expect("detail");
        assert_eq!(curve_detail["data"]["cc_curve"], "CEC");
        assert_eq!(curve_detail["data"]["pbs_change"], json!(12.5));
        assert_eq!(curve_detail["data"]["total_isines"], 2);

        let folio_detail = store
            .document(Table::TopDeltaCategoryDetails, &ItemKey::new(2))
            .expect("detail");
        assert_eq!(folio_detail["data"]["folios"][0]["folio_type"], "PRIMARIO");
        assert_eq!(folio_detail["data"]["cc_curve"], json!(null));

        let ledger = read_version(&store, Component::TopDeltaCategory)
            .await
            .expect("read")
            .expect("row");
        assert_eq!(ledger.next_status, NextStatus::FinalEod);
    }

    #[tokio::test]
    async fn nothing_to_rank_skips_the_run() {
        let store = InMemoryStore::new();
        let source = CannedSource::default();
        let parameters = schedule_parameters(&[("/rfli/top-category", "{}")]);
        let config = runtime_config(&[]);
        let ctx = EtlContext {
            store: &store,
            source: &source,
            parameters: &parameters,
            config: &config,
            now: bogota(16, 30),
        };

        let report = run_job(&ctx, &JobRequest::new(JobKind::TopDeltaCategoryEod))
            .await
            .expect("job");

        assert!(report.skipped.is_some());
        assert!(store.documents(Table::TopDeltaCategory).is_empty());
    }
}
