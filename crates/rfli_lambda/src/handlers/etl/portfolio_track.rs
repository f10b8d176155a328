use chrono::NaiveDate;
use tracing::info;

use super::{previous_day, EtlContext, JobKind, JobReport, JobRequest};
use crate::adapters::key_value::{get_document, put_document, scan_documents, ItemKey};
use crate::errors::EtlError;
use crate::handlers::ledger::{advance_version, write_documents};
use crate::runtime::contract::Component;
use crate::runtime::portfolio_track::{
    build_all_isines, build_user_isines, default_isin_params, default_portfolio_params,
    IsinParams, PortfolioIsinDocument, PortfolioUserIsines, RatingSource,
};
use crate::runtime::ratings::RatingCatalogue;
use crate::runtime::table_names::Table;
use crate::runtime::versioning::{advance_end_of_day, advance_intraday};

pub(super) async fn portfolio_track_intra(ctx: &EtlContext<'_>) -> Result<JobReport, EtlError> {
    let schedule = ctx.schedule().await?;
    let today = ctx.today();
    let ratings = RatingCatalogue::from_rows(&ctx.source.category_ratings().await?);
    let written = load_isines(
        ctx,
        JobKind::PortfolioTrackIntra,
        today,
        RatingSource::Catalogue(&ratings),
    )
    .await?;
    let version = advance_version(ctx.store, Component::PortfolioTrack, |record| {
        advance_intraday(record, ctx.now, &schedule)
    })
    .await?;
    Ok(JobReport::written(
        JobKind::PortfolioTrackIntra,
        today,
        written,
        version.map(|record| record.version),
    ))
}

pub(super) async fn portfolio_track_eod(
    ctx: &EtlContext<'_>,
    request: &JobRequest,
) -> Result<JobReport, EtlError> {
    let schedule = ctx.schedule().await?;
    let valuation_date = request.valuation_date.unwrap_or_else(|| ctx.today());
    let written = load_isines(
        ctx,
        JobKind::PortfolioTrackEod,
        valuation_date,
        RatingSource::PriceColumn,
    )
    .await?;
    let version = advance_version(ctx.store, Component::PortfolioTrack, |record| {
        advance_end_of_day(record, ctx.now, &schedule)
    })
    .await?;
    Ok(JobReport::written(
        JobKind::PortfolioTrackEod,
        valuation_date,
        written,
        version.map(|record| record.version),
    ))
}

async fn load_isines(
    ctx: &EtlContext<'_>,
    job: JobKind,
    valuation_date: NaiveDate,
    ratings: RatingSource<'_>,
) -> Result<usize, EtlError> {
    let rated = matches!(ratings, RatingSource::PriceColumn);
    let prices = ctx
        .source
        .portfolio_prices(valuation_date, previous_day(valuation_date), rated)
        .await?;
    let instruments = ctx.source.portfolio_instruments().await?;
    let all_isines = build_all_isines(prices, &instruments, ratings);
    let params: Vec<IsinParams> = scan_documents(ctx.store, Table::PortfolioIsinParams).await?;
    let user_isines = build_user_isines(&params, &all_isines);
    info!(
        job = job.as_str(),
        event = "portfolio_isines_built",
        isines = all_isines.len(),
        users = user_isines.len(),
    );

    let written =
        write_documents(ctx.store, job.as_str(), Table::PortfolioAllIsines, &all_isines).await?;
    Ok(written
        + write_documents(ctx.store, job.as_str(), Table::PortfolioUserIsines, &user_isines)
            .await?)
}

/// Writes the `default` user's portfolio, ISIN params and tracked ISINs.
pub(super) async fn populate_default(ctx: &EtlContext<'_>) -> Result<JobReport, EtlError> {
    let job = JobKind::PortfolioTrackPopulateDefault;
    let portfolio = default_portfolio_params();
    let isin_params = default_isin_params();
    put_document(ctx.store, Table::PortfolioParams, &portfolio).await?;
    put_document(ctx.store, Table::PortfolioIsinParams, &isin_params).await?;

    let mut isines = Vec::with_capacity(isin_params.isines.len());
    for isin in &isin_params.isines {
        let document: Option<PortfolioIsinDocument> =
            get_document(ctx.store, Table::PortfolioAllIsines, &ItemKey::new(isin.as_str())).await?;
        match document {
            Some(document) => isines.push(document),
            None => info!(
                job = job.as_str(),
                event = "default_isin_not_priced",
                isin = isin.as_str()
            ),
        }
    }
    let user = PortfolioUserIsines {
        user_id: isin_params.user_id.clone(),
        isines,
    };
    put_document(ctx.store, Table::PortfolioUserIsines, &user).await?;
    info!(
        job = job.as_str(),
        event = "default_user_written",
        isines = user.isines.len(),
    );
    Ok(JobReport::written(job, ctx.today(), 3, None))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::handlers::etl::run_job;
    use crate::handlers::ledger::read_version;
    use crate::runtime::contract::{NextStatus, VersionRecord};
    use crate::testing::{
        bogota, market_day, rows, runtime_config, schedule_parameters, CannedSource,
        InMemoryStore,
    };

    fn source() -> CannedSource {
        CannedSource {
            portfolio_prices: rows(json!([
                {"isin_code": "COT09CB00049", "yield": 12.0, "yesterday_yield": 11.9,
                 "difference": 15, "category_id": 7, "real_rating": "AA+"},
                {"isin_code": "COB07CB00355", "yield": 10.0, "yesterday_yield": 10.0,
                 "category_id": 8}
            ])),
            portfolio_instruments: rows(json!([
                {"isin_code": "COT09CB00049", "issuer": "CEM", "issuer_name": "Cementos",
                 "cc_curve": "CEC"}
            ])),
            category_ratings: rows(json!([{"category_id": 7, "rating_group": "70"}])),
            ..CannedSource::default()
        }
    }

    fn seeded_store(status: NextStatus) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.seed(
            Table::PortfolioIsinParams,
            vec![json!({"user_id": "ana", "isines": ["COB07CB00355", "COT09CB00049"]})],
        );
        store.seed(
            Table::DataVersion,
            vec![serde_json::to_value(VersionRecord {
                component: Component::PortfolioTrack,
                version: 10,
                next_update: 0,
                next_status: status,
            })
            .expect("record")],
        );
        store
    }

    #[tokio::test]
    async fn intraday_rates_from_catalogue() {
        let store = seeded_store(NextStatus::Intraday);
        let source = source();
        let parameters = schedule_parameters(&[]);
        let config = runtime_config(&[]);
        let ctx = EtlContext {
            store: &store,
            source: &source,
            parameters: &parameters,
            config: &config,
            now: bogota(11, 0),
        };

        let report = run_job(&ctx, &JobRequest::new(JobKind::PortfolioTrackIntra))
            .await
            .expect("job");

        assert_eq!(report.documents, 3);
        assert!(source.calls().contains(&"portfolio_prices rated=false".to_string()));
        let rated = store
            .document(Table::PortfolioAllIsines, &ItemKey::new("COT09CB00049"))
            .expect("isin");
        assert_eq!(rated["data"]["real_rating"], "AAA");
        assert_eq!(rated["data"]["issuer_name"], "Cementos");
        let user = store
            .document(Table::PortfolioUserIsines, &ItemKey::new("ana"))
            .expect("user");
        assert_eq!(user["isines"][0]["isin"], "COT09CB00049");
        assert_eq!(user["isines"][1]["isin"], "COB07CB00355");
        assert_eq!(
            read_version(&store, Component::PortfolioTrack)
                .await
                .expect("read")
                .expect("row")
                .version,
            11
        );
    }

    #[tokio::test]
    async fn end_of_day_uses_published_rating_and_final_status() {
        let store = seeded_store(NextStatus::PreEod);
        let source = source();
        let parameters = schedule_parameters(&[]);
        let config = runtime_config(&[]);
        let ctx = EtlContext {
            store: &store,
            source: &source,
            parameters: &parameters,
            config: &config,
            now: bogota(15, 0),
        };

        let report = run_job(
            &ctx,
            &JobRequest::for_date(JobKind::PortfolioTrackEod, market_day()),
        )
        .await
        .expect("job");

        assert_eq!(report.version, Some(11));
        assert!(source.calls().contains(&"portfolio_prices rated=true".to_string()));
        assert!(!source.calls().contains(&"category_ratings".to_string()));
        let rated = store
            .document(Table::PortfolioAllIsines, &ItemKey::new("COT09CB00049"))
            .expect("isin");
        assert_eq!(rated["data"]["real_rating"], "AA+");
        let unrated = store
            .document(Table::PortfolioAllIsines, &ItemKey::new("COB07CB00355"))
            .expect("isin");
        assert_eq!(unrated["data"]["real_rating"], "NA");
        let ledger = read_version(&store, Component::PortfolioTrack)
            .await
            .expect("read")
            .expect("row");
        assert_eq!(ledger.next_status, NextStatus::FinalEod);
        assert_eq!(ledger.next_update, bogota(18, 0).timestamp());
    }

    #[tokio::test]
    async fn populate_default_writes_the_default_user() {
        let store = InMemoryStore::new();
        store.seed(
            Table::PortfolioAllIsines,
            vec![json!({"isin": "COT09CB00064", "data": {"real_rating": "AAA"}})],
        );
        let source = CannedSource::default();
        let parameters = schedule_parameters(&[]);
        let config = runtime_config(&[]);
        let ctx = EtlContext {
            store: &store,
            source: &source,
            parameters: &parameters,
            config: &config,
            now: bogota(7, 0),
        };

        run_job(&ctx, &JobRequest::new(JobKind::PortfolioTrackPopulateDefault))
            .await
            .expect("job");

        let portfolio = store
            .document(Table::PortfolioParams, &ItemKey::new("default"))
            .expect("portfolio");
        let holdings = portfolio["portfolios"]["PREDETERMINADO"]
            .as_object()
            .expect("holdings");
        assert_eq!(holdings.len(), 10);
        assert_eq!(holdings["COD16CB00022"], json!(0.0));
        let user = store
            .document(Table::PortfolioUserIsines, &ItemKey::new("default"))
            .expect("user isines");
        assert_eq!(user["isines"].as_array().map(Vec::len), Some(1));
        assert_eq!(user["isines"][0]["isin"], "COT09CB00064");
        assert!(source.calls().is_empty());
    }
}
