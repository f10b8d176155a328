use chrono::NaiveDate;
use serde_json::Value;

use super::{encode_body, ApiContext, ApiRequest};
use crate::adapters::key_value::{get_document, ItemKey};
use crate::errors::ApiError;
use crate::runtime::contract::{Component, Envelope, NextStatus, VersionRecord};
use crate::runtime::curve_compare::{
    CurveData, CurveDocument, CurveFoliosDocument, EodCurveDocument, EodCurveFoliosDocument,
};
use crate::runtime::schedule::{valuation_date, MilitaryTime};
use crate::runtime::table_names::Table;
use crate::runtime::versioning::{client_wait, eod_reset_wait, intraday_only_wait};

fn eod_key(date: NaiveDate, cc_curve: &str) -> ItemKey {
    ItemKey::with_sort(date.format("%Y-%m-%d").to_string(), cc_curve)
}

/// Curve betas while the client is behind the ledger, nothing otherwise.
pub(super) async fn curves_intra(
    ctx: &ApiContext<'_>,
    request: &ApiRequest,
) -> Result<Value, ApiError> {
    let cc_curve = request.required_query("cc_curve")?;
    let client_version = request.version()?;
    let record = ctx.ledger(Component::CompareCurves).await?;
    if client_version == Some(record.version) {
        return encode_body(&Envelope::<CurveData>::versioned(&record, None, None));
    }
    let document: CurveDocument =
        get_document(ctx.store, Table::CurvesIntra, &ItemKey::new(cc_curve))
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("curve {cc_curve} not found")))?;
    encode_body(&Envelope::versioned(
        &record,
        Some(intraday_only_wait(&record, ctx.now)),
        document.data,
    ))
}

pub(super) async fn curves_eod(
    ctx: &ApiContext<'_>,
    request: &ApiRequest,
) -> Result<Value, ApiError> {
    let cc_curve = request.required_query("cc_curve")?;
    let requested_date = request.date_query("valuation_date")?;
    let Some(client_version) = request.version()? else {
        let document: EodCurveDocument =
            get_document(ctx.store, Table::CurvesEod, &eod_key(requested_date, cc_curve))
                .await?
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("curve {cc_curve} not found for {requested_date}"))
                })?;
        return encode_body(&Envelope::unversioned(document.data));
    };

    let record = ctx.ledger(Component::CompareCurves).await?;
    let timing = ctx.timing().await?;
    if client_version == record.version && record.next_status != NextStatus::FinalEod {
        let wait = client_wait(&record, ctx.now, timing.market_rate_secs);
        return encode_body(&Envelope::<CurveData>::versioned(&record, Some(wait), None));
    }
    todays_curve(ctx, &record, cc_curve, timing.market_rate_secs, timing.eod_reset).await
}

/// Today's published curve, re-polled after the EOD reset. Until it is
/// loaded the client retries at the market rate.
async fn todays_curve(
    ctx: &ApiContext<'_>,
    record: &VersionRecord,
    cc_curve: &str,
    market_rate_secs: i64,
    eod_reset: MilitaryTime,
) -> Result<Value, ApiError> {
    let today = valuation_date(ctx.now);
    let document: Option<EodCurveDocument> =
        get_document(ctx.store, Table::CurvesEod, &eod_key(today, cc_curve)).await?;
    let envelope = match document {
        Some(document) => Envelope::versioned(
            record,
            Some(eod_reset_wait(ctx.now, eod_reset)),
            Some(document.data),
        ),
        None => Envelope::versioned(record, Some(market_rate_secs), None),
    };
    encode_body(&envelope)
}

pub(super) async fn folios_intra(
    ctx: &ApiContext<'_>,
    request: &ApiRequest,
) -> Result<Value, ApiError> {
    let cc_curve = request.required_query("cc_curve")?;
    let document: CurveFoliosDocument =
        get_document(ctx.store, Table::FoliosIntra, &ItemKey::new(cc_curve))
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("no folios for curve {cc_curve}")))?;
    encode_body(&Envelope::unversioned(document.data))
}

pub(super) async fn folios_eod(
    ctx: &ApiContext<'_>,
    request: &ApiRequest,
) -> Result<Value, ApiError> {
    let cc_curve = request.required_query("cc_curve")?;
    let date = request.date_query("valuation_date")?;
    let document: EodCurveFoliosDocument =
        get_document(ctx.store, Table::FoliosEod, &eod_key(date, cc_curve))
            .await?
            .ok_or_else(|| {
                ApiError::BadRequest(format!("no folios for curve {cc_curve} on {date}"))
            })?;
    encode_body(&Envelope::unversioned(document.data))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::handlers::api::handle_api_event;
    use crate::testing::{
        api_event, bogota, response_body, runtime_config, schedule_parameters, version_row,
        InMemoryStore,
    };

    fn store(status: NextStatus, next_update: i64) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.seed(
            Table::DataVersion,
            vec![version_row(Component::CompareCurves, 5, status, next_update)],
        );
        store.seed(
            Table::CurvesIntra,
            vec![json!({"cc_curve": "CEC", "data": {"beta_0": 9.0, "beta_0_r": 8.5}})],
        );
        store.seed(
            Table::CurvesEod,
            vec![
                json!({"valuation_date": "2024-03-11", "cc_curve": "CEC", "data": {"beta_0": 8.8}}),
                json!({"valuation_date": "2024-03-12", "cc_curve": "CEC", "data": {"beta_0": 9.1}}),
            ],
        );
        store.seed(
            Table::FoliosEod,
            vec![json!({"valuation_date": "2024-03-11", "cc_curve": "CEC", "data": [
                {"nemo": "TFIT16", "yield": 10.5}
            ]})],
        );
        store
    }

    async fn get(
        store: &InMemoryStore,
        path: &str,
        query: Value,
        hour: u32,
        minute: u32) -> (u16, Value,
    ) {
        let parameters = schedule_parameters(&[]);
        let config = runtime_config(&[]);
        let ctx = ApiContext {
            store,
            parameters: &parameters,
            config: &config,
            now: bogota(hour, minute),
        };
        let response = handle_api_event(&ctx, api_event("GET", path, query, None, None)).await;
        (response.status_code, response_body(&response))
    }

    #[tokio::test]
    async fn intraday_curve_is_sent_only_to_stale_clients() {
        let store = store(NextStatus::Intraday, bogota(10, 10).timestamp());

        let (status, body) = get(
            &store,
            "/curve-compare/curves-intra",
            json!({"cc_curve": "CEC", "version": "4"}),
            10,
            0,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["version"], 5);
        assert_eq!(body["next_update"], 600);
        assert_eq!(body["data"]["beta_0_r"], json!(8.5));

        let (_, body) = get(
            &store,
            "/curve-compare/curves-intra",
            json!({"cc_curve": "CEC", "version": "5"}),
            10,
            0,
        )
        .await;
        assert_eq!(body["data"], json!(null));
        assert_eq!(body["next_update"], json!(null));

        let (status, _) = get(
            &store,
            "/curve-compare/curves-intra",
            json!({"cc_curve": "ZZZ"}),
            10,
            0,
        )
        .await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn intraday_wait_is_zero_after_the_intraday_phase() {
        let store = store(NextStatus::PreEod, bogota(14, 30).timestamp());
        let (_, body) = get(
            &store,
            "/curve-compare/curves-intra",
            json!({"cc_curve": "CEC"}),
            13,
            0,
        )
        .await;
        assert_eq!(body["next_update"], 0);
        assert_eq!(body["next_status"], "pre_eod");
    }

    #[tokio::test]
    async fn end_of_day_without_version_reads_the_requested_date() {
        let store = store(NextStatus::Intraday, 0);
        let (status, body) = get(
            &store,
            "/curve-compare/curves-eod",
            json!({"cc_curve": "CEC", "valuation_date": "2024-03-11"}),
            10,
            0,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["version"], json!(null));
        assert_eq!(body["data"]["beta_0"], json!(8.8));

        let (status, _) = get(
            &store,
            "/curve-compare/curves-eod",
            json!({"cc_curve": "CEC", "valuation_date": "2024-03-01"}),
            10,
            0,
        )
        .await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn end_of_day_with_current_version_follows_the_ledger_status() {
        let store = store(NextStatus::PreEod, bogota(14, 30).timestamp());
        let query = json!({"cc_curve": "CEC", "valuation_date": "2024-03-11", "version": "5"});

        let (_, body) = get(&store, "/curve-compare/curves-eod", query.clone(), 14, 0).await;
        assert_eq!(body["data"], json!(null));
        assert_eq!(body["next_update"], 1800);

        let (_, body) = get(&store, "/curve-compare/curves-eod", query.clone(), 15, 0).await;
        assert_eq!(body["next_update"], 120);

        let store = store_final();
        let (_, body) = get(&store, "/curve-compare/curves-eod", query, 18, 30).await;
        assert_eq!(body["data"]["beta_0"], json!(9.1));
        assert_eq!(body["next_update"], 90 * 60);
    }

    fn store_final() -> InMemoryStore {
        store(NextStatus::FinalEod, bogota(18, 0).timestamp())
    }

    #[tokio::test]
    async fn end_of_day_for_stale_client_waits_for_todays_load() {
        let store = InMemoryStore::new();
        store.seed(
            Table::DataVersion,
            vec![version_row(Component::CompareCurves, 7, NextStatus::Intraday, 0)],
        );
        let (_, body) = get(
            &store,
            "/curve-compare/curves-eod",
            json!({"cc_curve": "CEC", "valuation_date": "2024-03-11", "version": "6"}),
            11,
            0,
        )
        .await;
        assert_eq!(body["data"], json!(null));
        assert_eq!(body["next_update"], 120);
        assert_eq!(body["version"], 7);
    }

    #[tokio::test]
    async fn folios_are_returned_as_plain_lists() {
        let store = store(NextStatus::Intraday, 0);
        store.seed(
            Table::FoliosIntra,
            vec![json!({"cc_curve": "CEC", "data": []})],
        );
        let (_, body) = get(
            &store,
            "/curve-compare/folios-intra",
            json!({"cc_curve": "CEC"}),
            10,
            0,
        )
        .await;
        assert_eq!(body["data"], json!([]));

        let (_, body) = get(
            &store,
            "/curve-compare/folios-eod",
            json!({"cc_curve": "CEC", "valuation_date": "2024-03-11"}),
            10,
            0,
        )
        .await;
        assert_eq!(body["data"][0]["nemo"], "TFIT16");

        let (status, _) = get(
            &store,
            "/curve-compare/folios-eod",
            json!({"cc_curve": "CEC"}),
            10,
            0,
        )
        .await;
        assert_eq!(status, 400);
    }
}
