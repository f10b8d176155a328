//! API Gateway proxy handlers for the client read endpoints.
//!
//! Routes are matched on the last two path segments, so the same binary
//! serves every stage and base path mapping.

mod curve_compare;
mod isin_search;
mod isin_track;
mod portfolio_track;
mod slider;
mod top_delta;

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::adapters::key_value::{get_document, ItemKey, KeyValueStore};
use crate::adapters::parameters::ParameterSource;
use crate::config::{ClientTiming, RuntimeConfig};
use crate::errors::ApiError;
use crate::handlers::ledger::read_version;
use crate::runtime::contract::{Component, IsinSelection, VersionRecord, DEFAULT_USER};
use crate::runtime::table_names::Table;
use crate::runtime::versioning::client_wait;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The parts of an API Gateway proxy event the handlers read.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiRequest {
    #[serde(rename = "httpMethod", default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,
    #[serde(
        rename = "queryStringParameters",
        default,
        deserialize_with = "null_as_default"
    )]
    pub query: HashMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

impl ApiRequest {
    /// Query value, ignoring blanks.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn required_query(&self, name: &str) -> Result<&str, ApiError> {
        self.query(name)
            .ok_or_else(|| ApiError::BadRequest(format!("query parameter '{name}' is required")))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Client version of `?version=`, when sent.
    pub fn version(&self) -> Result<Option<i64>, ApiError> {
        self.query("version")
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| {
                    ApiError::BadRequest(format!("version '{raw}' is not a number"))
                })
            })
            .transpose()
    }

    pub fn date_query(&self, name: &str) -> Result<NaiveDate, ApiError> {
        let raw = self.required_query(name)?;
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest(format!("{name} '{raw}' is not a YYYY-MM-DD date")))
    }

    /// Decodes the body; a null body reads as `{}`.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let payload = match &self.body {
            Value::Null => json!({}),
            Value::Object(_) => self.body.clone(),
            Value::String(text) => serde_json::from_str(text)
                .map_err(|error| ApiError::BadRequest(format!("Malformed JSON body: {error}")))?,
            _ => {
                return Err(ApiError::BadRequest(
                    "Request body must be a JSON object".to_string(),
                ))
            }
        };
        serde_json::from_value(payload)
            .map_err(|error| ApiError::BadRequest(format!("Malformed request: {error}")))
    }
}

/// `unique_name` claim of the bearer token. The signature is checked by the
/// API Gateway authorizer, not here.
pub fn caller(request: &ApiRequest) -> Result<String, ApiError> {
    let header = request
        .header("authorization")
        .ok_or_else(|| ApiError::BadRequest("Authorization header is required".to_string()))?;
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| ApiError::BadRequest("token is not a JWT".to_string()))?;
    let claims: Value = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| ApiError::BadRequest("token payload could not be decoded".to_string()))?;
    claims
        .get("unique_name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("token has no unique_name claim".to_string()))
}

/// Adapters and settings shared by every endpoint of one invocation.
pub struct ApiContext<'a> {
    pub store: &'a dyn KeyValueStore,
    pub parameters: &'a dyn ParameterSource,
    pub config: &'a RuntimeConfig,
    pub now: DateTime<Utc>,
}

impl ApiContext<'_> {
    /// Ledger row of `component`; endpoints cannot answer without it.
    pub async fn ledger(&self, component: Component) -> Result<VersionRecord, ApiError> {
        read_version(self.store, component)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("no data version for {component}")))
    }

    pub async fn timing(&self) -> Result<ClientTiming, ApiError> {
        Ok(self.config.load_client_timing(self.parameters).await?)
    }

    pub async fn client_wait(&self, record: &VersionRecord) -> Result<i64, ApiError> {
        let timing = self.timing().await?;
        Ok(client_wait(record, self.now, timing.market_rate_secs))
    }
}

/// The caller's document, or the `default` user's when the caller has none.
pub(crate) async fn user_document<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    table: Table,
    user: &str,
) -> Result<Option<T>, ApiError> {
    if let Some(document) = get_document(store, table, &ItemKey::new(user)).await? {
        return Ok(Some(document));
    }
    Ok(get_document(store, table, &ItemKey::new(DEFAULT_USER)).await?)
}

/// Looks every requested ISIN up in `table`, keeping the request order.
pub(crate) async fn select_isines<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    table: Table,
    requested: &[String],
) -> Result<IsinSelection<T>, ApiError> {
    let mut selection = IsinSelection {
        found: Vec::with_capacity(requested.len()),
        missing: Vec::new(),
    };
    for isin in requested {
        match get_document(store, table, &ItemKey::new(isin.as_str())).await? {
            Some(document) => selection.found.push(document),
            None => selection.missing.push(isin.clone()),
        }
    }
    Ok(selection)
}

pub(crate) fn encode_body<T: Serialize>(payload: &T) -> Result<Value, ApiError> {
    serde_json::to_value(payload)
        .map_err(|error| ApiError::Internal(format!("response could not be encoded: {error}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Preflight,
    IsinTrackUserIsines,
    IsinTrackUserParams,
    IsinTrackFolios,
    CurvesIntra,
    CurvesEod,
    CurveFoliosIntra,
    CurveFoliosEod,
    PortfolioUserParams,
    PortfolioUserPortfolios,
    SearchIsines,
    SearchTitles,
    SearchIssuers,
    TopDeltaRanking,
    TopDeltaDetails,
    Slider,
}

fn route(method: &str, path: &str) -> Option<Route> {
    let mut segments = path.rsplit('/').filter(|segment| !segment.is_empty());
    let leaf = segments.next()?;
    let parent = segments.next().unwrap_or_default();
    if method.eq_ignore_ascii_case("OPTIONS") {
        return Some(Route::Preflight);
    }
    let route = match (method.to_ascii_uppercase().as_str(), parent, leaf) {
        ("GET", "isin-track", "user-isines") => Route::IsinTrackUserIsines,
        ("POST", "isin-track", "user-params") => Route::IsinTrackUserParams,
        ("GET", "isin-track", "folios") => Route::IsinTrackFolios,
        ("GET", _, "curves-intra") => Route::CurvesIntra,
        ("GET", _, "curves-eod") => Route::CurvesEod,
        ("GET", _, "folios-intra") => Route::CurveFoliosIntra,
        ("GET", _, "folios-eod") => Route::CurveFoliosEod,
        ("POST", "portfolio-track", "user-params") => Route::PortfolioUserParams,
        ("GET", _, "user-portfolios") => Route::PortfolioUserPortfolios,
        ("GET", "isin-search", "isines") => Route::SearchIsines,
        ("POST", _, "titles") => Route::SearchTitles,
        ("GET", _, "issuers") => Route::SearchIssuers,
        ("GET", _, "top-delta-category") => Route::TopDeltaRanking,
        ("GET", "top-delta-category", "details") => Route::TopDeltaDetails,
        ("GET", _, "slider") => Route::Slider,
        _ => return None,
    };
    Some(route)
}

async fn dispatch(
    ctx: &ApiContext<'_>,
    route: Route,
    request: &ApiRequest,
) -> Result<Value, ApiError> {
    match route {
        Route::Preflight => Ok(json!({})),
        Route::IsinTrackUserIsines => isin_track::user_isines(ctx, request).await,
        Route::IsinTrackUserParams => isin_track::user_params(ctx, request).await,
        Route::IsinTrackFolios => isin_track::folios(ctx, request).await,
        Route::CurvesIntra => curve_compare::curves_intra(ctx, request).await,
        Route::CurvesEod => curve_compare::curves_eod(ctx, request).await,
        Route::CurveFoliosIntra => curve_compare::folios_intra(ctx, request).await,
        Route::CurveFoliosEod => curve_compare::folios_eod(ctx, request).await,
        Route::PortfolioUserParams => portfolio_track::user_params(ctx, request).await,
        Route::PortfolioUserPortfolios => portfolio_track::user_portfolios(ctx, request).await,
        Route::SearchIsines => isin_search::isines(ctx, request).await,
        Route::SearchTitles => isin_search::titles(ctx, request).await,
        Route::SearchIssuers => isin_search::issuers(ctx).await,
        Route::TopDeltaRanking => top_delta::ranking(ctx).await,
        Route::TopDeltaDetails => top_delta::details(ctx, request).await,
        Route::Slider => slider::slider(ctx).await,
    }
}

pub async fn handle_api_event(ctx: &ApiContext<'_>, event: Value) -> ApiGatewayResponse {
    let request = match serde_json::from_value::<ApiRequest>(event) {
        Ok(request) => request,
        Err(error) => {
            return error_response(&ApiError::BadRequest(format!("Malformed request: {error}")))
        }
    };
    let Some(route) = route(&request.method, &request.path) else {
        return error_response(&ApiError::NotFound(format!(
            "no endpoint for {} {}",
            request.method, request.path
        )));
    };

    match dispatch(ctx, route, &request).await {
        Ok(body) => {
            info!(
                component = "api",
                event = "request_served",
                method = request.method.as_str(),
                path = request.path.as_str(),
            );
            success_response(200, &body)
        }
        Err(failure) => {
            if failure.status_code() >= 500 {
                error!(
                    component = "api",
                    event = "request_failed",
                    path = request.path.as_str(),
                    error = %failure,
                );
            } else {
                warn!(
                    component = "api",
                    event = "request_rejected",
                    path = request.path.as_str(),
                    status = failure.status_code(),
                    error = %failure,
                );
            }
            error_response(&failure)
        }
    }
}

fn cors_headers() -> Value {
    json!({
        "Content-Type": "application/json",
        "Access-Control-Allow-Headers": "*",
        "Access-Control-Allow-Origin": "*",
        "Access-Control-Allow-Methods": "*",
    })
}

fn success_response(status_code: u16, body: &Value) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: cors_headers(),
        body: body.to_string(),
    }
}

fn error_response(failure: &ApiError) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code: failure.status_code(),
        headers: cors_headers(),
        body: json!({ "message": failure.to_string() }).to_string(),
    }
}
