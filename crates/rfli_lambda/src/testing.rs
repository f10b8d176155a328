//! Recording fakes for the adapter traits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::adapters::invoke::JobInvoker;
use crate::adapters::key_value::{ItemKey, KeyValueStore};
use crate::adapters::market_source::MarketSource;
use crate::adapters::notify::Notifier;
use crate::adapters::parameters::ParameterSource;
use crate::config::RuntimeConfig;
use crate::errors::{ConfigError, SourceError, StoreError};
use crate::handlers::api::ApiGatewayResponse;
use crate::runtime::contract::{Component, NextStatus, VersionRecord};
use crate::runtime::curve_compare::{CurveFolioRow, CurveRow};
use crate::runtime::isin_search::{IsinIssuerRow, SearchCategoryRow, SearchPriceRow};
use crate::runtime::isin_track::{CategoryRow, FolioRow, PriceRow};
use crate::runtime::portfolio_track::{InstrumentRow, PortfolioPriceRow};
use crate::runtime::ratings::CategoryRatingRow;
use crate::runtime::schedule::MARKET_TIME_ZONE;
use crate::runtime::slider::SliderRow;
use crate::runtime::table_names::Table;
use crate::runtime::top_delta::{
    CategoryAggregateRow, CategoryIsinRow, CategoryMarginRow, CurveChangeRow, RangeMidpointRow,
    TopDeltaFolioRow,
};

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    batches: Mutex<Vec<(Table, usize)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, table: Table, documents: Vec<Value>) {
        for document in documents {
            self.upsert(table, document);
        }
    }

    pub fn documents(&self, table: Table) -> Vec<Value> {
        self.tables
            .lock()
            .expect("poisoned mutex")
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn document(&self, table: Table, key: &ItemKey) -> Option<Value> {
        self.documents(table)
            .into_iter()
            .find(|document| ItemKey::of_document(table, document).as_ref() == Some(key))
    }

    /// `(table, items)` of every `put_items` call, in order.
    pub fn batches(&self) -> Vec<(Table, usize)> {
        self.batches.lock().expect("poisoned mutex").clone()
    }

    fn upsert(&self, table: Table, document: Value) {
        let key = ItemKey::of_document(table, &document);
        let mut tables = self.tables.lock().expect("poisoned mutex");
        let rows = tables.entry(table).or_default();
        match rows
            .iter()
            .position(|row| key.is_some() && ItemKey::of_document(table, row) == key)
        {
            Some(index) => rows[index] = document,
            None => rows.push(document),
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get_item(&self, table: Table, key: &ItemKey) -> Result<Option<Value>, StoreError> {
        Ok(self.document(table, key))
    }

    async fn put_item(&self, table: Table, item: Value) -> Result<(), StoreError> {
        self.upsert(table, item);
        Ok(())
    }

    async fn put_items(&self, table: Table, items: Vec<Value>) -> Result<(), StoreError> {
        self.batches
            .lock()
            .expect("poisoned mutex")
            .push((table, items.len()));
        for item in items {
            self.upsert(table, item);
        }
        Ok(())
    }

    async fn scan_items(&self, table: Table) -> Result<Vec<Value>, StoreError> {
        Ok(self.documents(table))
    }

    async fn delete_items(&self, table: Table, keys: Vec<ItemKey>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("poisoned mutex");
        if let Some(rows) = tables.get_mut(&table) {
            rows.retain(|row| {
                ItemKey::of_document(table, row).map_or(true, |key| !keys.contains(&key))
            });
        }
        Ok(())
    }
}

/// Source returning fixed rows; `timeout_on` makes that query time out.
#[derive(Default)]
pub struct CannedSource {
    pub business_day: bool,
    pub timeout_on: Option<&'static str>,
    pub category_ratings: Vec<CategoryRatingRow>,
    pub isin_track_prices: Vec<PriceRow>,
    pub isin_track_categories: Vec<CategoryRow>,
    pub isin_track_folios: Vec<FolioRow>,
    pub curves: HashMap<NaiveDate, Vec<CurveRow>>,
    pub curve_folios: HashMap<NaiveDate, Vec<CurveFolioRow>>,
    pub portfolio_prices: Vec<PortfolioPriceRow>,
    pub portfolio_instruments: Vec<InstrumentRow>,
    pub search_prices: Vec<SearchPriceRow>,
    pub search_categories: Vec<SearchCategoryRow>,
    pub isin_issuers: Vec<IsinIssuerRow>,
    pub matured_isines: Vec<String>,
    pub active_issuers: Vec<String>,
    pub category_aggregates: Vec<CategoryAggregateRow>,
    pub category_margins: Vec<CategoryMarginRow>,
    pub curve_changes: HashMap<Option<i64>, Vec<CurveChangeRow>>,
    pub category_folios: Vec<TopDeltaFolioRow>,
    pub category_isines: Vec<CategoryIsinRow>,
    pub range_midpoints: Vec<RangeMidpointRow>,
    pub slider_tes: Vec<SliderRow>,
    pub slider_categories: HashMap<i64, Vec<SliderRow>>,
    pub calls: Mutex<Vec<String>>,
}

impl CannedSource {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("poisoned mutex").clone()
    }

    fn answer<T: Clone>(&self, query: &'static str, rows: &[T]) -> Result<Vec<T>, SourceError> {
        self.record(query.to_string());
        if self.timeout_on == Some(query) {
            return Err(SourceError::QueryTimeout { query });
        }
        Ok(rows.to_vec())
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("poisoned mutex").push(call);
    }
}

#[async_trait]
impl MarketSource for CannedSource {
    async fn is_business_day(&self, date: NaiveDate) -> Result<bool, SourceError> {
        self.record(format!("business_day {date}"));
        Ok(self.business_day)
    }

    async fn category_ratings(&self) -> Result<Vec<CategoryRatingRow>, SourceError> {
        self.answer("category_ratings", &self.category_ratings)
    }

    async fn isin_track_prices(
        &self,
        _today: NaiveDate,
        _yesterday: NaiveDate,
    ) -> Result<Vec<PriceRow>, SourceError> {
        self.answer("isin_track_prices", &self.isin_track_prices)
    }

    async fn isin_track_categories(
        &self,
        _today: NaiveDate,
    ) -> Result<Vec<CategoryRow>, SourceError> {
        self.answer("isin_track_categories", &self.isin_track_categories)
    }

    async fn isin_track_folios(&self, _today: NaiveDate) -> Result<Vec<FolioRow>, SourceError> {
        self.answer("isin_track_folios", &self.isin_track_folios)
    }

    async fn curves(&self, date: NaiveDate) -> Result<Vec<CurveRow>, SourceError> {
        let rows = self.curves.get(&date).cloned().unwrap_or_default();
        self.answer("curves", &rows)
    }

    async fn curve_folios(&self, date: NaiveDate) -> Result<Vec<CurveFolioRow>, SourceError> {
        let rows = self.curve_folios.get(&date).cloned().unwrap_or_default();
        self.answer("curve_folios", &rows)
    }

    async fn portfolio_prices(
        &self,
        _today: NaiveDate,
        _yesterday: NaiveDate,
        rated: bool,
    ) -> Result<Vec<PortfolioPriceRow>, SourceError> {
        self.record(format!("portfolio_prices rated={rated}"));
        self.answer("portfolio_prices", &self.portfolio_prices)
    }

    async fn portfolio_instruments(&self) -> Result<Vec<InstrumentRow>, SourceError> {
        self.answer("portfolio_instruments", &self.portfolio_instruments)
    }

    async fn search_prices(&self, _today: NaiveDate) -> Result<Vec<SearchPriceRow>, SourceError> {
        self.answer("search_prices", &self.search_prices)
    }

    async fn search_categories(&self) -> Result<Vec<SearchCategoryRow>, SourceError> {
        self.answer("search_categories", &self.search_categories)
    }

    async fn isin_issuers(&self) -> Result<Vec<IsinIssuerRow>, SourceError> {
        self.answer("isin_issuers", &self.isin_issuers)
    }

    async fn matured_isines(
        &self,
        _today: NaiveDate,
        _yesterday: NaiveDate,
    ) -> Result<Vec<String>, SourceError> {
        self.answer("matured_isines", &self.matured_isines)
    }

    async fn active_issuers(&self) -> Result<Vec<String>, SourceError> {
        self.answer("active_issuers", &self.active_issuers)
    }

    async fn category_aggregates(
        &self,
        _today: NaiveDate,
        _yesterday: NaiveDate,
    ) -> Result<Vec<CategoryAggregateRow>, SourceError> {
        self.answer("category_aggregates", &self.category_aggregates)
    }

    async fn category_margins(
        &self,
        _today: NaiveDate,
        category_ids: &[i64],
    ) -> Result<Vec<CategoryMarginRow>, SourceError> {
        let rows: Vec<_> = self
            .category_margins
            .iter()
            .filter(|row| category_ids.contains(&row.category_id))
            .cloned()
            .collect();
        self.answer("category_margins", &rows)
    }

    async fn curve_changes(
        &self,
        _today: NaiveDate,
        _yesterday: NaiveDate,
        max_term: Option<i64>,
    ) -> Result<Vec<CurveChangeRow>, SourceError> {
        self.record(format!("curve_changes max_term={max_term:?}"));
        let rows = self.curve_changes.get(&max_term).cloned().unwrap_or_default();
        self.answer("curve_changes", &rows)
    }

    async fn category_folios(
        &self,
        _today: NaiveDate,
        category_ids: &[i64],
    ) -> Result<Vec<TopDeltaFolioRow>, SourceError> {
        let rows: Vec<_> = self
            .category_folios
            .iter()
            .filter(|row| category_ids.contains(&row.category_id))
            .cloned()
            .collect();
        self.answer("category_folios", &rows)
    }

    async fn category_isines(
        &self,
        _today: NaiveDate,
        _yesterday: NaiveDate,
        category_ids: &[i64],
    ) -> Result<Vec<CategoryIsinRow>, SourceError> {
        let rows: Vec<_> = self
            .category_isines
            .iter()
            .filter(|row| category_ids.contains(&row.category_id))
            .cloned()
            .collect();
        self.answer("category_isines", &rows)
    }

    async fn range_midpoints(
        &self,
        category_ids: &[i64],
    ) -> Result<Vec<RangeMidpointRow>, SourceError> {
        let rows: Vec<_> = self
            .range_midpoints
            .iter()
            .filter(|row| category_ids.contains(&row.category_id))
            .cloned()
            .collect();
        self.answer("range_midpoints", &rows)
    }

    async fn slider_tes(
        &self,
        _today: NaiveDate,
        _yesterday: NaiveDate,
        month_ago: NaiveDate,
    ) -> Result<Vec<SliderRow>, SourceError> {
        self.record(format!("slider_tes since {month_ago}"));
        self.answer("slider_tes", &self.slider_tes)
    }

    async fn slider_category(
        &self,
        _today: NaiveDate,
        _yesterday: NaiveDate,
        category_id: i64,
    ) -> Result<Vec<SliderRow>, SourceError> {
        let rows = self
            .slider_categories
            .get(&category_id)
            .cloned()
            .unwrap_or_default();
        self.answer("slider_category", &rows)
    }
}

pub struct StaticParameters {
    values: HashMap<String, String>,
}

impl StaticParameters {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            values: pairs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl ParameterSource for StaticParameters {
    async fn parameter(&self, name: &str) -> Result<String, ConfigError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::Parameter {
                name: name.to_string(),
                message: "ParameterNotFound".to_string(),
            })
    }
}

pub struct CapturingInvoker {
    payloads: Mutex<Vec<Vec<u8>>>,
    fail: bool,
}

impl CapturingInvoker {
    pub fn new() -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.payloads
            .lock()
            .expect("poisoned mutex")
            .iter()
            .map(|payload| serde_json::from_slice(payload).expect("payload should parse"))
            .collect()
    }
}

#[async_trait]
impl JobInvoker for CapturingInvoker {
    async fn invoke_job_async(&self, payload: &[u8]) -> Result<(), String> {
        if self.fail {
            return Err("function not found".to_string());
        }
        self.payloads
            .lock()
            .expect("poisoned mutex")
            .push(payload.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct CapturingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl CapturingNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().expect("poisoned mutex").clone()
    }
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), String> {
        self.messages
            .lock()
            .expect("poisoned mutex")
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Market-day instant on 2024-03-12 in Bogota.
pub fn bogota(hour: u32, minute: u32) -> DateTime<Utc> {
    MARKET_TIME_ZONE
        .with_ymd_and_hms(2024, 3, 12, hour, minute, 0)
        .single()
        .expect("unambiguous time")
        .with_timezone(&Utc)
}

pub fn market_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 12).expect("valid date")
}

/// Source rows written as JSON; absent optional columns are null.
pub fn rows<T: DeserializeOwned>(value: Value) -> Vec<T> {
    serde_json::from_value(value).expect("rows should deserialize")
}

/// Parameter names as deployed, plus `extra` environment values.
pub fn runtime_config(extra: &[(&str, &str)]) -> RuntimeConfig {
    let mut values: HashMap<String, String> = [
        ("MARKET_OPEN_TIME", "/rfli/open"),
        ("MARKET_CLOSE_TIME", "/rfli/close"),
        ("PRE_EOD_TIME", "/rfli/pre-eod"),
        ("FINAL_EOD_TIME", "/rfli/final-eod"),
        ("INTRA_RATE_TIME", "/rfli/intra-rate"),
        ("MARKET_RATE", "/rfli/market-rate"),
        ("ISIN_SEARCH_PARAMS", "/rfli/isin-search"),
        ("TOP_CATEGORY_PARAMS", "/rfli/top-category"),
        ("SLIDER_PARAMS", "/rfli/slider"),
    ]
    .iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect();
    for (name, value) in extra {
        values.insert(name.to_string(), value.to_string());
    }
    RuntimeConfig::from_lookup(move |name| values.get(name).cloned()).expect("config")
}

/// Open 08:00, close 13:00, pre-EOD 14:30, final EOD 18:00, ten minute
/// intraday rate and two minute market rate.
pub fn schedule_parameters(extra: &[(&str, &str)]) -> StaticParameters {
    let mut pairs = vec![
        ("/rfli/open", "800"),
        ("/rfli/close", "1300"),
        ("/rfli/pre-eod", "1430"),
        ("/rfli/final-eod", "1800"),
        ("/rfli/intra-rate", "600"),
        ("/rfli/market-rate", "120"),
    ];
    pairs.extend_from_slice(extra);
    StaticParameters::new(&pairs)
}

/// Unsigned JWT carrying `unique_name`.
pub fn bearer_token(user: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(json!({ "unique_name": user }).to_string());
    format!("Bearer {header}.{claims}.signature")
}

/// API Gateway proxy event; `user` adds an Authorization header.
pub fn api_event(
    method: &str,
    path: &str,
    query: Value,
    body: Option<Value>,
    user: Option<&str>,
) -> Value {
    let headers = match user {
        Some(user) => json!({ "Authorization": bearer_token(user) }),
        None => Value::Null,
    };
    json!({
        "httpMethod": method,
        "path": path,
        "headers": headers,
        "queryStringParameters": query,
        "body": body.map(|body| Value::String(body.to_string())),
    })
}

pub fn response_body(response: &ApiGatewayResponse) -> Value {
    serde_json::from_str(&response.body).expect("response body should parse")
}

/// Ledger row as stored, for seeding.
pub fn version_row(
    component: Component,
    version: i64,
    next_status: NextStatus,
    next_update: i64,
) -> Value {
    serde_json::to_value(VersionRecord {
        component,
        version,
        next_update,
        next_status,
    })
    .expect("record should serialize")
}
