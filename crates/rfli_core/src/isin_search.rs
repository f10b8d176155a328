//! isin-search: the end-of-day ISIN catalogue and the title filter served
//! to the search screen.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ratings::{rating_name, UNKNOWN_RATING};

/// `equivalent_margin` is a label (`NA`) for floating-spread rate types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarginValue {
    Number(Decimal),
    Label(String),
}

impl MarginValue {
    /// Decodes the textual column value, numeric when it parses.
    pub fn from_column(raw: Option<String>) -> Option<Self> {
        let raw = raw?;
        Some(match raw.trim().parse::<Decimal>() {
            Ok(number) => Self::Number(number),
            Err(_) => Self::Label(raw),
        })
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPriceRow {
    pub isin: String,
    pub nemo: Option<String>,
    pub issue_date: Option<String>,
    pub maturity_date: Option<String>,
    pub maturity_days: Option<i64>,
    pub margin: Option<Decimal>,
    pub equivalent_margin: Option<String>,
    pub mean_price: Option<Decimal>,
    pub clean_price: Option<Decimal>,
    pub accrued_interest: Option<Decimal>,
    pub convexity: Option<Decimal>,
    pub duration: Option<Decimal>,
    pub modified_duration: Option<Decimal>,
    pub rate_type: Option<String>,
    pub category_id: Option<i64>,
    pub currency_type: Option<String>,
    #[serde(rename = "yield")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "yield"))]
    pub yield_rate: Option<Decimal>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCategoryRow {
    pub category_id: i64,
    pub category_class: Option<String>,
    pub rating_group: Option<String>,
    pub maturity_range: Option<i64>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsinIssuerRow {
    pub isin_code: String,
    pub issuer_name: String,
}

/// `ISIN_SEARCH_PARAMS` parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(rename = "PARAMETERS_CLASS", default)]
    pub class_names: BTreeMap<String, String>,
}

/// One document of the search catalogue, keyed by `isin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIsin {
    pub isin: String,
    pub nemo: Option<String>,
    pub issue_date: Option<String>,
    pub maturity_date: Option<String>,
    pub maturity_days: Option<i64>,
    pub margin: Option<Decimal>,
    pub equivalent_margin: Option<MarginValue>,
    pub mean_price: Option<Decimal>,
    pub clean_price: Option<Decimal>,
    pub accrued_interest: Option<Decimal>,
    pub convexity: Option<Decimal>,
    pub duration: Option<Decimal>,
    pub modified_duration: Option<Decimal>,
    pub rate_type: Option<String>,
    pub currency_type: Option<String>,
    #[serde(rename = "yield")]
    pub yield_rate: Option<Decimal>,
    pub real_rating: String,
    pub maturity_range: i64,
    pub issuer_name: String,
    pub class_name: String,
}

/// Issuer list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerDocument {
    pub issuer: String,
}

pub fn build_documents(
    prices: Vec<SearchPriceRow>,
    categories: &[SearchCategoryRow],
    issuers: &[IsinIssuerRow],
    params: &SearchParams,
) -> Vec<SearchIsin> {
    let by_category: HashMap<i64, &SearchCategoryRow> = categories
        .iter()
        .map(|row| (row.category_id, row))
        .collect();
    let issuer_names: HashMap<&str, &str> = issuers
        .iter()
        .map(|row| (row.isin_code.as_str(), row.issuer_name.as_str()))
        .collect();

    prices
        .into_iter()
        .map(|price| {
            let category = price.category_id.and_then(|id| by_category.get(&id));
            let real_rating = category
                .and_then(|row| row.rating_group.as_deref())
                .and_then(|group| group.trim().parse::<f64>().ok())
                .and_then(|group| rating_name(group as i64))
                .unwrap_or(UNKNOWN_RATING)
                .to_string();
            let class_name = category
                .and_then(|row| row.category_class.as_deref())
                .and_then(|class| params.class_names.get(class.trim()))
                .cloned()
                .unwrap_or_else(|| UNKNOWN_RATING.to_string());
            SearchIsin {
                issuer_name: issuer_names
                    .get(price.isin.as_str())
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| UNKNOWN_RATING.to_string()),
                maturity_range: category.and_then(|row| row.maturity_range).unwrap_or(0),
                real_rating,
                class_name,
                isin: price.isin,
                nemo: price.nemo,
                issue_date: price.issue_date,
                maturity_date: price.maturity_date,
                maturity_days: price.maturity_days,
                margin: price.margin,
                equivalent_margin: MarginValue::from_column(price.equivalent_margin),
                mean_price: price.mean_price,
                clean_price: price.clean_price,
                accrued_interest: price.accrued_interest,
                convexity: price.convexity,
                duration: price.duration,
                modified_duration: price.modified_duration,
                rate_type: price.rate_type,
                currency_type: price.currency_type,
                yield_rate: price.yield_rate,
            }
        })
        .collect()
}

/// Which stored ISINs the init job removes.
pub fn isines_to_delete(stored: &[String], matured: &[String], empty_all: bool) -> Vec<String> {
    if empty_all {
        return stored.to_vec();
    }
    stored
        .iter()
        .filter(|isin| matured.contains(isin))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default)]
    pub min: Option<Decimal>,
    #[serde(default)]
    pub max: Option<Decimal>,
}

impl Bounds {
    fn admits(&self, value: Option<Decimal>) -> bool {
        if self.min.is_none() && self.max.is_none() {
            return true;
        }
        let Some(value) = value else {
            return false;
        };
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Body of the titles search. Empty strings and nulls do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TitleFilter {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub rate_type: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub maturity_days: Bounds,
    #[serde(default, rename = "yield")]
    pub yield_rate: Bounds,
}

fn text_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
    match wanted.as_deref().filter(|value| !value.is_empty()) {
        None => true,
        Some(value) => actual == Some(value),
    }
}

impl TitleFilter {
    pub fn matches(&self, isin: &SearchIsin) -> bool {
        text_matches(&self.issuer, Some(&isin.issuer_name))
            && text_matches(&self.rating, Some(&isin.real_rating))
            && text_matches(&self.rate_type, isin.rate_type.as_deref())
            && text_matches(&self.currency, isin.currency_type.as_deref())
            && text_matches(&self.class_name, Some(&isin.class_name))
            && self
                .maturity_days
                .admits(isin.maturity_days.map(Decimal::from))
            && self.yield_rate.admits(isin.yield_rate)
    }

    /// Matching documents, at most `limit`.
    pub fn apply(&self, isines: Vec<SearchIsin>, limit: usize) -> Vec<SearchIsin> {
        isines
            .into_iter()
            .filter(|isin| self.matches(isin))
            .take(limit)
            .collect()
    }
}
