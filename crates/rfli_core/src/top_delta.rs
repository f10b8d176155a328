//! top-delta-category: ranking of category average-yield moves and the
//! per-category detail documents.

use std::collections::{BTreeMap, HashMap, HashSet};

use indexmap::IndexMap;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub const TOP_BY_VOLUME: usize = 10;
pub const TOP_BY_VARIATION: usize = 20;
pub const ISSUER_NOT_FOUND: &str = "No hallado";
/// Margin type of categories priced from their own trades.
pub const CALCULATED_MARGIN: &str = "C";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopDeltaError {
    #[error("CURVE_RELATION pattern for '{curve}' is invalid: {message}")]
    InvalidCurvePattern { curve: String, message: String },
}

/// Per-category averages for the valuation date and the previous day.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAggregateRow {
    pub category_id: i64,
    pub today_avg: Option<Decimal>,
    pub yesterday_avg: Option<Decimal>,
    pub volume: i64,
    pub category_class: Option<String>,
    pub currency_group: Option<String>,
    pub rate_group: Option<String>,
    pub rating_group: Option<String>,
    pub maturity_range: Option<String>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMarginRow {
    pub category_id: i64,
    pub margin_type: Option<String>,
}

/// An ISIN priced today in one of the ranked categories.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryIsinRow {
    pub category_id: i64,
    pub isin_code: String,
    pub instrument: Option<String>,
    pub maturity_days: i64,
    #[serde(rename = "yield")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "yield"))]
    pub yield_rate: Option<Decimal>,
    pub yesterday_yield: Option<Decimal>,
    pub issuer_name: Option<String>,
}

/// Midpoint, in days, of a category's maturity range.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeMidpointRow {
    pub category_id: i64,
    pub range_average: Decimal,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopDeltaFolioRow {
    pub category_id: i64,
    pub nemo: Option<String>,
    pub sheet: Option<String>,
    #[serde(rename = "yield")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "yield"))]
    pub yield_rate: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub trading_system: Option<String>,
    pub folio_type: String,
    pub maturity_date: Option<String>,
    pub timestamp_operation: Option<String>,
}

/// Average curve move (basis points) per curve, up to a maturity term.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveChangeRow {
    pub cc_curve: String,
    pub pbs_diff: Option<Decimal>,
}

/// `TOP_CATEGORY_PARAMS` parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopCategoryParams {
    #[serde(rename = "PARAMETERS_CLASS", default)]
    pub classes: BTreeMap<String, String>,
    #[serde(rename = "PARAMETERS_CURRENCY_GROUP", default)]
    pub currencies: BTreeMap<String, String>,
    #[serde(rename = "PARAMETERS_RATE_GROUP", default)]
    pub rates: BTreeMap<String, String>,
    #[serde(rename = "PARAMETERS_RATING_GROUP", default)]
    pub ratings: BTreeMap<String, String>,
    #[serde(rename = "PARAMETERS_MATURITY_RANGE", default)]
    pub maturities: BTreeMap<String, String>,
    /// Maturity range id to its maximum term in days.
    #[serde(rename = "MAX_MATURITY_RANGE", default)]
    pub max_maturity_range: BTreeMap<String, i64>,
    /// Curve name to a pattern over `"class,currency,rate"`. The first
    /// pattern in configured order that matches wins.
    #[serde(rename = "CURVE_RELATION", default)]
    pub curve_relation: IndexMap<String, String>,
}

/// One curve-change query to run: rows up to `max_term` days, or every term
/// for the last range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTerm {
    pub range: String,
    pub max_term: Option<i64>,
}

impl TopCategoryParams {
    /// Maturity ranges ordered by their maximum term.
    pub fn range_terms(&self) -> Vec<RangeTerm> {
        let mut ordered: Vec<(&String, i64)> = self
            .max_maturity_range
            .iter()
            .map(|(range, term)| (range, *term))
            .collect();
        ordered.sort_by_key(|(range, term)| (*term, range.parse::<i64>().unwrap_or(i64::MAX)));
        let last = ordered.len().saturating_sub(1);
        ordered
            .into_iter()
            .enumerate()
            .map(|(index, (range, term))| RangeTerm {
                range: normalize_key(range),
                max_term: (index != last).then_some(term),
            })
            .collect()
    }

    fn curve_matchers(&self) -> Result<Vec<(String, Regex)>, TopDeltaError> {
        self.curve_relation
            .iter()
            .map(|(curve, pattern)| {
                Regex::new(&format!("^(?:{pattern})$"))
                    .map(|regex| (curve.clone(), regex))
                    .map_err(|error| TopDeltaError::InvalidCurvePattern {
                        curve: curve.clone(),
                        message: error.to_string(),
                    })
            })
            .collect()
    }
}

/// Curve changes per maturity range, in [`TopCategoryParams::range_terms`]
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurveChanges {
    ranges: Vec<(String, HashMap<String, Option<Decimal>>)>,
}

impl CurveChanges {
    pub fn push(&mut self, range: &str, rows: Vec<CurveChangeRow>) {
        let changes = rows.into_iter().map(|row| (row.cc_curve, row.pbs_diff)).collect();
        self.ranges.push((normalize_key(range), changes));
    }

    /// Change of `cc_curve` in the category's range, or in the last range.
    pub fn lookup(&self, range: Option<&str>, cc_curve: &str) -> Option<Decimal> {
        let wanted = range.map(normalize_key);
        let changes = self
            .ranges
            .iter()
            .find(|(known, _)| Some(known) == wanted.as_ref())
            .or_else(|| self.ranges.last())?;
        changes.1.get(cc_curve).copied().flatten()
    }
}

/// Group ids arrive as `5`, `5.0` or ` 5 ` depending on the column type.
fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '\'' || c == '"').trim();
    match trimmed.parse::<Decimal>() {
        Ok(number) if number.fract().is_zero() => number.trunc().normalize().to_string(),
        _ => trimmed.to_string(),
    }
}

/// Parses `EXCLUDED_CATEGORY_CLASSES` (`'4','9'` or `4,9`).
pub fn parse_excluded_classes(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(normalize_key)
        .filter(|class| !class.is_empty())
        .collect()
}

fn basis_points(value: Decimal) -> Decimal {
    (value * Decimal::ONE_HUNDRED).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCategory {
    pub ranking_index: usize,
    pub tir_variation: Decimal,
    pub abs_tir_variation: Decimal,
    pub category: CategoryAggregateRow,
}

/// Top categories by volume first, then by absolute average-yield move.
/// Categories without a class are never ranked.
pub fn rank_categories(
    rows: Vec<CategoryAggregateRow>,
    excluded_classes: &HashSet<String>,
) -> Vec<RankedCategory> {
    let mut candidates: Vec<(Decimal, Decimal, CategoryAggregateRow)> = rows
        .into_iter()
        .filter(|row| {
            row.category_class
                .as_deref()
                .is_some_and(|class| !excluded_classes.contains(&normalize_key(class)))
        })
        .filter_map(|row| {
            let delta = row.today_avg? - row.yesterday_avg?;
            Some((basis_points(delta), basis_points(delta.abs()), row))
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.2.volume
            .cmp(&a.2.volume)
            .then(a.2.category_id.cmp(&b.2.category_id))
    });
    let rest = candidates.split_off(TOP_BY_VOLUME.min(candidates.len()));
    let mut by_variation = rest;
    by_variation.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.category_id.cmp(&b.2.category_id)));
    by_variation.truncate(TOP_BY_VARIATION);

    candidates
        .into_iter()
        .chain(by_variation)
        .enumerate()
        .map(|(index, (tir_variation, abs_tir_variation, category))| RankedCategory {
            ranking_index: index + 1,
            tir_variation,
            abs_tir_variation,
            category,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsinReference {
    pub isin_code: String,
    pub instrument: Option<String>,
    pub maturity_days: i64,
    pub issuer: String,
    pub today_yield: Decimal,
    pub yesterday_yield: Decimal,
    pub variation: Decimal,
}

impl IsinReference {
    fn from_row(row: &CategoryIsinRow) -> Self {
        let today_yield = row.yield_rate.unwrap_or_default();
        let yesterday_yield = row.yesterday_yield.unwrap_or_default();
        Self {
            isin_code: row.isin_code.clone(),
            instrument: row.instrument.clone(),
            maturity_days: row.maturity_days,
            issuer: row
                .issuer_name
                .clone()
                .unwrap_or_else(|| ISSUER_NOT_FOUND.to_string()),
            today_yield,
            yesterday_yield,
            variation: today_yield - yesterday_yield,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IsinReferences {
    pub total_isines: usize,
    pub short: Option<IsinReference>,
    pub medium: Option<IsinReference>,
    pub long: Option<IsinReference>,
}

/// Shortest, closest-to-midpoint and longest ISIN of one category.
pub fn isin_references(rows: &[&CategoryIsinRow], midpoint: Option<Decimal>) -> IsinReferences {
    let short = rows
        .iter()
        .min_by(|a, b| a.maturity_days.cmp(&b.maturity_days).then(a.isin_code.cmp(&b.isin_code)));
    let long = rows
        .iter()
        .max_by(|a, b| a.maturity_days.cmp(&b.maturity_days).then(b.isin_code.cmp(&a.isin_code)));
    let medium = midpoint.and_then(|midpoint| {
        rows.iter().min_by(|a, b| {
            let distance_a = (Decimal::from(a.maturity_days) - midpoint).abs();
            let distance_b = (Decimal::from(b.maturity_days) - midpoint).abs();
            distance_a
                .cmp(&distance_b)
                .then(a.isin_code.cmp(&b.isin_code))
        })
    });
    IsinReferences {
        total_isines: rows.len(),
        short: short.map(|row| IsinReference::from_row(row)),
        medium: medium.map(|row| IsinReference::from_row(row)),
        long: long.map(|row| IsinReference::from_row(row)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopDeltaFolio {
    pub nemo: Option<String>,
    pub sheet: Option<String>,
    #[serde(rename = "yield")]
    pub yield_rate: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub trading_system: Option<String>,
    pub folio_type: String,
    pub maturity_date: Option<String>,
    pub timestamp_operation: Option<String>,
}

impl From<&TopDeltaFolioRow> for TopDeltaFolio {
    fn from(row: &TopDeltaFolioRow) -> Self {
        Self {
            nemo: row.nemo.clone(),
            sheet: row.sheet.clone(),
            yield_rate: row.yield_rate,
            amount: row.amount,
            trading_system: row.trading_system.clone(),
            folio_type: row.folio_type.clone(),
            maturity_date: row.maturity_date.clone(),
            timestamp_operation: row.timestamp_operation.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCategoryEntry {
    pub category_id: i64,
    pub abs_tir_variation: Decimal,
    pub tir_variation: Decimal,
    pub description: String,
    pub class_name: String,
    pub category_type: Option<String>,
    pub ranking_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCategoryDocument {
    pub top_category: i64,
    pub data: Vec<TopCategoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDetails {
    pub total_isines: usize,
    pub cc_curve: Option<String>,
    pub category_id: i64,
    pub maturity_range: Option<String>,
    pub pbs_change: Option<Decimal>,
    pub folios: Vec<TopDeltaFolio>,
    pub short_isin_ref: Option<IsinReference>,
    pub medium_isin_ref: Option<IsinReference>,
    pub long_isin_ref: Option<IsinReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDetailsDocument {
    pub ranking_index: usize,
    pub data: CategoryDetails,
}

/// Everything read from the source besides the ranking itself.
#[derive(Debug, Clone, Default)]
pub struct DetailInputs {
    pub margins: Vec<CategoryMarginRow>,
    pub folios: Vec<TopDeltaFolioRow>,
    pub isines: Vec<CategoryIsinRow>,
    pub midpoints: Vec<RangeMidpointRow>,
    pub curve_changes: CurveChanges,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopDeltaDocuments {
    pub ranking: TopCategoryDocument,
    pub details: Vec<CategoryDetailsDocument>,
}

fn label<'a>(labels: &'a BTreeMap<String, String>, key: Option<&str>, default: &'a str) -> &'a str {
    key.map(normalize_key)
        .and_then(|key| labels.get(&key))
        .map(String::as_str)
        .unwrap_or(default)
}

pub fn build_documents(
    ranked: &[RankedCategory],
    inputs: &DetailInputs,
    params: &TopCategoryParams,
) -> Result<TopDeltaDocuments, TopDeltaError> {
    let matchers = params.curve_matchers()?;
    let margin_types: HashMap<i64, &str> = inputs
        .margins
        .iter()
        .filter_map(|row| Some((row.category_id, row.margin_type.as_deref()?)))
        .collect();
    let midpoints: HashMap<i64, Decimal> = inputs
        .midpoints
        .iter()
        .map(|row| (row.category_id, row.range_average))
        .collect();

    let mut entries = Vec::with_capacity(ranked.len());
    let mut details = Vec::with_capacity(ranked.len());
    for item in ranked {
        let category = &item.category;
        let id = category.category_id;
        let class_name = label(&params.classes, category.category_class.as_deref(), "UN SECTOR");
        let currency = label(&params.currencies, category.currency_group.as_deref(), "UNA MONEDA");
        let rate = label(&params.rates, category.rate_group.as_deref(), "DE UNA TASA");
        let rating = label(
            &params.ratings,
            category.rating_group.as_deref(),
            "CALIFICADA DE ALGUN MODO",
        );
        let maturity = label(
            &params.maturities,
            category.maturity_range.as_deref(),
            "EN UN PLAZO ESPECIFICO",
        );
        let category_type = margin_types.get(&id).map(|kind| kind.to_string());

        let rows: Vec<&CategoryIsinRow> = inputs
            .isines
            .iter()
            .filter(|row| row.category_id == id)
            .collect();
        let references = isin_references(&rows, midpoints.get(&id).copied());

        let mut detail = CategoryDetails {
            total_isines: references.total_isines,
            cc_curve: None,
            category_id: id,
            maturity_range: None,
            pbs_change: None,
            folios: Vec::new(),
            short_isin_ref: references.short,
            medium_isin_ref: references.medium,
            long_isin_ref: references.long,
        };
        if category_type.as_deref() == Some(CALCULATED_MARGIN) {
            detail.folios = inputs
                .folios
                .iter()
                .filter(|folio| folio.category_id == id)
                .map(TopDeltaFolio::from)
                .collect();
        } else {
            let key = format!(
                "{},{},{}",
                category.category_class.as_deref().map(normalize_key).unwrap_or_default(),
                category.currency_group.as_deref().map(normalize_key).unwrap_or_default(),
                category.rate_group.as_deref().map(normalize_key).unwrap_or_default(),
            );
            if let Some((curve, _)) = matchers.iter().find(|(_, regex)| regex.is_match(&key)) {
                detail.pbs_change = inputs
                    .curve_changes
                    .lookup(category.maturity_range.as_deref(), curve);
                detail.cc_curve = Some(curve.clone());
                detail.maturity_range = Some(maturity.to_string());
            }
        }

        entries.push(TopCategoryEntry {
            category_id: id,
            abs_tir_variation: item.abs_tir_variation,
            tir_variation: item.tir_variation,
            description: format!("{class_name} en {currency} {rate} {rating} {maturity}"),
            class_name: class_name.to_string(),
            category_type,
            ranking_index: item.ranking_index,
        });
        details.push(CategoryDetailsDocument {
            ranking_index: item.ranking_index,
            data: detail,
        });
    }

    Ok(TopDeltaDocuments {
        ranking: TopCategoryDocument {
            top_category: 1,
            data: entries,
        },
        details,
    })
}
