//! portfolio-track: priced ISINs enriched with issuer and curve, the
//! per-user tracked ISIN documents and the stored portfolios.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::contract::DEFAULT_USER;
use crate::ratings::RatingCatalogue;

pub const DEFAULT_PORTFOLIO: &str = "PREDETERMINADO";

pub const DEFAULT_PORTFOLIO_ISINES: [&str; 10] = [
    "COD16CB00022",
    "COT09CB00049",
    "COT09CB00064",
    "COT09CB00080",
    "COT09CB00098",
    "COT09CB00106",
    "COB01CB00150",
    "COB01CB00143",
    "COB07CB00355",
    "COB07CB00363",
];

/// Portfolio name to held quantity per ISIN.
pub type Portfolios = BTreeMap<String, BTreeMap<String, Decimal>>;

/// Today's price inner-joined with yesterday's. `real_rating` is only
/// selected by the end-of-day query.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPriceRow {
    pub isin_code: String,
    pub maturity_date: Option<String>,
    #[serde(rename = "yield")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "yield"))]
    pub yield_rate: Option<Decimal>,
    pub yesterday_yield: Option<Decimal>,
    pub clean_price: Option<Decimal>,
    pub accrued_interest: Option<Decimal>,
    pub clean_price_yesterday: Option<Decimal>,
    pub difference: Option<Decimal>,
    pub instrument: Option<String>,
    pub issue_date: Option<String>,
    pub spread: Option<Decimal>,
    pub payment_frequency: Option<String>,
    pub mean_price: Option<Decimal>,
    pub mean_price_yesterday: Option<Decimal>,
    pub margin_value: Option<Decimal>,
    pub category_id: Option<i64>,
    pub equivalent_margin: Option<Decimal>,
    #[cfg_attr(feature = "sqlx", sqlx(default))]
    pub real_rating: Option<String>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRow {
    pub isin_code: String,
    pub issuer: Option<String>,
    pub issuer_name: Option<String>,
    pub cc_curve: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioIsin {
    pub maturity_date: Option<String>,
    #[serde(rename = "yield")]
    pub yield_rate: Option<Decimal>,
    pub yesterday_yield: Option<Decimal>,
    pub clean_price: Option<Decimal>,
    pub accrued_interest: Option<Decimal>,
    pub clean_price_yesterday: Option<Decimal>,
    pub difference: Option<Decimal>,
    pub instrument: Option<String>,
    pub issue_date: Option<String>,
    pub spread: Option<Decimal>,
    pub payment_frequency: Option<String>,
    pub mean_price: Option<Decimal>,
    pub mean_price_yesterday: Option<Decimal>,
    pub margin_value: Option<Decimal>,
    pub equivalent_margin: Option<Decimal>,
    pub real_rating: String,
    pub issuer: Option<String>,
    pub issuer_name: Option<String>,
    pub cc_curve: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioIsinDocument {
    pub isin: String,
    pub data: PortfolioIsin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioUserIsines {
    pub user_id: String,
    pub isines: Vec<PortfolioIsinDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsinParams {
    pub user_id: String,
    pub isines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioParams {
    pub user_id: String,
    pub portfolios: Portfolios,
}

/// Where `real_rating` comes from.
#[derive(Debug, Clone, Copy)]
pub enum RatingSource<'a> {
    /// Intraday: resolved from the category rating group.
    Catalogue(&'a RatingCatalogue),
    /// End of day: the price table's own column.
    PriceColumn,
}

pub fn build_all_isines(
    prices: Vec<PortfolioPriceRow>,
    instruments: &[InstrumentRow],
    ratings: RatingSource<'_>,
) -> Vec<PortfolioIsinDocument> {
    let by_isin: HashMap<&str, &InstrumentRow> = instruments
        .iter()
        .map(|row| (row.isin_code.as_str(), row))
        .collect();
    prices
        .into_iter()
        .map(|price| {
            let instrument = by_isin.get(price.isin_code.as_str());
            let real_rating = match ratings {
                RatingSource::Catalogue(catalogue) => catalogue.resolve(price.category_id),
                RatingSource::PriceColumn => price
                    .real_rating
                    .clone()
                    .unwrap_or_else(|| crate::ratings::UNKNOWN_RATING.to_string()),
            };
            PortfolioIsinDocument {
                isin: price.isin_code,
                data: PortfolioIsin {
                    maturity_date: price.maturity_date,
                    yield_rate: price.yield_rate,
                    yesterday_yield: price.yesterday_yield,
                    clean_price: price.clean_price,
                    accrued_interest: price.accrued_interest,
                    clean_price_yesterday: price.clean_price_yesterday,
                    difference: price.difference,
                    instrument: price.instrument,
                    issue_date: price.issue_date,
                    spread: price.spread,
                    payment_frequency: price.payment_frequency,
                    mean_price: price.mean_price,
                    mean_price_yesterday: price.mean_price_yesterday,
                    margin_value: price.margin_value,
                    equivalent_margin: price.equivalent_margin,
                    real_rating,
                    issuer: instrument.and_then(|row| row.issuer.clone()),
                    issuer_name: instrument.and_then(|row| row.issuer_name.clone()),
                    cc_curve: instrument.and_then(|row| row.cc_curve.clone()),
                },
            }
        })
        .collect()
}

/// User documents keep the all-isines order, not the requested order.
pub fn build_user_isines(
    params: &[IsinParams],
    all_isines: &[PortfolioIsinDocument],
) -> Vec<PortfolioUserIsines> {
    params
        .iter()
        .map(|user| PortfolioUserIsines {
            user_id: user.user_id.clone(),
            isines: all_isines
                .iter()
                .filter(|doc| user.isines.contains(&doc.isin))
                .cloned()
                .collect(),
        })
        .collect()
}

pub fn default_portfolio_params() -> PortfolioParams {
    let holdings = DEFAULT_PORTFOLIO_ISINES
        .iter()
        .map(|isin| (isin.to_string(), Decimal::ZERO))
        .collect();
    let mut portfolios = Portfolios::new();
    portfolios.insert(DEFAULT_PORTFOLIO.to_string(), holdings);
    PortfolioParams {
        user_id: DEFAULT_USER.to_string(),
        portfolios,
    }
}

pub fn default_isin_params() -> IsinParams {
    IsinParams {
        user_id: DEFAULT_USER.to_string(),
        isines: DEFAULT_PORTFOLIO_ISINES.iter().map(|isin| isin.to_string()).collect(),
    }
}
