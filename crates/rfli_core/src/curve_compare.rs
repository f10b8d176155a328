//! curve-compare: daily curve betas paired with their reference curve, and
//! the trade folios behind each curve.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A historical day needs at least this many curves to be stored.
pub const MIN_CURVES_PER_DAY: usize = 5;

/// Reference curve compared against `cc_curve`, if any.
pub fn reference_curve(cc_curve: &str) -> Option<&'static str> {
    match cc_curve {
        "BAAA12" | "BAAA2" => Some("CEC"),
        "BAAA3" => Some("CECUVR"),
        _ => None,
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveRow {
    pub cc_curve: String,
    pub beta_0: Option<Decimal>,
    pub beta_1: Option<Decimal>,
    pub beta_2: Option<Decimal>,
    pub tau: Option<Decimal>,
    pub days: Option<String>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFolioRow {
    pub cc_curve: String,
    pub amount: Option<Decimal>,
    pub maturity_date: Option<String>,
    pub nemo: Option<String>,
    pub sheet: Option<String>,
    pub maturity_days: Option<i64>,
    #[serde(rename = "yield")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "yield"))]
    pub yield_rate: Option<Decimal>,
    pub timestamp_operation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveData {
    pub beta_0: Option<Decimal>,
    pub beta_1: Option<Decimal>,
    pub beta_2: Option<Decimal>,
    pub tau: Option<Decimal>,
    pub beta_0_r: Option<Decimal>,
    pub beta_1_r: Option<Decimal>,
    pub beta_2_r: Option<Decimal>,
    pub tau_r: Option<Decimal>,
    pub days: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFolio {
    pub amount: Option<Decimal>,
    pub maturity_date: Option<String>,
    pub nemo: Option<String>,
    pub sheet: Option<String>,
    pub maturity_days: Option<i64>,
    #[serde(rename = "yield")]
    pub yield_rate: Option<Decimal>,
    pub timestamp_operation: Option<String>,
}

impl From<CurveFolioRow> for CurveFolio {
    fn from(row: CurveFolioRow) -> Self {
        Self {
            amount: row.amount,
            maturity_date: row.maturity_date,
            nemo: row.nemo,
            sheet: row.sheet,
            maturity_days: row.maturity_days,
            yield_rate: row.yield_rate,
            timestamp_operation: row.timestamp_operation,
        }
    }
}

/// Intraday curve document. `data` is null for a curve not published today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveDocument {
    pub cc_curve: String,
    pub data: Option<CurveData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFoliosDocument {
    pub cc_curve: String,
    pub data: Vec<CurveFolio>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EodCurveDocument {
    pub valuation_date: String,
    pub cc_curve: String,
    pub data: CurveData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EodCurveFoliosDocument {
    pub valuation_date: String,
    pub cc_curve: String,
    pub data: Vec<CurveFolio>,
}

/// Attaches the reference curve's betas to every curve of one day.
pub fn pair_with_references(curves: &[CurveRow]) -> BTreeMap<String, CurveData> {
    let by_name: BTreeMap<&str, &CurveRow> = curves
        .iter()
        .map(|curve| (curve.cc_curve.as_str(), curve))
        .collect();
    by_name
        .iter()
        .map(|(name, curve)| {
            let reference = reference_curve(name).and_then(|reference| by_name.get(reference));
            (
                name.to_string(),
                CurveData {
                    beta_0: curve.beta_0,
                    beta_1: curve.beta_1,
                    beta_2: curve.beta_2,
                    tau: curve.tau,
                    beta_0_r: reference.and_then(|r| r.beta_0),
                    beta_1_r: reference.and_then(|r| r.beta_1),
                    beta_2_r: reference.and_then(|r| r.beta_2),
                    tau_r: reference.and_then(|r| r.tau),
                    days: curve.days.clone(),
                },
            )
        })
        .collect()
}

fn group_folios(folios: Vec<CurveFolioRow>) -> BTreeMap<String, Vec<CurveFolio>> {
    let mut grouped: BTreeMap<String, Vec<CurveFolio>> = BTreeMap::new();
    for row in folios {
        if row.yield_rate == Some(Decimal::ONE_HUNDRED) {
            continue;
        }
        grouped
            .entry(row.cc_curve.clone())
            .or_default()
            .push(CurveFolio::from(row));
    }
    grouped
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntradayCurveDocuments {
    pub curves: Vec<CurveDocument>,
    pub folios: Vec<CurveFoliosDocument>,
}

/// Builds the intraday documents. `stored_curves` are the curve keys already
/// present in the curves table; any of them missing today gets a placeholder.
pub fn build_intraday(
    curves: &[CurveRow],
    folios: Vec<CurveFolioRow>,
    stored_curves: &[String],
) -> IntradayCurveDocuments {
    let paired = pair_with_references(curves);
    let grouped = group_folios(folios);

    let mut curve_documents: Vec<CurveDocument> = paired
        .into_iter()
        .map(|(cc_curve, data)| CurveDocument {
            cc_curve,
            data: Some(data),
        })
        .collect();
    let mut folio_documents: Vec<CurveFoliosDocument> = grouped
        .into_iter()
        .map(|(cc_curve, data)| CurveFoliosDocument { cc_curve, data })
        .collect();

    let stored: BTreeSet<&str> = stored_curves.iter().map(String::as_str).collect();
    for curve in stored {
        if !curve_documents.iter().any(|doc| doc.cc_curve == curve) {
            curve_documents.push(CurveDocument {
                cc_curve: curve.to_string(),
                data: None,
            });
        }
        if !folio_documents.iter().any(|doc| doc.cc_curve == curve) {
            folio_documents.push(CurveFoliosDocument {
                cc_curve: curve.to_string(),
                data: Vec::new(),
            });
        }
    }

    IntradayCurveDocuments {
        curves: curve_documents,
        folios: folio_documents,
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EodCurveDocuments {
    pub curves: Vec<EodCurveDocument>,
    pub folios: Vec<EodCurveFoliosDocument>,
}

impl EodCurveDocuments {
    pub fn extend(&mut self, other: EodCurveDocuments) {
        self.curves.extend(other.curves);
        self.folios.extend(other.folios);
    }
}

/// Builds the end-of-day documents of one valuation date. Curves are dropped
/// when fewer than [`MIN_CURVES_PER_DAY`] were published; folios are kept.
pub fn build_end_of_day(
    valuation_date: NaiveDate,
    curves: &[CurveRow],
    folios: Vec<CurveFolioRow>,
) -> EodCurveDocuments {
    let date = valuation_date.format("%Y-%m-%d").to_string();
    let curves = if curves.len() < MIN_CURVES_PER_DAY {
        Vec::new()
    } else {
        pair_with_references(curves)
            .into_iter()
            .map(|(cc_curve, data)| EodCurveDocument {
                valuation_date: date.clone(),
                cc_curve,
                data,
            })
            .collect()
    };
    let folios = group_folios(folios)
        .into_iter()
        .map(|(cc_curve, data)| EodCurveFoliosDocument {
            valuation_date: date.clone(),
            cc_curve,
            data,
        })
        .collect();
    EodCurveDocuments { curves, folios }
}

/// Every date of the inclusive range, empty when `end < start`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}
