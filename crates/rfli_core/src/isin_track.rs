//! isin-track: today's prices merged with category metadata, per-category
//! folios and the per-user tracked ISIN documents.

use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ratings::RatingCatalogue;

/// Today's price of one ISIN with yesterday's yield and mean price.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub isin_code: String,
    pub instrument: String,
    #[serde(rename = "yield")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "yield"))]
    pub yield_rate: Option<Decimal>,
    pub equivalent_margin: Option<Decimal>,
    pub margin: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub mean_price: Option<Decimal>,
    pub clean_price: Option<Decimal>,
    pub issue_date: Option<String>,
    pub maturity_date: Option<String>,
    pub category_id: Option<i64>,
    pub yesterday_yield: Option<Decimal>,
    pub yesterday_mean_price: Option<Decimal>,
    pub pbs_change: Option<Decimal>,
}

/// Today's category assignment of one ISIN. Margin labels are mapped in SQL.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub isin_code: String,
    pub margin_origin: String,
    pub margin_type: String,
    pub instrument_issuer: Option<String>,
    pub issuer_name: Option<String>,
    pub cc_curve: Option<String>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolioRow {
    pub amount: Option<Decimal>,
    pub maturity_date: Option<String>,
    pub instrument: Option<String>,
    pub folio: Option<String>,
    pub maturity_days: Option<i64>,
    #[serde(rename = "yield")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "yield"))]
    pub yield_rate: Option<Decimal>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsinSnapshot {
    pub instrument: String,
    #[serde(rename = "yield")]
    pub yield_rate: Option<Decimal>,
    pub yesterday_yield: Option<Decimal>,
    pub pbs_change: Option<Decimal>,
    pub instrument_issuer: Option<String>,
    pub issuer_name: Option<String>,
    pub margin_origin: String,
    pub margin_type: String,
    pub category_id: Option<i64>,
    pub equivalent_margin: Option<Decimal>,
    pub margin: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub cc_curve: Option<String>,
    pub mean_price: Option<Decimal>,
    pub clean_price: Option<Decimal>,
    pub yesterday_mean_price: Option<Decimal>,
    pub issue_date: Option<String>,
    pub maturity_date: Option<String>,
    pub rating: String,
}

/// `{isin, data}` stored in all-isines and nested in user documents.
/// `data` is null for ISINs categorized today but not yet priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsinDocument {
    pub isin: String,
    pub data: Option<IsinSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoliosDocument {
    pub isin: String,
    pub folios: Vec<FolioRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserParams {
    pub user_id: String,
    pub isines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIsinesDocument {
    pub user_id: String,
    pub isines: Vec<IsinDocument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedIsines {
    /// Priced and categorized ISINs, in price-row order.
    pub snapshots: Vec<(String, IsinSnapshot)>,
    /// Categorized today, not priced today. Sorted.
    pub end_of_day: Vec<String>,
}

pub fn merge_isines(
    prices: Vec<PriceRow>,
    categories: &[CategoryRow],
    ratings: &RatingCatalogue,
) -> MergedIsines {
    let by_isin: HashMap<&str, &CategoryRow> = categories
        .iter()
        .map(|row| (row.isin_code.as_str(), row))
        .collect();
    let priced: HashSet<&str> = prices.iter().map(|row| row.isin_code.as_str()).collect();
    let mut end_of_day: Vec<String> = by_isin
        .keys()
        .filter(|isin| !priced.contains(*isin))
        .map(|isin| isin.to_string())
        .collect();
    end_of_day.sort();

    let snapshots = prices
        .iter()
        .filter_map(|price| {
            let category = by_isin.get(price.isin_code.as_str())?;
            Some((
                price.isin_code.clone(),
                IsinSnapshot {
                    instrument: price.instrument.clone(),
                    yield_rate: price.yield_rate,
                    yesterday_yield: price.yesterday_yield,
                    pbs_change: price.pbs_change,
                    instrument_issuer: category.instrument_issuer.clone(),
                    issuer_name: category.issuer_name.clone(),
                    margin_origin: category.margin_origin.clone(),
                    margin_type: category.margin_type.clone(),
                    category_id: price.category_id,
                    equivalent_margin: price.equivalent_margin,
                    margin: price.margin,
                    spread: price.spread,
                    cc_curve: category.cc_curve.clone(),
                    mean_price: price.mean_price,
                    clean_price: price.clean_price,
                    yesterday_mean_price: price.yesterday_mean_price,
                    issue_date: price.issue_date.clone(),
                    maturity_date: price.maturity_date.clone(),
                    rating: ratings.resolve(price.category_id),
                },
            ))
        })
        .collect();

    MergedIsines {
        snapshots,
        end_of_day,
    }
}

/// Groups folios by category, dropping the `yield == 100` sentinel rows.
pub fn group_folios_by_category(folios: Vec<FolioRow>) -> HashMap<i64, Vec<FolioRow>> {
    let sentinel = Decimal::ONE_HUNDRED;
    let mut grouped: HashMap<i64, Vec<FolioRow>> = HashMap::new();
    for folio in folios {
        let Some(category_id) = folio.category_id else {
            continue;
        };
        if folio.yield_rate == Some(sentinel) {
            continue;
        }
        grouped.entry(category_id).or_default().push(folio);
    }
    grouped
}

/// Folio counts per margin type, for the job log.
pub type MarginTypeCounts = BTreeMap<String, usize>;

#[derive(Debug, Clone, PartialEq)]
pub struct IsinTrackDocuments {
    pub all_isines: Vec<IsinDocument>,
    pub folios: Vec<FoliosDocument>,
    pub user_isines: Vec<UserIsinesDocument>,
    pub folio_counts: MarginTypeCounts,
}

pub fn build_documents(
    merged: &MergedIsines,
    folios_by_category: &HashMap<i64, Vec<FolioRow>>,
    user_params: &[UserParams],
) -> IsinTrackDocuments {
    let mut all_isines = Vec::with_capacity(merged.snapshots.len() + merged.end_of_day.len());
    let mut folios = Vec::new();
    let mut folio_counts = MarginTypeCounts::new();

    for (isin, snapshot) in &merged.snapshots {
        all_isines.push(IsinDocument {
            isin: isin.clone(),
            data: Some(snapshot.clone()),
        });
        let category_folios = snapshot
            .category_id
            .and_then(|id| folios_by_category.get(&id))
            .filter(|rows| !rows.is_empty());
        if let Some(rows) = category_folios {
            *folio_counts.entry(snapshot.margin_type.clone()).or_default() += 1;
            folios.push(FoliosDocument {
                isin: isin.clone(),
                folios: rows.clone(),
            });
        }
    }
    for isin in &merged.end_of_day {
        all_isines.push(IsinDocument {
            isin: isin.clone(),
            data: None,
        });
    }

    let user_isines = user_params
        .iter()
        .map(|params| UserIsinesDocument {
            user_id: params.user_id.clone(),
            isines: user_documents(&params.isines, merged),
        })
        .collect();

    IsinTrackDocuments {
        all_isines,
        folios,
        user_isines,
        folio_counts,
    }
}

fn user_documents(requested: &[String], merged: &MergedIsines) -> Vec<IsinDocument> {
    requested
        .iter()
        .filter_map(|isin| {
            if let Some((_, snapshot)) = merged.snapshots.iter().find(|(known, _)| known == isin) {
                return Some(IsinDocument {
                    isin: isin.clone(),
                    data: Some(snapshot.clone()),
                });
            }
            merged
                .end_of_day
                .binary_search(isin)
                .ok()
                .map(|_| IsinDocument {
                    isin: isin.clone(),
                    data: None,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::ratings::CategoryRatingRow;

    fn price(isin: &str, category_id: i64) -> PriceRow {
        PriceRow {
            isin_code: isin.to_string(),
            instrument: format!("INST-{isin}"),
            yield_rate: Some(dec!(10.25)),
            equivalent_margin: None,
            margin: Some(dec!(1.1234)),
            spread: None,
            mean_price: Some(dec!(99.5)),
            clean_price: Some(dec!(98.7)),
            issue_date: Some("2020-01-01".to_string()),
            maturity_date: Some("2030-01-01".to_string()),
            category_id: Some(category_id),
            yesterday_yield: Some(dec!(10.20)),
            yesterday_mean_price: Some(dec!(99.4)),
            pbs_change: Some(dec!(5.00)),
        }
    }

    fn category(isin: &str, margin_type: &str) -> CategoryRow {
        CategoryRow {
            isin_code: isin.to_string(),
            margin_origin: "Categoria".to_string(),
            margin_type: margin_type.to_string(),
            instrument_issuer: Some("ISS".to_string()),
            issuer_name: Some("Issuer SA".to_string()),
            cc_curve: Some("CEC".to_string()),
        }
    }

    fn folio(category_id: i64, yield_rate: Decimal) -> FolioRow {
        FolioRow {
            amount: Some(dec!(1000)),
            maturity_date: Some("2030-01-01".to_string()),
            instrument: Some("TFIT".to_string()),
            folio: Some("F1".to_string()),
            maturity_days: Some(365),
            yield_rate: Some(yield_rate),
            category_id: Some(category_id),
        }
    }

    fn ratings() -> RatingCatalogue {
        RatingCatalogue::from_rows(&[CategoryRatingRow {
            category_id: 7,
            rating_group: Some("70".to_string()),
        }])
    }

    #[test]
    fn merge_keeps_priced_categorized_isines_and_flags_end_of_day() {
        let merged = merge_isines(
            vec![price("A", 7), price("B", 8), price("UNCATEGORIZED", 7)],
            &[
                category("A", "Calculado"),
                category("B", "Historico"),
                category("EOD", "Calculado"),
            ],
            &ratings(),
        );
        let isines: Vec<&str> = merged.snapshots.iter().map(|(isin, _)| isin.as_str()).collect();
        assert_eq!(isines, vec!["A", "B"]);
        assert_eq!(merged.snapshots[0].1.rating, "AAA");
        assert_eq!(merged.snapshots[1].1.rating, "NA");
        assert_eq!(merged.end_of_day, vec!["EOD".to_string()]);
    }

    #[test]
    fn folios_skip_sentinel_yield() {
        let grouped = group_folios_by_category(vec![
            folio(7, dec!(9.5)),
            folio(7, dec!(100)),
            folio(8, dec!(100)),
        ]);
        assert_eq!(grouped.get(&7).map(Vec::len), Some(1));
        assert!(!grouped.contains_key(&8));
    }

    #[test]
    fn documents_null_out_end_of_day_isines_for_users() {
        let merged = merge_isines(
            vec![price("A", 7), price("B", 8)],
            &[
                category("A", "Calculado"),
                category("B", "Historico"),
                category("EOD", "Actualizado"),
            ],
            &ratings(),
        );
        let folios = group_folios_by_category(vec![folio(7, dec!(9.5))]);
        let params = vec![UserParams {
            user_id: "ana".to_string(),
            isines: vec!["EOD".to_string(), "GONE".to_string(), "A".to_string()],
        }];

        let documents = build_documents(&merged, &folios, &params);

        assert_eq!(documents.all_isines.len(), 3);
        assert_eq!(documents.all_isines[2].data, None);
        assert_eq!(documents.folios.len(), 1);
        assert_eq!(documents.folios[0].isin, "A");
        assert_eq!(documents.folio_counts.get("Calculado"), Some(&1));

        let user = &documents.user_isines[0];
        assert_eq!(user.user_id, "ana");
        let isines: Vec<(&str, bool)> = user
            .isines
            .iter()
            .map(|doc| (doc.isin.as_str(), doc.data.is_some()))
            .collect();
        assert_eq!(isines, vec![("EOD", false), ("A", true)]);
    }

    #[test]
    fn snapshot_serializes_yield_and_decimals_as_numbers() {
        let merged = merge_isines(vec![price("A", 7)], &[category("A", "Calculado")], &ratings());
        let body = serde_json::to_value(IsinDocument {
            isin: "A".to_string(),
            data: Some(merged.snapshots[0].1.clone()),
        })
        .expect("serializes");
        assert_eq!(body["data"]["yield"], serde_json::json!(10.25));
        assert_eq!(body["data"]["cc_curve"], "CEC");
        assert!(body["data"].get("isin_code").is_none());
    }
}
