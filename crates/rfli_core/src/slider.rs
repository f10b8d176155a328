//! slider: the ticker of the most traded TES plus one reference per
//! corporate banking category.

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// TES instruments shown in the slider.
pub const TOP_TES: usize = 6;
pub const SLIDER_KEY: i64 = 1;

/// `SLIDER_PARAMS` parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliderParams {
    /// Category id to display name, in slider order.
    #[serde(rename = "CORPORATIVE_BANKING_CATEGORIES", default)]
    pub categories: IndexMap<String, String>,
}

impl SliderParams {
    /// Configured category ids; non-numeric keys are skipped.
    pub fn category_ids(&self) -> Vec<i64> {
        self.categories
            .keys()
            .filter_map(|id| id.trim().parse::<i64>().ok())
            .collect()
    }

    fn name_for(&self, category_id: i64) -> Option<&str> {
        self.categories
            .iter()
            .find(|(id, _)| id.trim().parse::<i64>().ok() == Some(category_id))
            .map(|(_, name)| name.as_str())
    }
}

/// TES rows carry `category_id = 0`.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliderRow {
    pub instrument: Option<String>,
    pub isin_code: Option<String>,
    #[serde(rename = "yield")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "yield"))]
    pub yield_rate: Option<Decimal>,
    pub pbs_change: Option<Decimal>,
    pub category_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliderEntry {
    pub name: String,
    #[serde(rename = "yield")]
    pub yield_rate: Decimal,
    pub pbs_change: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliderDocument {
    pub slider_key: i64,
    pub data: Vec<SliderEntry>,
}

pub fn build_document(rows: Vec<SliderRow>, params: &SliderParams) -> SliderDocument {
    let data = rows
        .into_iter()
        .map(|row| SliderEntry {
            name: params
                .name_for(row.category_id)
                .map(str::to_string)
                .or(row.instrument)
                .unwrap_or_default(),
            yield_rate: row.yield_rate.unwrap_or_default(),
            pbs_change: row.pbs_change.unwrap_or_default(),
        })
        .collect();
    SliderDocument {
        slider_key: SLIDER_KEY,
        data,
    }
}
