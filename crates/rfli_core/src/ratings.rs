//! Rating-group catalogue shared by isin-track, portfolio-track and
//! isin-search.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_RATING: &str = "NA";

const RATING_GROUPS: [(i64, &str); 15] = [
    (10, "Sin calificación"),
    (20, "E"),
    (30, "BB+,BB,BB-"),
    (31, "B+,B,B-"),
    (32, "CCC,CC,C"),
    (33, "D"),
    (40, "BBB+,BBB,BBB-"),
    (50, "A+,A,A-"),
    (58, "AA-"),
    (59, "AA"),
    (60, "AA+"),
    (70, "AAA"),
    (80, "Fogafin"),
    (90, "Nación"),
    (100, "Multilaterales"),
];

pub fn rating_name(group: i64) -> Option<&'static str> {
    RATING_GROUPS
        .iter()
        .find(|(known, _)| *known == group)
        .map(|(_, name)| *name)
}

/// Category to rating-group assignment as read from the category table.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRatingRow {
    pub category_id: i64,
    pub rating_group: Option<String>,
}

/// Resolves a category id to its rating name, `NA` when unassigned.
#[derive(Debug, Clone, Default)]
pub struct RatingCatalogue {
    groups: HashMap<i64, i64>,
}

impl RatingCatalogue {
    pub fn from_rows(rows: &[CategoryRatingRow]) -> Self {
        let groups = rows
            .iter()
            .filter_map(|row| {
                let group = row.rating_group.as_deref()?.trim().parse::<f64>().ok()?;
                Some((row.category_id, group as i64))
            })
            .collect();
        Self { groups }
    }

    pub fn group_of(&self, category_id: i64) -> Option<i64> {
        self.groups.get(&category_id).copied()
    }

    pub fn resolve(&self, category_id: Option<i64>) -> String {
        category_id
            .and_then(|id| self.group_of(id))
            .and_then(rating_name)
            .unwrap_or(UNKNOWN_RATING)
            .to_string()
    }
}
