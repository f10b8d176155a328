use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_USER: &str = "default";

/// Components tracked by the data-version ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    CompareCurves,
    IsinTrack,
    PortfolioTrack,
    IsinSearch,
    TopDeltaCategory,
    Slider,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::CompareCurves,
        Component::IsinTrack,
        Component::PortfolioTrack,
        Component::IsinSearch,
        Component::TopDeltaCategory,
        Component::Slider,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CompareCurves => "compare-curves",
            Self::IsinTrack => "isin-track",
            Self::PortfolioTrack => "portfolio-track",
            Self::IsinSearch => "isin-search",
            Self::TopDeltaCategory => "top-delta-category",
            Self::Slider => "slider",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Day phase announced to polling clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStatus {
    Intraday,
    PreEod,
    FinalEod,
}

impl NextStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intraday => "intraday",
            Self::PreEod => "pre_eod",
            Self::FinalEod => "final_eod",
        }
    }
}

impl fmt::Display for NextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NextStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "intraday" => Ok(Self::Intraday),
            "pre_eod" => Ok(Self::PreEod),
            "final_eod" => Ok(Self::FinalEod),
            other => Err(ValidationError::new(format!(
                "unknown next_status '{other}'"
            ))),
        }
    }
}

/// One row of the data-version ledger. `next_update` is epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub component: Component,
    pub version: i64,
    pub next_update: i64,
    pub next_status: NextStatus,
}

/// Body returned by every read endpoint.
///
/// `next_update` carries the client wait in seconds, not the ledger epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: Option<i64>,
    pub next_update: Option<i64>,
    pub next_status: Option<NextStatus>,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn versioned(record: &VersionRecord, wait_seconds: Option<i64>, data: Option<T>) -> Self {
        Self {
            version: Some(record.version),
            next_update: wait_seconds,
            next_status: Some(record.next_status),
            data,
            message: None,
        }
    }

    /// Envelope for historical reads that are not tied to the ledger.
    pub fn unversioned(data: T) -> Self {
        Self {
            version: None,
            next_update: None,
            next_status: None,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Result of checking requested ISINs against a document table.
#[derive(Debug, Clone, PartialEq)]
pub struct IsinSelection<T> {
    pub found: Vec<T>,
    pub missing: Vec<String>,
}

impl<T> IsinSelection<T> {
    pub fn correction_message(&self) -> Option<String> {
        if self.missing.is_empty() {
            None
        } else {
            Some(format!(
                "Please correct the following isines: {}",
                self.missing.join(", ")
            ))
        }
    }
}

/// Deduplicates requested ISINs keeping the first occurrence order.
pub fn unique_isines(requested: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut unique: Vec<String> = Vec::with_capacity(requested.len());
    for isin in requested {
        let trimmed = isin.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::new("isines cannot contain empty values"));
        }
        if !unique.iter().any(|known| known == trimmed) {
            unique.push(trimmed.to_string());
        }
    }
    if unique.is_empty() {
        return Err(ValidationError::new("isines cannot be empty"));
    }
    Ok(unique)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
