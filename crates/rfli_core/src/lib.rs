//! Shared RFLI domain primitives.
//!
//! This crate owns the data-version ledger rules, the market schedule, the
//! rating catalogue and the reshaping of relational rows into key-value
//! documents for every component. It intentionally excludes AWS SDK and
//! Lambda runtime concerns; the optional `sqlx` feature only derives row
//! decoding for the source row types.

pub mod contract;
pub mod curve_compare;
pub mod isin_search;
pub mod isin_track;
pub mod portfolio_track;
pub mod ratings;
pub mod schedule;
pub mod slider;
pub mod table_names;
pub mod top_delta;
pub mod versioning;
