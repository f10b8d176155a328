//! AWS-oriented adapters and handlers for the RFLI ETL jobs and read APIs.
//!
//! This crate owns runtime integration details (Lambda handlers, DynamoDB and
//! MySQL adapters, SSM configuration, job dispatch) and re-exports the pure
//! domain crate through a single `runtime` module boundary.

pub mod adapters;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod runtime;
pub mod sql;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;
