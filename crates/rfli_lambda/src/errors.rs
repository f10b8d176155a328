use thiserror::Error;

use crate::runtime::contract::ValidationError;
use crate::runtime::schedule::ScheduleError;
use crate::runtime::top_delta::TopDeltaError;

/// MySQL `ER_QUERY_TIMEOUT`, raised when `MAX_EXECUTION_TIME` is exceeded.
pub const MYSQL_QUERY_TIMEOUT: u16 = 3024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{operation} on {table} failed: {message}")]
    Request {
        table: &'static str,
        operation: &'static str,
        message: String,
    },
    #[error("item in {table} could not be decoded: {message}")]
    Decode { table: &'static str, message: String },
    #[error("item for {table} could not be encoded: {message}")]
    Encode { table: &'static str, message: String },
    #[error("{count} items of {table} were still unprocessed after retries")]
    Unprocessed { table: &'static str, count: usize },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("query {query} exceeded the execution time limit")]
    QueryTimeout { query: &'static str },
    #[error("query {query} failed: {source}")]
    Query {
        query: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("could not connect to the source database: {0}")]
    Connect(#[source] sqlx::Error),
}

impl SourceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::QueryTimeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("{name} is not valid: {message}")]
    Invalid { name: String, message: String },
    #[error("parameter {name} could not be read: {message}")]
    Parameter { name: String, message: String },
    #[error("secret {id} could not be read: {message}")]
    Secret { id: String, message: String },
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Job-level failure; every variant ends the invocation as failed.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    TopDelta(#[from] TopDeltaError),
    #[error("invalid job request: {0}")]
    InvalidRequest(String),
}

impl EtlError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Source(source) if source.is_timeout())
    }
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("unrecognized trigger event: {0}")]
    UnknownEvent(String),
    #[error("end-of-day message is not valid: {0}")]
    InvalidMessage(String),
    #[error("{failed} of {total} job invocations failed: {first}")]
    Invoke {
        failed: usize,
        total: usize,
        first: String,
    },
}

/// Request-level failure of a read endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(error: ConfigError) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::BadRequest(error.message().to_string())
    }
}
