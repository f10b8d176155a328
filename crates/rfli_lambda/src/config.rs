//! Environment and Parameter Store configuration.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::adapters::parameters::{json_parameter, ParameterSource};
use crate::errors::ConfigError;
use crate::handlers::etl::JobKind;
use crate::runtime::schedule::{default_eod_reset, MarketSchedule, MilitaryTime};

pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_RESPONSE_ITEMS: usize = 1000;
pub const DEFAULT_EOD_JOBS: [JobKind; 3] = [
    JobKind::PortfolioTrackEod,
    JobKind::IsinSearchEod,
    JobKind::TopDeltaCategoryEod,
];

/// Names of the Parameter Store entries, not their values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterNames {
    pub market_open: Option<String>,
    pub market_close: Option<String>,
    pub pre_eod: Option<String>,
    pub final_eod: Option<String>,
    pub intra_rate: Option<String>,
    pub market_rate: Option<String>,
    pub eod_reset: Option<String>,
    pub isin_search: Option<String>,
    pub top_category: Option<String>,
    pub slider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub db_secret_id: Option<String>,
    pub query_timeout: Duration,
    pub parameters: ParameterNames,
    pub excluded_category_classes: String,
    pub max_response_items: usize,
    pub empty_all_isines: bool,
    pub error_mail_from: Option<String>,
    pub error_mail_to: Vec<String>,
    pub etl_function_name: Option<String>,
    pub trigger_eod_jobs: Vec<JobKind>,
}

/// Values polling clients need to compute their wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTiming {
    pub market_rate_secs: i64,
    pub eod_reset: MilitaryTime,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|error: T::Err| ConfigError::Invalid {
        name: name.to_string(),
        message: error.to_string(),
    })
}

pub fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    value.as_deref().ok_or(ConfigError::Missing(name))
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| non_empty(lookup(name));

        let query_timeout = match read("QUERY_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("QUERY_TIMEOUT_SECS", &raw)?),
            None => Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        };
        let max_response_items = match read("MAX_RESPONSE_ITEMS") {
            Some(raw) => parse_number("MAX_RESPONSE_ITEMS", &raw)?,
            None => DEFAULT_MAX_RESPONSE_ITEMS,
        };
        let trigger_eod_jobs = match read("TRIGGER_EOD_JOBS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|job| !job.is_empty())
                .map(|job| {
                    job.parse::<JobKind>().map_err(|message| ConfigError::Invalid {
                        name: "TRIGGER_EOD_JOBS".to_string(),
                        message,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => DEFAULT_EOD_JOBS.to_vec(),
        };
        let error_mail_to = read("ERROR_MAIL_TO")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|address| !address.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            db_secret_id: read("DB_SECRET_ID"),
            query_timeout,
            parameters: ParameterNames {
                market_open: read("MARKET_OPEN_TIME"),
                market_close: read("MARKET_CLOSE_TIME"),
                pre_eod: read("PRE_EOD_TIME"),
                final_eod: read("FINAL_EOD_TIME"),
                intra_rate: read("INTRA_RATE_TIME"),
                market_rate: read("MARKET_RATE"),
                eod_reset: read("EOD_RESET_TIME"),
                isin_search: read("ISIN_SEARCH_PARAMS"),
                top_category: read("TOP_CATEGORY_PARAMS"),
                slider: read("SLIDER_PARAMS"),
            },
            excluded_category_classes: read("EXCLUDED_CATEGORY_CLASSES").unwrap_or_default(),
            max_response_items,
            empty_all_isines: read("EMPTY_ALL_ISINES")
                .map_or(false, |flag| flag.eq_ignore_ascii_case("YES")),
            error_mail_from: read("ERROR_MAIL_FROM"),
            error_mail_to,
            etl_function_name: read("ETL_FUNCTION_NAME"),
            trigger_eod_jobs,
        })
    }

    pub async fn load_schedule(
        &self,
        source: &dyn ParameterSource,
    ) -> Result<MarketSchedule, ConfigError> {
        let names = &self.parameters;
        let schedule = MarketSchedule {
            open: military_time(source, &names.market_open, "MARKET_OPEN_TIME").await?,
            close: military_time(source, &names.market_close, "MARKET_CLOSE_TIME").await?,
            pre_eod: military_time(source, &names.pre_eod, "PRE_EOD_TIME").await?,
            final_eod: military_time(source, &names.final_eod, "FINAL_EOD_TIME").await?,
            intra_rate_secs: seconds(source, &names.intra_rate, "INTRA_RATE_TIME").await?,
            market_rate_secs: seconds(source, &names.market_rate, "MARKET_RATE").await?,
        };
        Ok(schedule.validate()?)
    }

    /// Market rate plus the EOD reset time, which defaults to 20:00.
    pub async fn load_client_timing(
        &self,
        source: &dyn ParameterSource,
    ) -> Result<ClientTiming, ConfigError> {
        let eod_reset = match &self.parameters.eod_reset {
            Some(name) => MilitaryTime::parse(&source.parameter(name).await?)?,
            None => default_eod_reset(),
        };
        Ok(ClientTiming {
            market_rate_secs: seconds(source, &self.parameters.market_rate, "MARKET_RATE").await?,
            eod_reset,
        })
    }

    pub async fn load_json<T: DeserializeOwned>(
        &self,
        source: &dyn ParameterSource,
        name: &Option<String>,
        variable: &'static str,
    ) -> Result<T, ConfigError> {
        json_parameter(source, require(name, variable)?).await
    }
}

async fn military_time(
    source: &dyn ParameterSource,
    name: &Option<String>,
    variable: &'static str,
) -> Result<MilitaryTime, ConfigError> {
    let raw = source.parameter(require(name, variable)?).await?;
    Ok(MilitaryTime::parse(&raw)?)
}

async fn seconds(
    source: &dyn ParameterSource,
    name: &Option<String>,
    variable: &'static str,
) -> Result<i64, ConfigError> {
    let name = require(name, variable)?;
    let raw = source.parameter(name).await?;
    parse_number(name, &raw)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::testing::StaticParameters;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        move |name| values.get(name).cloned()
    }

    fn schedule_names() -> RuntimeConfig {
        RuntimeConfig::from_lookup(lookup(&[
            ("MARKET_OPEN_TIME", "/rfli/open"),
            ("MARKET_CLOSE_TIME", "/rfli/close"),
            ("PRE_EOD_TIME", "/rfli/pre-eod"),
            ("FINAL_EOD_TIME", "/rfli/final-eod"),
            ("INTRA_RATE_TIME", "/rfli/intra-rate"),
            ("MARKET_RATE", "/rfli/market-rate"),
        ]))
        .expect("config")
    }

    #[test]
    fn defaults_apply_when_variables_are_absent() {
        let config =
            RuntimeConfig::from_lookup(lookup(&[("EMPTY_ALL_ISINES", "yes")])).expect("config");
        assert_eq!(config.query_timeout, Duration::from_secs(300));
        assert_eq!(config.max_response_items, 1000);
        assert!(config.empty_all_isines);
        assert_eq!(config.trigger_eod_jobs, DEFAULT_EOD_JOBS.to_vec());
        assert_eq!(config.db_secret_id, None);
        assert_eq!(
            require(&config.db_secret_id, "DB_SECRET_ID")
                .expect_err("missing")
                .to_string(),
            "DB_SECRET_ID must be configured"
        );
    }

    #[test]
    fn list_variables_are_split_and_validated() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("ERROR_MAIL_TO", "ops@precia.co, ,risk@precia.co"),
            ("TRIGGER_EOD_JOBS", "isin-search-eod, top-delta-category-eod"),
        ]))
        .expect("config");
        assert_eq!(config.error_mail_to, vec!["ops@precia.co", "risk@precia.co"]);
        assert_eq!(
            config.trigger_eod_jobs,
            vec![JobKind::IsinSearchEod, JobKind::TopDeltaCategoryEod]
        );

        let error = RuntimeConfig::from_lookup(lookup(&[("TRIGGER_EOD_JOBS", "publish-files")]))
            .expect_err("unknown job");
        assert!(error.to_string().starts_with("TRIGGER_EOD_JOBS is not valid"));

        let error = RuntimeConfig::from_lookup(lookup(&[("QUERY_TIMEOUT_SECS", "soon")]))
            .expect_err("not a number");
        assert!(error.to_string().starts_with("QUERY_TIMEOUT_SECS is not valid"));
    }

    #[tokio::test]
    async fn schedule_is_read_from_parameters() {
        let parameters = StaticParameters::new(&[
            ("/rfli/open", "800"),
            ("/rfli/close", "1300"),
            ("/rfli/pre-eod", "1430"),
            ("/rfli/final-eod", "1800"),
            ("/rfli/intra-rate", "600"),
            ("/rfli/market-rate", "120"),
        ]);
        let schedule = schedule_names().load_schedule(&parameters).await.expect("schedule");
        assert_eq!(schedule.open.as_hhmm(), 800);
        assert_eq!(schedule.final_eod.as_hhmm(), 1800);
        assert_eq!(schedule.intra_rate_secs, 600);

        let timing = schedule_names().load_client_timing(&parameters).await.expect("timing");
        assert_eq!(timing.market_rate_secs, 120);
        assert_eq!(timing.eod_reset, default_eod_reset());
    }

    #[tokio::test]
    async fn invalid_schedule_values_are_reported() {
        let parameters = StaticParameters::new(&[
            ("/rfli/open", "800"),
            ("/rfli/close", "1300"),
            ("/rfli/pre-eod", "2475"),
            ("/rfli/final-eod", "1800"),
            ("/rfli/intra-rate", "600"),
            ("/rfli/market-rate", "120"),
        ]);
        let error = schedule_names()
            .load_schedule(&parameters)
            .await
            .expect_err("bad pre eod");
        assert!(matches!(error, ConfigError::Schedule(_)));

        let error = RuntimeConfig::from_lookup(lookup(&[]))
            .expect("config")
            .load_schedule(&parameters)
            .await
            .expect_err("names missing");
        assert_eq!(error.to_string(), "MARKET_OPEN_TIME must be configured");
    }
}
