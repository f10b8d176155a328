use chrono::{NaiveDate, Utc};
use clap::Parser;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use rfli_lambda::adapters::key_value::DynamoDbStore;
use rfli_lambda::adapters::market_source::MySqlMarketSource;
use rfli_lambda::adapters::notify::{LogOnlyNotifier, Notifier, SesNotifier};
use rfli_lambda::adapters::parameters::SsmParameters;
use rfli_lambda::adapters::secrets::{SecretSource, SecretsManagerSecrets};
use rfli_lambda::config::{require, RuntimeConfig};
use rfli_lambda::errors::EtlError;
use rfli_lambda::handlers::etl::{execute_job, EtlContext, JobKind, JobReport, JobRequest};
use rfli_lambda::telemetry::init_tracing;

/// Runs one RFLI ETL job locally; inside Lambda the job comes from the event.
#[derive(Parser)]
#[command(name = "rfli-etl")]
struct Cli {
    #[arg(value_enum)]
    job: JobKind,
    /// Market day to load, YYYY-MM-DD. Defaults to today in Bogota.
    #[arg(long)]
    valuation_date: Option<NaiveDate>,
    /// First day of a historical curve load.
    #[arg(long)]
    start_date: Option<NaiveDate>,
    /// Last day of a historical curve load.
    #[arg(long)]
    end_date: Option<NaiveDate>,
}

impl Cli {
    fn into_request(self) -> JobRequest {
        JobRequest {
            job: self.job,
            valuation_date: self.valuation_date,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

struct EtlRuntime {
    store: DynamoDbStore,
    source: MySqlMarketSource,
    parameters: SsmParameters,
    notifier: Box<dyn Notifier>,
    config: RuntimeConfig,
}

async fn build_runtime() -> Result<EtlRuntime, Error> {
    let config = RuntimeConfig::from_env()?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let secrets = SecretsManagerSecrets::new(aws_sdk_secretsmanager::Client::new(&aws_config));
    let credentials = secrets
        .db_credentials(require(&config.db_secret_id, "DB_SECRET_ID")?)
        .await?;
    let source = MySqlMarketSource::connect_lazy(&credentials, config.query_timeout);

    let notifier: Box<dyn Notifier> = match &config.error_mail_from {
        Some(from) if !config.error_mail_to.is_empty() => Box::new(SesNotifier::new(
            aws_sdk_sesv2::Client::new(&aws_config),
            from.clone(),
            config.error_mail_to.clone(),
        )),
        _ => Box::new(LogOnlyNotifier),
    };

    Ok(EtlRuntime {
        store: DynamoDbStore::new(aws_sdk_dynamodb::Client::new(&aws_config)),
        source,
        parameters: SsmParameters::new(aws_sdk_ssm::Client::new(&aws_config)),
        notifier,
        config,
    })
}

async fn run(runtime: &EtlRuntime, request: &JobRequest) -> Result<JobReport, EtlError> {
    let ctx = EtlContext {
        store: &runtime.store,
        source: &runtime.source,
        parameters: &runtime.parameters,
        config: &runtime.config,
        now: Utc::now(),
    };
    execute_job(&ctx, runtime.notifier.as_ref(), request).await
}

async fn handle_request(runtime: &EtlRuntime, event: LambdaEvent<Value>) -> Result<Value, Error> {
    let request: JobRequest = serde_json::from_value(event.payload)
        .map_err(|error| Error::from(format!("Malformed job request: {error}")))?;
    let report = run(runtime, &request).await?;
    Ok(serde_json::to_value(report)?)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    if std::env::var_os("AWS_LAMBDA_RUNTIME_API").is_some() {
        let runtime = build_runtime().await?;
        let runtime = &runtime;
        return lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
            handle_request(runtime, event).await
        }))
        .await;
    }

    let request = Cli::parse().into_request();
    let runtime = build_runtime().await?;
    let report = run(&runtime, &request).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
