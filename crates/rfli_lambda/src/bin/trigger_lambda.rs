use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use rfli_lambda::adapters::invoke::AwsLambdaJobInvoker;
use rfli_lambda::config::{require, RuntimeConfig};
use rfli_lambda::handlers::trigger::handle_trigger_event;
use rfli_lambda::telemetry::init_tracing;

struct TriggerRuntime {
    invoker: AwsLambdaJobInvoker,
    config: RuntimeConfig,
}

async fn handle_request(
    runtime: &TriggerRuntime,
    event: LambdaEvent<Value>,
) -> Result<Value, Error> {
    let report = handle_trigger_event(&runtime.invoker, &runtime.config, &event.payload).await?;
    Ok(serde_json::to_value(report)?)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    let config = RuntimeConfig::from_env()?;
    let function_name = require(&config.etl_function_name, "ETL_FUNCTION_NAME")?.to_string();
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let runtime = TriggerRuntime {
        invoker: AwsLambdaJobInvoker::new(aws_sdk_lambda::Client::new(&aws_config), function_name),
        config,
    };
    let runtime = &runtime;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_request(runtime, event).await
    }))
    .await
}
