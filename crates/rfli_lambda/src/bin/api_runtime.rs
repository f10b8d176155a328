use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use rfli_lambda::adapters::key_value::DynamoDbStore;
use rfli_lambda::adapters::parameters::SsmParameters;
use rfli_lambda::config::RuntimeConfig;
use rfli_lambda::handlers::api::{handle_api_event, ApiContext, ApiGatewayResponse};
use rfli_lambda::telemetry::init_tracing;

struct ApiRuntime {
    store: DynamoDbStore,
    parameters: SsmParameters,
    config: RuntimeConfig,
}

async fn handle_request(
    runtime: &ApiRuntime,
    event: LambdaEvent<Value>,
) -> Result<ApiGatewayResponse, Error> {
    let ctx = ApiContext {
        store: &runtime.store,
        parameters: &runtime.parameters,
        config: &runtime.config,
        now: Utc::now(),
    };
    Ok(handle_api_event(&ctx, event.payload).await)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let runtime = ApiRuntime {
        store: DynamoDbStore::new(aws_sdk_dynamodb::Client::new(&aws_config)),
        parameters: SsmParameters::new(aws_sdk_ssm::Client::new(&aws_config)),
        config: RuntimeConfig::from_env()?,
    };
    let runtime = &runtime;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_request(runtime, event).await
    }))
    .await
}
