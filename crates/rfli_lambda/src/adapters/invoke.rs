use async_trait::async_trait;
use aws_sdk_lambda::types::InvocationType;

/// Fire-and-forget dispatch of an ETL job request.
#[async_trait]
pub trait JobInvoker: Send + Sync {
    async fn invoke_job_async(&self, payload: &[u8]) -> Result<(), String>;
}

pub struct AwsLambdaJobInvoker {
    lambda_client: aws_sdk_lambda::Client,
    function_name: String,
}

impl AwsLambdaJobInvoker {
    pub fn new(lambda_client: aws_sdk_lambda::Client, function_name: impl Into<String>) -> Self {
        Self {
            lambda_client,
            function_name: function_name.into(),
        }
    }
}

#[async_trait]
impl JobInvoker for AwsLambdaJobInvoker {
    async fn invoke_job_async(&self, payload: &[u8]) -> Result<(), String> {
        self.lambda_client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::Event)
            .set_payload(Some(payload.to_vec().into()))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                format!(
                    "failed to invoke {}: {}",
                    self.function_name,
                    aws_sdk_lambda::error::DisplayErrorContext(&error)
                )
            })
    }
}
