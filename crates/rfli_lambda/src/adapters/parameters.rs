use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::errors::ConfigError;

/// Named configuration values (SSM Parameter Store in AWS).
#[async_trait]
pub trait ParameterSource: Send + Sync {
    async fn parameter(&self, name: &str) -> Result<String, ConfigError>;
}

pub struct SsmParameters {
    client: aws_sdk_ssm::Client,
}

impl SsmParameters {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParameterSource for SsmParameters {
    async fn parameter(&self, name: &str) -> Result<String, ConfigError> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|error| ConfigError::Parameter {
                name: name.to_string(),
                message: aws_sdk_ssm::error::DisplayErrorContext(&error).to_string(),
            })?;
        output
            .parameter()
            .and_then(|parameter| parameter.value())
            .map(str::to_string)
            .ok_or_else(|| ConfigError::Parameter {
                name: name.to_string(),
                message: "parameter has no value".to_string(),
            })
    }
}

/// Parses a JSON parameter. Values stored as a JSON string holding the
/// document are unwrapped once. Decoding goes straight from text so object
/// key order reaches `T`.
pub fn decode_json_parameter<T: DeserializeOwned>(
    name: &str,
    raw: &str,
) -> Result<T, ConfigError> {
    let invalid = |error: serde_json::Error| ConfigError::Invalid {
        name: name.to_string(),
        message: error.to_string(),
    };
    if raw.trim_start().starts_with('"') {
        let inner: String = serde_json::from_str(raw).map_err(invalid)?;
        return serde_json::from_str(&inner).map_err(invalid);
    }
    serde_json::from_str(raw).map_err(invalid)
}

pub async fn json_parameter<T: DeserializeOwned>(
    source: &dyn ParameterSource,
    name: &str,
) -> Result<T, ConfigError> {
    let raw = source.parameter(name).await?;
    decode_json_parameter(name, &raw)
}
