use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::errors::ConfigError;

/// Connection settings stored in the database secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    #[serde(deserialize_with = "port_from_number_or_text")]
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

fn port_from_number_or_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn db_credentials(&self, secret_id: &str) -> Result<DbCredentials, ConfigError>;
}

pub struct SecretsManagerSecrets {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretsManagerSecrets {
    pub fn new(client: aws_sdk_secretsmanager::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretSource for SecretsManagerSecrets {
    async fn db_credentials(&self, secret_id: &str) -> Result<DbCredentials, ConfigError> {
        let failed = |message: String| ConfigError::Secret {
            id: secret_id.to_string(),
            message,
        };
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|error| {
                failed(aws_sdk_secretsmanager::error::DisplayErrorContext(&error).to_string())
            })?;
        let secret = output
            .secret_string()
            .ok_or_else(|| failed("secret has no string value".to_string()))?;
        serde_json::from_str(secret).map_err(|error| failed(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_accepts_numbers_and_text() {
        let numeric: DbCredentials = serde_json::from_str(
            r#"{"host": "db.internal", "port": 3306, "username": "etl", "password": "s3cret"}"#,
        )
        .expect("numeric port");
        let text: DbCredentials = serde_json::from_str(
            r#"{"host": "db.internal", "port": "3306", "username": "etl", "password": "s3cret",
                "engine": "mysql"}"#,
        )
        .expect("text port");
        assert_eq!(numeric, text);
        assert_eq!(numeric.port, 3306);
    }

    #[test]
    fn debug_output_hides_the_password() {
        let credentials = DbCredentials {
            host: "db.internal".to_string(),
            port: 3306,
            username: "etl".to_string(),
            password: "s3cret".to_string(),
        };
        let printed = format!("{credentials:?}");
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("db.internal"));
    }
}
