use async_trait::async_trait;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};

/// Plain-text alert delivery for failed jobs.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), String>;
}

pub struct SesNotifier {
    client: aws_sdk_sesv2::Client,
    from: String,
    to: Vec<String>,
}

impl SesNotifier {
    pub fn new(client: aws_sdk_sesv2::Client, from: impl Into<String>, to: Vec<String>) -> Self {
        Self {
            client,
            from: from.into(),
            to,
        }
    }
}

fn text(data: &str) -> Result<Content, String> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|error| format!("invalid email content: {error}"))
}

#[async_trait]
impl Notifier for SesNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), String> {
        let message = Message::builder()
            .subject(text(subject)?)
            .body(Body::builder().text(text(body)?).build())
            .build();
        let destination = Destination::builder()
            .set_to_addresses(Some(self.to.clone()))
            .build();

        self.client
            .send_email()
            .from_email_address(&self.from)
            .destination(destination)
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                format!(
                    "failed to send email: {}",
                    aws_sdk_sesv2::error::DisplayErrorContext(&error)
                )
            })
    }
}

/// Used when no recipients are configured.
pub struct LogOnlyNotifier;

#[async_trait]
impl Notifier for LogOnlyNotifier {
    async fn notify(&self, subject: &str, _body: &str) -> Result<(), String> {
        tracing::warn!(subject, "error mail recipients not configured");
        Ok(())
    }
}
