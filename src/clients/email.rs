use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::{
    clients::{
        circuit_breaker::CircuitBreaker,
        template::{TemplateServiceClient, render_template},
    },
    config::Config,
    models::{
        email::{EmailRequest, EmailResponse},
        notification::NotificationEvent,
        retry::RetryConfig,
        validation::validate_email_address,
    },
    utils::{retry_with_backoff_when, template_variables},
};

/// Renders the template for a notification's type and sends it.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_templated(&self, recipient: &str, event: &NotificationEvent)
    -> Result<(), Error>;
}

/// Client for a Postmark-style transactional email HTTP API.
pub struct EmailClient {
    http_client: Client,
    api_url: String,
    api_token: String,
    from_address: String,
    retry_config: RetryConfig,
    circuit_breaker: Option<CircuitBreaker>,
}

impl EmailClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        info!(api_url = %config.email_api_url, "Email client initialized");

        Ok(Self {
            http_client,
            api_url: config.email_api_url.trim_end_matches('/').to_string(),
            api_token: config.email_api_token.clone(),
            from_address: config.email_from_address.clone(),
            retry_config: config.retry_config(),
            circuit_breaker: None,
        })
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
        tag: &str,
    ) -> Result<String, Error> {
        validate_email_address(recipient)?;

        debug!(recipient, tag, "Sending email");

        let request = EmailRequest {
            from: self.from_address.clone(),
            to: recipient.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            tag: tag.to_string(),
            message_stream: "outbound".to_string(),
        };

        // Permanent rejections come back as `Ok(Err(..))` so the breaker only
        // counts provider outages.
        let sent = match &self.circuit_breaker {
            Some(circuit_breaker) => circuit_breaker.call(|| self.send_with_retry(&request)).await,
            None => self.send_with_retry(&request).await,
        };

        sent?
    }

    async fn send_with_retry(&self, request: &EmailRequest) -> Result<Result<String, Error>, Error> {
        let sent = retry_with_backoff_when(
            &self.retry_config,
            || self.send_once(request),
            SendFailure::is_transient,
        )
        .await;

        match sent {
            Ok(message_id) => Ok(Ok(message_id)),
            Err(SendFailure::Rejected(reason)) => {
                warn!(recipient = %request.to, reason = %reason, "Email rejected by provider");
                Ok(Err(anyhow!("Email rejected by provider: {}", reason)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn send_once(&self, request: &EmailRequest) -> Result<String, SendFailure> {
        let response = self
            .http_client
            .post(format!("{}/email", self.api_url))
            .header("X-Postmark-Server-Token", &self.api_token)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| SendFailure::Unavailable(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let reason = format!("{}: {}", status, error_text);

            return Err(
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    SendFailure::Unavailable(reason)
                } else {
                    SendFailure::Rejected(reason)
                },
            );
        }

        let body: EmailResponse = response
            .json()
            .await
            .map_err(|e| SendFailure::Unavailable(format!("unreadable response: {}", e)))?;

        if body.error_code != 0 {
            return Err(SendFailure::Rejected(format!(
                "error {}: {}",
                body.error_code, body.message
            )));
        }

        let message_id = body.message_id.unwrap_or_default();
        info!(recipient = %request.to, message_id = %message_id, "Email sent successfully");

        Ok(message_id)
    }
}

#[derive(Debug, thiserror::Error)]
enum SendFailure {
    /// Network errors, 5xx and 429: worth retrying.
    #[error("Email provider unavailable: {0}")]
    Unavailable(String),

    #[error("Email rejected by provider: {0}")]
    Rejected(String),
}

impl SendFailure {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Fetches the template named after the notification type, fills it from the
/// payload and hands it to the email client.
pub struct TemplatedEmailSender {
    templates: TemplateServiceClient,
    email_client: EmailClient,
}

impl TemplatedEmailSender {
    pub fn new(templates: TemplateServiceClient, email_client: EmailClient) -> Self {
        Self {
            templates,
            email_client,
        }
    }
}

#[async_trait]
impl EmailSender for TemplatedEmailSender {
    async fn send_templated(
        &self,
        recipient: &str,
        event: &NotificationEvent,
    ) -> Result<(), Error> {
        let notification_type = event.notification_type();

        let template = self
            .templates
            .fetch_template(notification_type.as_str(), None)
            .await?;

        let rendered = render_template(&template, &template_variables(event)?)?;

        self.email_client
            .send_email(
                recipient,
                &rendered.subject,
                &rendered.body,
                notification_type.as_str(),
            )
            .await?;

        Ok(())
    }
}
