use std::{collections::HashMap, time::Duration};

use anyhow::{Error, Result, anyhow};
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::{
    clients::circuit_breaker::CircuitBreaker,
    config::Config,
    models::{
        retry::RetryConfig,
        template::{Template, TemplateContent},
    },
    utils::retry_with_backoff,
};

pub struct TemplateServiceClient {
    http_client: Client,
    base_url: String,
    retry_config: RetryConfig,
    circuit_breaker: Option<CircuitBreaker>,
}

impl TemplateServiceClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        info!(base_url = %config.template_service_url, "Template service client initialized");

        Ok(Self {
            http_client,
            base_url: config.template_service_url.trim_end_matches('/').to_string(),
            retry_config: config.retry_config(),
            circuit_breaker: None,
        })
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    pub async fn fetch_template(
        &self,
        template_code: &str,
        language: Option<&str>,
    ) -> Result<Template, Error> {
        let language = language.unwrap_or("en");
        let url = format!(
            "{}/api/v1/templates/{}?lang={}",
            self.base_url, template_code, language
        );

        debug!(template_code, language, "Fetching template from service");

        match &self.circuit_breaker {
            Some(circuit_breaker) => {
                circuit_breaker
                    .call(|| self.fetch_with_retry(&url))
                    .await
            }
            None => self.fetch_with_retry(&url).await,
        }
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Template, Error> {
        retry_with_backoff(&self.retry_config, || {
            let client = self.http_client.clone();
            let url = url.to_string();

            async move {
                let response = client.get(&url).send().await.map_err(|e| e.to_string())?;
                let status = response.status();

                if !status.is_success() {
                    return Err(format!("Template service returned status {}", status));
                }

                response
                    .json::<Template>()
                    .await
                    .map_err(|e| format!("Failed to parse template JSON: {}", e))
            }
        })
        .await
        .map_err(|e| anyhow!("Failed to fetch template from {}: {}", url, e))
    }
}

pub fn render_template(
    template: &Template,
    variables: &HashMap<String, JsonValue>,
) -> Result<TemplateContent, Error> {
    debug!(
        template_code = %template.code,
        variable_count = variables.len(),
        "Rendering template"
    );

    Ok(TemplateContent {
        subject: replace_variables(&template.content.subject, variables)?,
        body: replace_variables(&template.content.body, variables)?,
    })
}

/// Resolves each `{{key}}` token of the template in one pass. Substituted
/// values are never rescanned, so payload text containing braces is kept as is.
fn replace_variables(
    template: &str,
    variables: &HashMap<String, JsonValue>,
) -> Result<String, Error> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };

        result.push_str(&rest[..open]);

        let token = &rest[open..open + 2 + close + 2];
        let key = token[2..token.len() - 2].trim();

        let Some(value) = variables.get(key) else {
            warn!(missing_variable = %token, "Template contains unreplaced variable");
            return Err(anyhow!("Missing variable in template: {}", token));
        };

        match value {
            JsonValue::String(s) => result.push_str(s),
            JsonValue::Number(n) => result.push_str(&n.to_string()),
            JsonValue::Bool(b) => result.push_str(&b.to_string()),
            JsonValue::Null => {}
            JsonValue::Array(_) | JsonValue::Object(_) => result.push_str(&value.to_string()),
        }

        rest = &rest[open + 2 + close + 2..];
    }

    result.push_str(rest);

    Ok(result)
}
