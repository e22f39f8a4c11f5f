//! Templated transactional mail through the Mailjet send API.

use reqwest::Client;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::config::mailjet::MailjetConfig;
use crate::config::ConfigError;
use crate::logging::Redacted;

#[derive(Debug, Error)]
pub enum MailjetError {
    #[error("server.mailjet.templateid-missing")]
    TemplateIdMissing,
    #[error("Mailjet request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Mailjet responded with {status}: {body}")]
    Api { status: u16, body: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One templated message.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub to: String,
    pub bcc: Option<String>,
    /// Template variables. Null members are dropped before sending.
    pub data: Value,
    pub template_id: Option<u64>,
    /// Log the message but skip the API call.
    pub mock: bool,
}

#[derive(Debug, Clone)]
pub struct MailjetClient {
    http: Client,
    config: MailjetConfig,
}

impl MailjetClient {
    pub fn connect(config: MailjetConfig) -> Result<Self, MailjetError> {
        info!(version = %config.version, api_url = %config.api_url, "connecting to mailjet");
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self, MailjetError> {
        Self::connect(MailjetConfig::from_env()?)
    }

    pub fn config(&self) -> &MailjetConfig {
        &self.config
    }

    /// Sends the message and returns Mailjet's response body, or `"MOCKED"` in mock mode.
    pub async fn send(&self, request: &SendRequest) -> Result<Value, MailjetError> {
        let message = build_message(request).inspect_err(|e| {
            error!(error = %e, "mailjet send rejected");
        })?;

        info!(
            to = %Redacted(&request.to),
            bcc = ?request.bcc.as_deref().map(Redacted),
            template_id = ?request.template_id,
            mock = request.mock,
            "sending mail"
        );

        let body = if request.mock {
            Value::String("MOCKED".to_string())
        } else {
            self.post_messages(json!({ "Messages": [message] }))
                .await
                .inspect_err(|e| error!(error = %e, "mailjet send failed"))?
        };

        info!(response = %body, "mail sent");
        Ok(body)
    }

    async fn post_messages(&self, payload: Value) -> Result<Value, MailjetError> {
        let response = self
            .http
            .post(self.config.send_url())
            .basic_auth(&self.config.api_key_public, Some(&self.config.api_key_private))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailjetError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

/// The `Messages[]` entry for `request`.
pub fn build_message(request: &SendRequest) -> Result<Value, MailjetError> {
    let template_id = request
        .template_id
        .filter(|id| *id != 0)
        .ok_or(MailjetError::TemplateIdMissing)?;

    let mut message = Map::new();
    message.insert("To".to_string(), json!([{ "Email": request.to }]));
    if let Some(bcc) = request.bcc.as_deref().filter(|b| !b.is_empty()) {
        message.insert("Bcc".to_string(), json!([{ "Email": bcc }]));
    }
    message.insert("TemplateID".to_string(), json!(template_id));
    message.insert("TemplateLanguage".to_string(), Value::Bool(true));
    message.insert("Variables".to_string(), remove_empty(request.data.clone()));
    Ok(Value::Object(message))
}

/// Drops null members recursively. Mailjet rejects null template variables.
pub fn remove_empty(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, remove_empty(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(remove_empty)
                .collect(),
        ),
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}
