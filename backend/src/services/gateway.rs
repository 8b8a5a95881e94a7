//! Outbound messaging provider.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

use crate::cfg;
use crate::db::WhatsappSettings;

#[rustfmt::skip]
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Provider request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Provider rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Provider call timed out after {0:?}")]
    TimedOut(Duration),
}

/// Credentials of one tenant, built from its current settings for every call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayCredentials {
    pub access_token: String,
    pub phone_number_id: String,
}

impl GatewayCredentials {
    /// `None` unless both the access token and the phone number id are configured.
    #[must_use]
    pub fn from_settings(settings: &WhatsappSettings) -> Option<Self> {
        Some(Self {
            access_token: settings.access_token()?.to_string(),
            phone_number_id: settings.phone_number_id()?.to_string(),
        })
    }
}

#[async_trait]
pub trait OutboundGateway: Send + Sync {
    async fn send_text(&self, credentials: &GatewayCredentials, to: &str, text: &str) -> Result<(), GatewayError>;
    async fn mark_read(&self, credentials: &GatewayCredentials, external_message_id: &str) -> Result<(), GatewayError>;
}

/// E.164 form the Graph API expects.
fn international(to: &str) -> String {
    if to.starts_with('+') { to.to_string() } else { format!("+{to}") }
}

/// WhatsApp Cloud API client.
#[derive(Clone, Debug)]
pub struct GraphApiGateway {
    client: reqwest::Client,
    base_url: String,
}

impl GraphApiGateway {
    pub fn new(settings: &cfg::GatewaySettings) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.graph_api_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_message(&self, credentials: &GatewayCredentials, body: &Value) -> Result<(), GatewayError> {
        let url = format!("{}/{}/messages", self.base_url, credentials.phone_number_id);
        let response = self
            .client
            .post(url)
            .bearer_auth(&credentials.access_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl OutboundGateway for GraphApiGateway {
    async fn send_text(&self, credentials: &GatewayCredentials, to: &str, text: &str) -> Result<(), GatewayError> {
        let body = json!({
            "messaging_product": "whatsapp",
            "to": international(to),
            "type": "text",
            "text": { "body": text }
        });
        self.post_message(credentials, &body).await
    }

    async fn mark_read(&self, credentials: &GatewayCredentials, external_message_id: &str) -> Result<(), GatewayError> {
        let body = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": external_message_id
        });
        self.post_message(credentials, &body).await
    }
}
