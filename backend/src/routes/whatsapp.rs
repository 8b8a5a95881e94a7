use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::core::{ApiError, ApiJson, ArcContext};
use crate::db::{PublicUser, WhatsappSettings, WhatsappSettingsChanges};
use crate::services::webhook;

/// Settings as returned to the owner; the access token itself never leaves the server.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub id: String,
    pub phone_number_id: Option<String>,
    pub webhook_verify_token: Option<String>,
    pub auto_responses: bool,
    pub is_active: bool,
    pub has_access_token: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<WhatsappSettings> for SettingsView {
    fn from(settings: WhatsappSettings) -> Self {
        Self {
            has_access_token: settings.access_token().is_some(),
            id: settings.id,
            phone_number_id: settings.phone_number_id,
            webhook_verify_token: settings.webhook_verify_token,
            auto_responses: settings.auto_responses,
            is_active: settings.is_active,
            updated_at: settings.updated_at,
        }
    }
}

pub async fn get_settings(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = context
        .store
        .get_whatsapp_settings(&user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("WhatsApp settings not configured".to_string()))?;
    Ok(Json(SettingsView::from(settings)))
}

pub async fn put_settings(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    ApiJson(changes): ApiJson<WhatsappSettingsChanges>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = context.store.upsert_whatsapp_settings(&user.id, changes).await?;
    tracing::info!(tenant_id = %user.id, is_active = settings.is_active, "WhatsApp settings saved");
    Ok(Json(SettingsView::from(settings)))
}

/// Provider subscription handshake.
pub async fn verify_webhook(
    State(context): State<ArcContext>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").map(String::as_str);

    let settings = match token {
        Some(token) if !token.is_empty() => context.store.find_whatsapp_settings_by_verify_token(token).await?,
        _ => None,
    };
    let expected = settings.as_ref().and_then(WhatsappSettings::webhook_verify_token);

    match expected.and_then(|expected| webhook::verify(mode, token, challenge, expected)) {
        Some(challenge) => {
            tracing::info!(tenant_id = ?settings.map(|s| s.tenant_id), "Webhook verified");
            Ok((StatusCode::OK, challenge).into_response())
        }
        None => {
            tracing::warn!(mode = ?mode, "Webhook verification rejected");
            Ok((StatusCode::FORBIDDEN, "Forbidden").into_response())
        }
    }
}

/// Inbound deliveries. Always answers 200 so the provider does not retry.
pub async fn receive_webhook(State(context): State<ArcContext>, body: Bytes) -> impl IntoResponse {
    let payload = serde_json::from_slice::<Value>(&body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Webhook body is not JSON");
        Value::Null
    });
    let report = context.ingestor.process_webhook(&payload).await;
    Json(json!({"result": "ok", "report": report}))
}
