use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::FromRow;

use crate::db::{DbPool, StoreError, StoreResult, new_record_id};

/// Per-tenant WhatsApp Business credentials. At most one row per tenant.
#[derive(Clone, Debug, FromRow)]
pub struct WhatsappSettings {
    pub id: String,
    pub tenant_id: String,
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub webhook_verify_token: Option<String>,
    pub auto_responses: bool,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsappSettingsChanges {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub webhook_verify_token: Option<String>,
    pub auto_responses: Option<bool>,
    pub is_active: Option<bool>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl WhatsappSettings {
    #[must_use]
    pub fn empty(tenant_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            tenant_id: tenant_id.to_string(),
            access_token: None,
            phone_number_id: None,
            webhook_verify_token: None,
            auto_responses: true,
            is_active: false,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: WhatsappSettingsChanges, now: DateTime<Utc>) {
        if let Some(access_token) = changes.access_token {
            self.access_token = Some(access_token);
        }
        // stored trimmed, and blank clears it, so the unique index compares real ids
        if let Some(phone_number_id) = changes.phone_number_id {
            let phone_number_id = phone_number_id.trim();
            self.phone_number_id = (!phone_number_id.is_empty()).then(|| phone_number_id.to_string());
        }
        if let Some(verify_token) = changes.webhook_verify_token {
            self.webhook_verify_token = Some(verify_token);
        }
        if let Some(auto_responses) = changes.auto_responses {
            self.auto_responses = auto_responses;
        }
        if let Some(is_active) = changes.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        non_empty(self.access_token.as_ref())
    }

    #[must_use]
    pub fn phone_number_id(&self) -> Option<&str> {
        non_empty(self.phone_number_id.as_ref())
    }

    #[must_use]
    pub fn webhook_verify_token(&self) -> Option<&str> {
        non_empty(self.webhook_verify_token.as_ref())
    }
}

const SETTINGS_COLUMNS: &str =
    "id, tenant_id, access_token, phone_number_id, webhook_verify_token, auto_responses, is_active, updated_at";

async fn select_settings_where(db: &DbPool, condition: &str, value: &str) -> StoreResult<Option<WhatsappSettings>> {
    let sql = format!("SELECT {SETTINGS_COLUMNS} FROM whatsapp_settings WHERE {condition} = ? ORDER BY updated_at LIMIT 1");
    let settings = sqlx::query_as::<_, WhatsappSettings>(&sql)
        .bind(value)
        .fetch_optional(db)
        .await?;
    Ok(settings)
}

pub async fn select_settings_by_tenant(db: &DbPool, tenant_id: &str) -> StoreResult<Option<WhatsappSettings>> {
    select_settings_where(db, "tenant_id", tenant_id).await
}

pub async fn select_settings_by_phone_number_id(
    db: &DbPool,
    phone_number_id: &str,
) -> StoreResult<Option<WhatsappSettings>> {
    select_settings_where(db, "phone_number_id", phone_number_id).await
}

pub async fn select_settings_by_verify_token(db: &DbPool, verify_token: &str) -> StoreResult<Option<WhatsappSettings>> {
    select_settings_where(db, "webhook_verify_token", verify_token).await
}

/// Insert-or-update keyed on the tenant.
pub async fn upsert_settings_row(db: &DbPool, settings: &WhatsappSettings) -> StoreResult<()> {
    sqlx::query(
        r"
        INSERT INTO whatsapp_settings (id, tenant_id, access_token, phone_number_id, webhook_verify_token, auto_responses, is_active, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id) DO UPDATE SET
            access_token = excluded.access_token,
            phone_number_id = excluded.phone_number_id,
            webhook_verify_token = excluded.webhook_verify_token,
            auto_responses = excluded.auto_responses,
            is_active = excluded.is_active,
            updated_at = excluded.updated_at
        ",
    )
    .bind(&settings.id)
    .bind(&settings.tenant_id)
    .bind(&settings.access_token)
    .bind(&settings.phone_number_id)
    .bind(&settings.webhook_verify_token)
    .bind(settings.auto_responses)
    .bind(settings.is_active)
    .bind(settings.updated_at)
    .execute(db)
    .await
    .map_err(|e| StoreError::from(e).entity("WhatsApp phone number id"))?;
    Ok(())
}
