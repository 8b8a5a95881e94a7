use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::{DbPool, StoreError, StoreResult, new_record_id};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Pending,
    Resolved,
}

#[derive(Clone, Debug, Deserialize, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    pub contact_id: String,
    pub status: ConversationStatus,
    pub assigned_agent_id: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    pub contact_id: String,
    #[serde(default)]
    pub status: ConversationStatus,
    #[serde(default)]
    pub assigned_agent_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationChanges {
    pub status: Option<ConversationStatus>,
    pub assigned_agent_id: Option<String>,
}

impl Conversation {
    #[must_use]
    pub fn create(tenant_id: &str, new_conversation: NewConversation, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            tenant_id: tenant_id.to_string(),
            contact_id: new_conversation.contact_id,
            status: new_conversation.status,
            assigned_agent_id: new_conversation.assigned_agent_id,
            last_message_at: now,
            created_at: now,
        }
    }

    pub fn apply(&mut self, changes: ConversationChanges) {
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(agent_id) = changes.assigned_agent_id {
            self.assigned_agent_id = Some(agent_id);
        }
    }
}

const CONVERSATION_COLUMNS: &str = "id, tenant_id, contact_id, status, assigned_agent_id, last_message_at, created_at";

pub async fn insert_conversation(db: &DbPool, conversation: &Conversation) -> StoreResult<()> {
    sqlx::query(
        r"
        INSERT INTO conversations (id, tenant_id, contact_id, status, assigned_agent_id, last_message_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&conversation.id)
    .bind(&conversation.tenant_id)
    .bind(&conversation.contact_id)
    .bind(conversation.status)
    .bind(&conversation.assigned_agent_id)
    .bind(conversation.last_message_at)
    .bind(conversation.created_at)
    .execute(db)
    .await
    .map_err(|e| StoreError::from(e).entity("Conversation"))?;
    Ok(())
}

/// Inserts the conversation unless the contact already has one.
pub async fn insert_conversation_unless_contact_has_one(db: &DbPool, conversation: &Conversation) -> StoreResult<()> {
    let result = sqlx::query(
        r"
        INSERT INTO conversations (id, tenant_id, contact_id, status, assigned_agent_id, last_message_at, created_at)
        SELECT ?, ?, ?, ?, ?, ?, ?
        WHERE NOT EXISTS (SELECT 1 FROM conversations WHERE tenant_id = ? AND contact_id = ?)
        ",
    )
    .bind(&conversation.id)
    .bind(&conversation.tenant_id)
    .bind(&conversation.contact_id)
    .bind(conversation.status)
    .bind(&conversation.assigned_agent_id)
    .bind(conversation.last_message_at)
    .bind(conversation.created_at)
    .bind(&conversation.tenant_id)
    .bind(&conversation.contact_id)
    .execute(db)
    .await
    .map_err(|e| StoreError::from(e).entity("Conversation"))?;
    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict("Conversation"));
    }
    Ok(())
}

pub async fn select_conversations(db: &DbPool, tenant_id: &str) -> StoreResult<Vec<Conversation>> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE tenant_id = ? ORDER BY last_message_at DESC, rowid DESC"
    );
    let conversations = sqlx::query_as::<_, Conversation>(&sql)
        .bind(tenant_id)
        .fetch_all(db)
        .await?;
    Ok(conversations)
}

pub async fn select_conversation(db: &DbPool, tenant_id: &str, id: &str) -> StoreResult<Conversation> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE tenant_id = ? AND id = ?");
    sqlx::query_as::<_, Conversation>(&sql)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::NotFound("Conversation"))
}

pub async fn select_conversation_by_contact(
    db: &DbPool,
    tenant_id: &str,
    contact_id: &str,
) -> StoreResult<Option<Conversation>> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations
         WHERE tenant_id = ? AND contact_id = ?
         ORDER BY created_at, rowid LIMIT 1"
    );
    let conversation = sqlx::query_as::<_, Conversation>(&sql)
        .bind(tenant_id)
        .bind(contact_id)
        .fetch_optional(db)
        .await?;
    Ok(conversation)
}

pub async fn update_conversation_row(db: &DbPool, conversation: &Conversation) -> StoreResult<()> {
    let result = sqlx::query(
        r"
        UPDATE conversations
        SET status = ?, assigned_agent_id = ?
        WHERE tenant_id = ? AND id = ?
        ",
    )
    .bind(conversation.status)
    .bind(&conversation.assigned_agent_id)
    .bind(&conversation.tenant_id)
    .bind(&conversation.id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("Conversation"));
    }
    Ok(())
}

pub async fn delete_conversation_row(db: &DbPool, tenant_id: &str, id: &str) -> StoreResult<()> {
    let result = sqlx::query("DELETE FROM conversations WHERE tenant_id = ? AND id = ?")
        .bind(tenant_id)
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("Conversation"));
    }
    Ok(())
}
