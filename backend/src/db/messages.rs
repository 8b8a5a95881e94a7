use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::{DbPool, StoreError, StoreResult, new_record_id};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

/// Immutable, append-only conversation entry.
#[derive(Clone, Debug, Deserialize, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    /// Authoring agent; `None` means the contact wrote it.
    pub sender_id: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub is_incoming: bool,
    /// Provider message id for inbound deliveries.
    pub external_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub is_incoming: bool,
    pub external_id: Option<String>,
}

impl Message {
    #[must_use]
    pub fn create(tenant_id: &str, new_message: NewMessage, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            tenant_id: tenant_id.to_string(),
            conversation_id: new_message.conversation_id,
            sender_id: new_message.sender_id,
            content: new_message.content,
            message_type: new_message.message_type,
            is_incoming: new_message.is_incoming,
            external_id: new_message.external_id,
            timestamp: now,
        }
    }
}

pub async fn select_messages(db: &DbPool, tenant_id: &str, conversation_id: &str) -> StoreResult<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        r"
        SELECT id, tenant_id, conversation_id, sender_id, content, message_type, is_incoming, external_id, timestamp
        FROM messages
        WHERE tenant_id = ? AND conversation_id = ?
        ORDER BY timestamp, rowid
        ",
    )
    .bind(tenant_id)
    .bind(conversation_id)
    .fetch_all(db)
    .await?;
    Ok(messages)
}

/// Bumps the conversation and inserts the message inside one transaction.
pub async fn insert_message_and_touch_conversation(db: &DbPool, message: &Message) -> StoreResult<()> {
    let mut tx = db.begin().await?;

    let touched = sqlx::query(
        r"
        UPDATE conversations
        SET last_message_at = ?
        WHERE tenant_id = ? AND id = ?
        ",
    )
    .bind(message.timestamp)
    .bind(&message.tenant_id)
    .bind(&message.conversation_id)
    .execute(&mut *tx)
    .await?;
    if touched.rows_affected() == 0 {
        return Err(StoreError::NotFound("Conversation"));
    }

    sqlx::query(
        r"
        INSERT INTO messages (id, tenant_id, conversation_id, sender_id, content, message_type, is_incoming, external_id, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&message.id)
    .bind(&message.tenant_id)
    .bind(&message.conversation_id)
    .bind(&message.sender_id)
    .bind(&message.content)
    .bind(message.message_type)
    .bind(message.is_incoming)
    .bind(&message.external_id)
    .bind(message.timestamp)
    .execute(&mut *tx)
    .await
    .map_err(|e| StoreError::from(e).entity("Message"))?;

    tx.commit().await?;
    Ok(())
}
