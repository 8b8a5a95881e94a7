//! Repository contract shared by every storage backend.
//!
//! All business-entity methods take the tenant id as their first argument and
//! must never read or write a row that belongs to another tenant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{
    Agent, AgentChanges, Contact, ContactChanges, Conversation, ConversationChanges, Message, NewAgent, NewContact,
    NewConversation, NewMessage, NewSession, NewUser, Session, User, WhatsappSettings, WhatsappSettingsChanges,
};

#[rustfmt::skip]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    OperationFailed(#[source] sqlx::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::NotFound("Record"),
            sqlx::Error::Database(ref e) if e.is_unique_violation() => Self::Conflict("Record"),
            _ => Self::OperationFailed(error),
        }
    }
}

impl StoreError {
    /// Names the entity a generic not-found or conflict error refers to.
    #[must_use]
    pub fn entity(self, name: &'static str) -> Self {
        match self {
            Self::NotFound(_) => Self::NotFound(name),
            Self::Conflict(_) => Self::Conflict(name),
            other @ Self::OperationFailed(_) => other,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    // users
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User>;
    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_reset_token(&self, token_hash: &str) -> StoreResult<Option<User>>;
    /// Replaces any outstanding reset token of the user.
    async fn set_reset_token(&self, user_id: &str, token_hash: &str, expires_at: DateTime<Utc>) -> StoreResult<()>;
    /// Stores a new password hash and clears the reset token.
    async fn update_password(&self, user_id: &str, password_hash: &str) -> StoreResult<()>;

    // sessions
    async fn create_session(&self, new_session: NewSession) -> StoreResult<Session>;
    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<Session>>;
    async fn delete_session(&self, token_hash: &str) -> StoreResult<u64>;
    async fn delete_user_sessions(&self, user_id: &str) -> StoreResult<u64>;
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    // contacts
    async fn list_contacts(&self, tenant_id: &str) -> StoreResult<Vec<Contact>>;
    async fn get_contact(&self, tenant_id: &str, id: &str) -> StoreResult<Contact>;
    async fn find_contact_by_phone(&self, tenant_id: &str, phone: &str) -> StoreResult<Option<Contact>>;
    async fn create_contact(&self, tenant_id: &str, new_contact: NewContact) -> StoreResult<Contact>;
    /// Creates the contact only if the tenant has no contact with the same phone,
    /// failing with [`StoreError::Conflict`] otherwise.
    async fn create_contact_for_phone(&self, tenant_id: &str, new_contact: NewContact) -> StoreResult<Contact>;
    async fn update_contact(&self, tenant_id: &str, id: &str, changes: ContactChanges) -> StoreResult<Contact>;
    async fn delete_contact(&self, tenant_id: &str, id: &str) -> StoreResult<()>;

    // agents
    async fn list_agents(&self, tenant_id: &str) -> StoreResult<Vec<Agent>>;
    async fn get_agent(&self, tenant_id: &str, id: &str) -> StoreResult<Agent>;
    /// First active SDR agent of the tenant, in creation order.
    async fn find_default_agent(&self, tenant_id: &str) -> StoreResult<Option<Agent>>;
    async fn create_agent(&self, tenant_id: &str, new_agent: NewAgent) -> StoreResult<Agent>;
    async fn update_agent(&self, tenant_id: &str, id: &str, changes: AgentChanges) -> StoreResult<Agent>;
    async fn delete_agent(&self, tenant_id: &str, id: &str) -> StoreResult<()>;

    // conversations
    async fn list_conversations(&self, tenant_id: &str) -> StoreResult<Vec<Conversation>>;
    async fn get_conversation(&self, tenant_id: &str, id: &str) -> StoreResult<Conversation>;
    /// First conversation of the contact, in creation order.
    async fn find_conversation_by_contact(&self, tenant_id: &str, contact_id: &str) -> StoreResult<Option<Conversation>>;
    async fn create_conversation(&self, tenant_id: &str, new_conversation: NewConversation) -> StoreResult<Conversation>;
    /// Creates the conversation only if the contact has none yet,
    /// failing with [`StoreError::Conflict`] otherwise.
    async fn create_conversation_for_contact(&self, tenant_id: &str, new_conversation: NewConversation) -> StoreResult<Conversation>;
    async fn update_conversation(&self, tenant_id: &str, id: &str, changes: ConversationChanges) -> StoreResult<Conversation>;
    async fn delete_conversation(&self, tenant_id: &str, id: &str) -> StoreResult<()>;

    // messages
    async fn list_messages(&self, tenant_id: &str, conversation_id: &str) -> StoreResult<Vec<Message>>;
    /// Inserts the message and moves the conversation's `last_message_at` to the
    /// message timestamp in one atomic step.
    async fn append_message(&self, tenant_id: &str, new_message: NewMessage) -> StoreResult<Message>;

    // whatsapp settings
    async fn get_whatsapp_settings(&self, tenant_id: &str) -> StoreResult<Option<WhatsappSettings>>;
    async fn upsert_whatsapp_settings(&self, tenant_id: &str, changes: WhatsappSettingsChanges) -> StoreResult<WhatsappSettings>;
    async fn find_whatsapp_settings_by_phone_number_id(&self, phone_number_id: &str) -> StoreResult<Option<WhatsappSettings>>;
    async fn find_whatsapp_settings_by_verify_token(&self, verify_token: &str) -> StoreResult<Option<WhatsappSettings>>;
}

/// Fresh primary key for any record.
#[must_use]
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
