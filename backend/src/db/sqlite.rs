use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::cfg;
use crate::db::*;

pub type DbPool = sqlx::SqlitePool;

pub async fn create_db_pool(settings: &cfg::DatabaseSettings) -> Result<DbPool, StoreError> {
    let options = SqliteConnectOptions::from_str(&settings.url)
        .map_err(StoreError::OperationFailed)?
        .create_if_missing(true)
        .foreign_keys(true)
        // Increase SQLite busy timeout to handle concurrent connections better
        .busy_timeout(std::time::Duration::from_secs(30));
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(options)
        .await
        .map_err(StoreError::OperationFailed)?;
    tracing::info!("Database initialized successfully");
    Ok(pool)
}

/// Persistent store backed by a SQLite pool.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    #[must_use]
    pub const fn new(db: DbPool) -> Self {
        Self { db }
    }

    #[must_use]
    pub const fn pool(&self) -> &DbPool {
        &self.db
    }

    async fn ensure_agent_in_tenant(&self, tenant_id: &str, agent_id: Option<&String>) -> StoreResult<()> {
        if let Some(agent_id) = agent_id {
            select_agent(&self.db, tenant_id, agent_id).await?;
        }
        Ok(())
    }

    async fn count_assignment(&self, conversation: &Conversation) -> StoreResult<()> {
        if let Some(agent_id) = &conversation.assigned_agent_id {
            increment_conversation_count(&self.db, &conversation.tenant_id, agent_id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let user = User::create(new_user, Utc::now());
        insert_user(&self.db, &user).await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        select_user_by_id(&self.db, id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        select_user_by_email(&self.db, email).await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        select_user_by_username(&self.db, username).await
    }

    async fn find_user_by_reset_token(&self, token_hash: &str) -> StoreResult<Option<User>> {
        select_user_by_reset_token(&self.db, token_hash).await
    }

    async fn set_reset_token(&self, user_id: &str, token_hash: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        update_reset_token(&self.db, user_id, token_hash, expires_at).await
    }

    async fn update_password(&self, user_id: &str, password_hash: &str) -> StoreResult<()> {
        update_password_hash(&self.db, user_id, password_hash).await
    }

    async fn create_session(&self, new_session: NewSession) -> StoreResult<Session> {
        let session = Session::create(new_session, Utc::now());
        insert_session(&self.db, &session).await?;
        Ok(session)
    }

    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        select_session_by_token(&self.db, token_hash).await
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<u64> {
        delete_session_by_token(&self.db, token_hash).await
    }

    async fn delete_user_sessions(&self, user_id: &str) -> StoreResult<u64> {
        delete_sessions_by_user(&self.db, user_id).await
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        delete_sessions_expired_before(&self.db, now).await
    }

    async fn list_contacts(&self, tenant_id: &str) -> StoreResult<Vec<Contact>> {
        select_contacts(&self.db, tenant_id).await
    }

    async fn get_contact(&self, tenant_id: &str, id: &str) -> StoreResult<Contact> {
        select_contact(&self.db, tenant_id, id).await
    }

    async fn find_contact_by_phone(&self, tenant_id: &str, phone: &str) -> StoreResult<Option<Contact>> {
        select_contact_by_phone(&self.db, tenant_id, phone).await
    }

    async fn create_contact(&self, tenant_id: &str, new_contact: NewContact) -> StoreResult<Contact> {
        let contact = Contact::create(tenant_id, new_contact, Utc::now());
        insert_contact(&self.db, &contact).await?;
        Ok(contact)
    }

    async fn create_contact_for_phone(&self, tenant_id: &str, new_contact: NewContact) -> StoreResult<Contact> {
        let contact = Contact::create(tenant_id, new_contact, Utc::now());
        insert_contact_unless_phone_exists(&self.db, &contact).await?;
        Ok(contact)
    }

    async fn update_contact(&self, tenant_id: &str, id: &str, changes: ContactChanges) -> StoreResult<Contact> {
        let mut contact = select_contact(&self.db, tenant_id, id).await?;
        contact.apply(changes, Utc::now());
        update_contact_row(&self.db, &contact).await?;
        Ok(contact)
    }

    async fn delete_contact(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        delete_contact_row(&self.db, tenant_id, id).await
    }

    async fn list_agents(&self, tenant_id: &str) -> StoreResult<Vec<Agent>> {
        select_agents(&self.db, tenant_id).await
    }

    async fn get_agent(&self, tenant_id: &str, id: &str) -> StoreResult<Agent> {
        select_agent(&self.db, tenant_id, id).await
    }

    async fn find_default_agent(&self, tenant_id: &str) -> StoreResult<Option<Agent>> {
        select_default_agent(&self.db, tenant_id).await
    }

    async fn create_agent(&self, tenant_id: &str, new_agent: NewAgent) -> StoreResult<Agent> {
        let agent = Agent::create(tenant_id, new_agent, Utc::now());
        insert_agent(&self.db, &agent).await?;
        Ok(agent)
    }

    async fn update_agent(&self, tenant_id: &str, id: &str, changes: AgentChanges) -> StoreResult<Agent> {
        let mut agent = select_agent(&self.db, tenant_id, id).await?;
        agent.apply(changes);
        update_agent_row(&self.db, &agent).await?;
        Ok(agent)
    }

    async fn delete_agent(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        delete_agent_row(&self.db, tenant_id, id).await
    }

    async fn list_conversations(&self, tenant_id: &str) -> StoreResult<Vec<Conversation>> {
        select_conversations(&self.db, tenant_id).await
    }

    async fn get_conversation(&self, tenant_id: &str, id: &str) -> StoreResult<Conversation> {
        select_conversation(&self.db, tenant_id, id).await
    }

    async fn find_conversation_by_contact(&self, tenant_id: &str, contact_id: &str) -> StoreResult<Option<Conversation>> {
        select_conversation_by_contact(&self.db, tenant_id, contact_id).await
    }

    async fn create_conversation(&self, tenant_id: &str, new_conversation: NewConversation) -> StoreResult<Conversation> {
        select_contact(&self.db, tenant_id, &new_conversation.contact_id).await?;
        self.ensure_agent_in_tenant(tenant_id, new_conversation.assigned_agent_id.as_ref()).await?;
        let conversation = Conversation::create(tenant_id, new_conversation, Utc::now());
        insert_conversation(&self.db, &conversation).await?;
        self.count_assignment(&conversation).await?;
        Ok(conversation)
    }

    async fn create_conversation_for_contact(
        &self,
        tenant_id: &str,
        new_conversation: NewConversation,
    ) -> StoreResult<Conversation> {
        select_contact(&self.db, tenant_id, &new_conversation.contact_id).await?;
        self.ensure_agent_in_tenant(tenant_id, new_conversation.assigned_agent_id.as_ref()).await?;
        let conversation = Conversation::create(tenant_id, new_conversation, Utc::now());
        insert_conversation_unless_contact_has_one(&self.db, &conversation).await?;
        self.count_assignment(&conversation).await?;
        Ok(conversation)
    }

    async fn update_conversation(
        &self,
        tenant_id: &str,
        id: &str,
        changes: ConversationChanges,
    ) -> StoreResult<Conversation> {
        self.ensure_agent_in_tenant(tenant_id, changes.assigned_agent_id.as_ref()).await?;
        let mut conversation = select_conversation(&self.db, tenant_id, id).await?;
        conversation.apply(changes);
        update_conversation_row(&self.db, &conversation).await?;
        Ok(conversation)
    }

    async fn delete_conversation(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        delete_conversation_row(&self.db, tenant_id, id).await
    }

    async fn list_messages(&self, tenant_id: &str, conversation_id: &str) -> StoreResult<Vec<Message>> {
        select_messages(&self.db, tenant_id, conversation_id).await
    }

    async fn append_message(&self, tenant_id: &str, new_message: NewMessage) -> StoreResult<Message> {
        let message = Message::create(tenant_id, new_message, Utc::now());
        insert_message_and_touch_conversation(&self.db, &message).await?;
        Ok(message)
    }

    async fn get_whatsapp_settings(&self, tenant_id: &str) -> StoreResult<Option<WhatsappSettings>> {
        select_settings_by_tenant(&self.db, tenant_id).await
    }

    async fn upsert_whatsapp_settings(
        &self,
        tenant_id: &str,
        changes: WhatsappSettingsChanges,
    ) -> StoreResult<WhatsappSettings> {
        let now = Utc::now();
        let mut settings = select_settings_by_tenant(&self.db, tenant_id)
            .await?
            .unwrap_or_else(|| WhatsappSettings::empty(tenant_id, now));
        settings.apply(changes, now);
        upsert_settings_row(&self.db, &settings).await?;
        // the row id is kept by ON CONFLICT, so read back what is actually stored
        select_settings_by_tenant(&self.db, tenant_id)
            .await?
            .ok_or(StoreError::NotFound("WhatsApp settings"))
    }

    async fn find_whatsapp_settings_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> StoreResult<Option<WhatsappSettings>> {
        select_settings_by_phone_number_id(&self.db, phone_number_id).await
    }

    async fn find_whatsapp_settings_by_verify_token(&self, verify_token: &str) -> StoreResult<Option<WhatsappSettings>> {
        select_settings_by_verify_token(&self.db, verify_token).await
    }
}
