use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::db::*;

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    sessions: Vec<Session>,
    contacts: Vec<Contact>,
    agents: Vec<Agent>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    whatsapp_settings: Vec<WhatsappSettings>,
}

impl Tables {
    fn contact(&self, tenant_id: &str, id: &str) -> StoreResult<&Contact> {
        self.contacts
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.id == id)
            .ok_or(StoreError::NotFound("Contact"))
    }

    fn agent(&self, tenant_id: &str, id: &str) -> StoreResult<&Agent> {
        self.agents
            .iter()
            .find(|a| a.tenant_id == tenant_id && a.id == id)
            .ok_or(StoreError::NotFound("Agent"))
    }

    fn agent_mut(&mut self, tenant_id: &str, id: &str) -> StoreResult<&mut Agent> {
        self.agents
            .iter_mut()
            .find(|a| a.tenant_id == tenant_id && a.id == id)
            .ok_or(StoreError::NotFound("Agent"))
    }

    fn conversation(&self, tenant_id: &str, id: &str) -> StoreResult<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.id == id)
            .ok_or(StoreError::NotFound("Conversation"))
    }

    fn conversation_mut(&mut self, tenant_id: &str, id: &str) -> StoreResult<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.tenant_id == tenant_id && c.id == id)
            .ok_or(StoreError::NotFound("Conversation"))
    }

    fn ensure_agent(&self, tenant_id: &str, agent_id: Option<&String>) -> StoreResult<()> {
        if let Some(agent_id) = agent_id {
            self.agent(tenant_id, agent_id)?;
        }
        Ok(())
    }

    fn insert_conversation(&mut self, conversation: Conversation) -> StoreResult<Conversation> {
        if let Some(agent_id) = &conversation.assigned_agent_id {
            self.agent_mut(&conversation.tenant_id, agent_id)?.conversation_count += 1;
        }
        self.conversations.push(conversation.clone());
        Ok(conversation)
    }

    fn settings_where(&self, predicate: impl Fn(&WhatsappSettings) -> bool) -> Option<WhatsappSettings> {
        self.whatsapp_settings.iter().find(|s| predicate(s)).cloned()
    }
}

/// Volatile store keeping every table in process memory.
///
/// Each operation runs under a single lock acquisition, which gives the
/// create-if-absent and append operations the same atomicity as the SQL backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .iter()
            .any(|u| u.email == new_user.email || u.username == new_user.username)
        {
            return Err(StoreError::Conflict("User"));
        }
        let user = User::create(new_user, Utc::now());
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_reset_token(&self, token_hash: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.reset_token_hash.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn set_reset_token(&self, user_id: &str, token_hash: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(StoreError::NotFound("User"))?;
        user.reset_token_hash = Some(token_hash.to_string());
        user.reset_token_expires_at = Some(expires_at);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_password(&self, user_id: &str, password_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(StoreError::NotFound("User"))?;
        user.password_hash = password_hash.to_string();
        user.reset_token_hash = None;
        user.reset_token_expires_at = None;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn create_session(&self, new_session: NewSession) -> StoreResult<Session> {
        let mut tables = self.tables.write().await;
        if tables.sessions.iter().any(|s| s.token_hash == new_session.token_hash) {
            return Err(StoreError::Conflict("Session"));
        }
        let session = Session::create(new_session, Utc::now());
        tables.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.iter().find(|s| s.token_hash == token_hash).cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|s| s.token_hash != token_hash);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn delete_user_sessions(&self, user_id: &str) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|s| s.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|s| !s.is_expired(now));
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn list_contacts(&self, tenant_id: &str) -> StoreResult<Vec<Contact>> {
        let tables = self.tables.read().await;
        Ok(tables.contacts.iter().filter(|c| c.tenant_id == tenant_id).cloned().collect())
    }

    async fn get_contact(&self, tenant_id: &str, id: &str) -> StoreResult<Contact> {
        let tables = self.tables.read().await;
        tables.contact(tenant_id, id).cloned()
    }

    async fn find_contact_by_phone(&self, tenant_id: &str, phone: &str) -> StoreResult<Option<Contact>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contacts
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn create_contact(&self, tenant_id: &str, new_contact: NewContact) -> StoreResult<Contact> {
        let contact = Contact::create(tenant_id, new_contact, Utc::now());
        self.tables.write().await.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn create_contact_for_phone(&self, tenant_id: &str, new_contact: NewContact) -> StoreResult<Contact> {
        let mut tables = self.tables.write().await;
        if let Some(phone) = new_contact.phone.as_deref() {
            if tables
                .contacts
                .iter()
                .any(|c| c.tenant_id == tenant_id && c.phone.as_deref() == Some(phone))
            {
                return Err(StoreError::Conflict("Contact"));
            }
        }
        let contact = Contact::create(tenant_id, new_contact, Utc::now());
        tables.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn update_contact(&self, tenant_id: &str, id: &str, changes: ContactChanges) -> StoreResult<Contact> {
        let mut tables = self.tables.write().await;
        let contact = tables
            .contacts
            .iter_mut()
            .find(|c| c.tenant_id == tenant_id && c.id == id)
            .ok_or(StoreError::NotFound("Contact"))?;
        contact.apply(changes, Utc::now());
        Ok(contact.clone())
    }

    async fn delete_contact(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.contact(tenant_id, id)?;
        tables.contacts.retain(|c| !(c.tenant_id == tenant_id && c.id == id));

        // mirror the ON DELETE CASCADE of the SQL schema
        let removed: Vec<String> = tables
            .conversations
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.contact_id == id)
            .map(|c| c.id.clone())
            .collect();
        tables.conversations.retain(|c| !removed.contains(&c.id));
        tables.messages.retain(|m| !removed.contains(&m.conversation_id));
        Ok(())
    }

    async fn list_agents(&self, tenant_id: &str) -> StoreResult<Vec<Agent>> {
        let tables = self.tables.read().await;
        Ok(tables.agents.iter().filter(|a| a.tenant_id == tenant_id).cloned().collect())
    }

    async fn get_agent(&self, tenant_id: &str, id: &str) -> StoreResult<Agent> {
        let tables = self.tables.read().await;
        tables.agent(tenant_id, id).cloned()
    }

    async fn find_default_agent(&self, tenant_id: &str) -> StoreResult<Option<Agent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .iter()
            .find(|a| a.tenant_id == tenant_id && a.is_default_assignee())
            .cloned())
    }

    async fn create_agent(&self, tenant_id: &str, new_agent: NewAgent) -> StoreResult<Agent> {
        let agent = Agent::create(tenant_id, new_agent, Utc::now());
        self.tables.write().await.agents.push(agent.clone());
        Ok(agent)
    }

    async fn update_agent(&self, tenant_id: &str, id: &str, changes: AgentChanges) -> StoreResult<Agent> {
        let mut tables = self.tables.write().await;
        let agent = tables.agent_mut(tenant_id, id)?;
        agent.apply(changes);
        Ok(agent.clone())
    }

    async fn delete_agent(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.agent(tenant_id, id)?;
        tables.agents.retain(|a| !(a.tenant_id == tenant_id && a.id == id));
        for conversation in tables.conversations.iter_mut().filter(|c| c.tenant_id == tenant_id) {
            if conversation.assigned_agent_id.as_deref() == Some(id) {
                conversation.assigned_agent_id = None;
            }
        }
        Ok(())
    }

    async fn list_conversations(&self, tenant_id: &str) -> StoreResult<Vec<Conversation>> {
        let tables = self.tables.read().await;
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        conversations.reverse();
        conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(conversations)
    }

    async fn get_conversation(&self, tenant_id: &str, id: &str) -> StoreResult<Conversation> {
        let tables = self.tables.read().await;
        tables.conversation(tenant_id, id).cloned()
    }

    async fn find_conversation_by_contact(&self, tenant_id: &str, contact_id: &str) -> StoreResult<Option<Conversation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.contact_id == contact_id)
            .cloned())
    }

    async fn create_conversation(&self, tenant_id: &str, new_conversation: NewConversation) -> StoreResult<Conversation> {
        let mut tables = self.tables.write().await;
        tables.contact(tenant_id, &new_conversation.contact_id)?;
        tables.ensure_agent(tenant_id, new_conversation.assigned_agent_id.as_ref())?;
        tables.insert_conversation(Conversation::create(tenant_id, new_conversation, Utc::now()))
    }

    async fn create_conversation_for_contact(
        &self,
        tenant_id: &str,
        new_conversation: NewConversation,
    ) -> StoreResult<Conversation> {
        let mut tables = self.tables.write().await;
        tables.contact(tenant_id, &new_conversation.contact_id)?;
        tables.ensure_agent(tenant_id, new_conversation.assigned_agent_id.as_ref())?;
        if tables
            .conversations
            .iter()
            .any(|c| c.tenant_id == tenant_id && c.contact_id == new_conversation.contact_id)
        {
            return Err(StoreError::Conflict("Conversation"));
        }
        tables.insert_conversation(Conversation::create(tenant_id, new_conversation, Utc::now()))
    }

    async fn update_conversation(
        &self,
        tenant_id: &str,
        id: &str,
        changes: ConversationChanges,
    ) -> StoreResult<Conversation> {
        let mut tables = self.tables.write().await;
        tables.ensure_agent(tenant_id, changes.assigned_agent_id.as_ref())?;
        let conversation = tables.conversation_mut(tenant_id, id)?;
        conversation.apply(changes);
        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.conversation(tenant_id, id)?;
        tables.conversations.retain(|c| !(c.tenant_id == tenant_id && c.id == id));
        tables.messages.retain(|m| !(m.tenant_id == tenant_id && m.conversation_id == id));
        Ok(())
    }

    async fn list_messages(&self, tenant_id: &str, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let tables = self.tables.read().await;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.conversation_id == conversation_id)
            .cloned()
            .collect();
        // stable sort keeps insertion order for equal timestamps
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn append_message(&self, tenant_id: &str, new_message: NewMessage) -> StoreResult<Message> {
        let mut tables = self.tables.write().await;
        if let Some(external_id) = new_message.external_id.as_deref() {
            if tables
                .messages
                .iter()
                .any(|m| m.tenant_id == tenant_id && m.external_id.as_deref() == Some(external_id))
            {
                return Err(StoreError::Conflict("Message"));
            }
        }
        let message = Message::create(tenant_id, new_message, Utc::now());
        tables.conversation_mut(tenant_id, &message.conversation_id)?.last_message_at = message.timestamp;
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn get_whatsapp_settings(&self, tenant_id: &str) -> StoreResult<Option<WhatsappSettings>> {
        let tables = self.tables.read().await;
        Ok(tables.settings_where(|s| s.tenant_id == tenant_id))
    }

    async fn upsert_whatsapp_settings(
        &self,
        tenant_id: &str,
        changes: WhatsappSettingsChanges,
    ) -> StoreResult<WhatsappSettings> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        let mut settings = tables
            .settings_where(|s| s.tenant_id == tenant_id)
            .unwrap_or_else(|| WhatsappSettings::empty(tenant_id, now));
        settings.apply(changes, now);

        if let Some(phone_number_id) = settings.phone_number_id.as_deref() {
            if tables
                .whatsapp_settings
                .iter()
                .any(|s| s.tenant_id != tenant_id && s.phone_number_id.as_deref() == Some(phone_number_id))
            {
                return Err(StoreError::Conflict("WhatsApp phone number id"));
            }
        }

        tables.whatsapp_settings.retain(|s| s.tenant_id != tenant_id);
        tables.whatsapp_settings.push(settings.clone());
        Ok(settings)
    }

    async fn find_whatsapp_settings_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> StoreResult<Option<WhatsappSettings>> {
        let tables = self.tables.read().await;
        Ok(tables.settings_where(|s| s.phone_number_id.as_deref() == Some(phone_number_id)))
    }

    async fn find_whatsapp_settings_by_verify_token(&self, verify_token: &str) -> StoreResult<Option<WhatsappSettings>> {
        let tables = self.tables.read().await;
        Ok(tables.settings_where(|s| s.webhook_verify_token.as_deref() == Some(verify_token)))
    }
}
