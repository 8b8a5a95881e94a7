//! Maps inbound provider messages onto contacts, conversations and messages,
//! and relays operator replies back through the gateway.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::db::{
    Contact, ContactChanges, ContactStage, Conversation, ConversationStatus, Message, MessageType, NewContact,
    NewConversation, NewMessage, Store, StoreError,
};
use crate::services::gateway::{GatewayCredentials, GatewayError, OutboundGateway};
use crate::services::webhook::{self, NormalizedEvent};

const CONTACT_SOURCE: &str = "whatsapp";

#[rustfmt::skip]
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0} vanished while resolving a concurrent create")]
    ResolutionRaced(&'static str),
}

/// Result of ingesting one event.
#[derive(Clone, Debug)]
pub enum Ingested {
    Stored(Message),
    /// The provider message id was already stored for the tenant.
    Duplicate,
}

/// Per-delivery counters, logged for operators since the provider always gets a 200.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WebhookReport {
    pub received: usize,
    pub ingested: usize,
    pub duplicates: usize,
    pub unrouted: usize,
    pub failed: usize,
}

/// What happened to the provider relay of an outgoing message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Sent,
    NotConfigured,
    NoDestination,
    Failed,
}

#[derive(Clone, Debug)]
pub struct OutgoingMessage {
    pub content: String,
    pub message_type: MessageType,
    pub sender_id: Option<String>,
}

/// Name given to contacts first seen without a profile name.
#[must_use]
pub fn placeholder_name(from_address: &str) -> String {
    let digits = webhook::phone_digits(from_address);
    let tail = &digits[digits.len().saturating_sub(4)..];
    format!("WhatsApp User {tail}")
}

fn usable_name(display_name: Option<&String>) -> Option<&str> {
    display_name.map(|n| n.trim()).filter(|n| !n.is_empty())
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn Store>,
    gateway: Arc<dyn OutboundGateway>,
    call_timeout: Duration,
}

impl Ingestor {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn OutboundGateway>, call_timeout: Duration) -> Self {
        Self {
            store,
            gateway,
            call_timeout,
        }
    }

    /// Processes every event of a delivery strictly in payload order. Never fails.
    pub async fn process_webhook(&self, payload: &Value) -> WebhookReport {
        let events = webhook::normalize(payload);
        let mut report = WebhookReport {
            received: events.len(),
            ..WebhookReport::default()
        };

        for event in &events {
            let tenant_id = match self.route(event).await {
                Ok(Some(tenant_id)) => tenant_id,
                Ok(None) => {
                    tracing::warn!(
                        routing_key = ?event.routing_key,
                        external_message_id = %event.external_message_id,
                        "No tenant configured for webhook event"
                    );
                    report.unrouted += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(external_message_id = %event.external_message_id, error = %e, "Tenant routing failed");
                    report.failed += 1;
                    continue;
                }
            };

            match self.ingest(&tenant_id, event).await {
                Ok(Ingested::Stored(_)) => report.ingested += 1,
                Ok(Ingested::Duplicate) => report.duplicates += 1,
                Err(e) => {
                    tracing::error!(
                        tenant_id = %tenant_id,
                        external_message_id = %event.external_message_id,
                        error = %e,
                        "Webhook event ingestion failed"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            received = report.received,
            ingested = report.ingested,
            duplicates = report.duplicates,
            unrouted = report.unrouted,
            failed = report.failed,
            "Webhook delivery processed"
        );
        report
    }

    /// Tenant owning the business phone number the event was delivered to.
    async fn route(&self, event: &NormalizedEvent) -> Result<Option<String>, IngestError> {
        let Some(routing_key) = event.routing_key.as_deref() else {
            return Ok(None);
        };
        let settings = self.store.find_whatsapp_settings_by_phone_number_id(routing_key).await?;
        Ok(settings.map(|s| s.tenant_id))
    }

    /// Resolves contact and conversation, appends the message and acknowledges it.
    pub async fn ingest(&self, tenant_id: &str, event: &NormalizedEvent) -> Result<Ingested, IngestError> {
        let contact = self.resolve_contact(tenant_id, event).await?;
        let conversation = self.resolve_conversation(tenant_id, &contact).await?;

        let new_message = NewMessage {
            conversation_id: conversation.id.clone(),
            sender_id: None,
            content: event.body.clone(),
            message_type: MessageType::Text,
            is_incoming: true,
            external_id: Some(event.external_message_id.clone()),
        };
        let message = match self.store.append_message(tenant_id, new_message).await {
            Ok(message) => message,
            Err(StoreError::Conflict(_)) => {
                tracing::info!(
                    tenant_id,
                    external_message_id = %event.external_message_id,
                    "Duplicate delivery skipped"
                );
                return Ok(Ingested::Duplicate);
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            tenant_id,
            contact_id = %contact.id,
            conversation_id = %conversation.id,
            external_message_id = %event.external_message_id,
            sent_at = ?event.sent_at,
            "Inbound message stored"
        );

        self.acknowledge(tenant_id, &event.external_message_id).await;
        Ok(Ingested::Stored(message))
    }

    async fn resolve_contact(&self, tenant_id: &str, event: &NormalizedEvent) -> Result<Contact, IngestError> {
        let phone = event.from_address.as_str();
        if let Some(contact) = self.store.find_contact_by_phone(tenant_id, phone).await? {
            return self.backfill_name(tenant_id, contact, event).await;
        }

        let name = usable_name(event.display_name.as_ref()).map_or_else(|| placeholder_name(phone), str::to_string);
        let new_contact = NewContact {
            name,
            phone: Some(phone.to_string()),
            source: Some(CONTACT_SOURCE.to_string()),
            stage: ContactStage::New,
            ..NewContact::default()
        };
        match self.store.create_contact_for_phone(tenant_id, new_contact).await {
            Ok(contact) => {
                tracing::info!(tenant_id, contact_id = %contact.id, "Contact created from inbound message");
                Ok(contact)
            }
            Err(StoreError::Conflict(_)) => {
                // a concurrent delivery created it first
                let contact = self
                    .store
                    .find_contact_by_phone(tenant_id, phone)
                    .await?
                    .ok_or(IngestError::ResolutionRaced("Contact"))?;
                self.backfill_name(tenant_id, contact, event).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces a placeholder name with the provider profile name, once.
    async fn backfill_name(&self, tenant_id: &str, contact: Contact, event: &NormalizedEvent) -> Result<Contact, IngestError> {
        let Some(display_name) = usable_name(event.display_name.as_ref()) else {
            return Ok(contact);
        };
        if display_name == contact.name || contact.name != placeholder_name(&event.from_address) {
            return Ok(contact);
        }
        let changes = ContactChanges {
            name: Some(display_name.to_string()),
            ..ContactChanges::default()
        };
        let contact = self.store.update_contact(tenant_id, &contact.id, changes).await?;
        tracing::info!(tenant_id, contact_id = %contact.id, "Contact name filled from WhatsApp profile");
        Ok(contact)
    }

    async fn resolve_conversation(&self, tenant_id: &str, contact: &Contact) -> Result<Conversation, IngestError> {
        if let Some(conversation) = self.store.find_conversation_by_contact(tenant_id, &contact.id).await? {
            return Ok(conversation);
        }

        let assignee = self.store.find_default_agent(tenant_id).await?;
        let new_conversation = NewConversation {
            contact_id: contact.id.clone(),
            status: ConversationStatus::Active,
            assigned_agent_id: assignee.map(|agent| agent.id),
        };
        match self.store.create_conversation_for_contact(tenant_id, new_conversation).await {
            Ok(conversation) => {
                tracing::info!(
                    tenant_id,
                    contact_id = %contact.id,
                    conversation_id = %conversation.id,
                    assigned_agent_id = ?conversation.assigned_agent_id,
                    "Conversation opened from inbound message"
                );
                Ok(conversation)
            }
            Err(StoreError::Conflict(_)) => self
                .store
                .find_conversation_by_contact(tenant_id, &contact.id)
                .await?
                .ok_or(IngestError::ResolutionRaced("Conversation")),
            Err(e) => Err(e.into()),
        }
    }

    async fn credentials(&self, tenant_id: &str) -> Result<Option<GatewayCredentials>, StoreError> {
        let settings = self.store.get_whatsapp_settings(tenant_id).await?;
        Ok(settings.as_ref().and_then(GatewayCredentials::from_settings))
    }

    async fn bounded<F>(&self, call: F) -> Result<(), GatewayError>
    where
        F: Future<Output = Result<(), GatewayError>> + Send,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or_else(|_| Err(GatewayError::TimedOut(self.call_timeout)))
    }

    /// Read receipt; failures are logged and never undo the stored message.
    async fn acknowledge(&self, tenant_id: &str, external_message_id: &str) {
        let credentials = match self.credentials(tenant_id).await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(tenant_id, error = %e, "Could not load gateway credentials for read receipt");
                return;
            }
        };
        if let Err(e) = self.bounded(self.gateway.mark_read(&credentials, external_message_id)).await {
            tracing::warn!(tenant_id, external_message_id, error = %e, "Read receipt failed");
        }
    }

    /// Stores an operator reply, then tries to relay it to the contact's phone.
    pub async fn send_outbound(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        outgoing: OutgoingMessage,
    ) -> Result<(Message, Delivery), IngestError> {
        let conversation = self.store.get_conversation(tenant_id, conversation_id).await?;
        if let Some(sender_id) = &outgoing.sender_id {
            self.store.get_agent(tenant_id, sender_id).await?;
        }

        let new_message = NewMessage {
            conversation_id: conversation.id.clone(),
            sender_id: outgoing.sender_id,
            content: outgoing.content,
            message_type: outgoing.message_type,
            is_incoming: false,
            external_id: None,
        };
        let message = self.store.append_message(tenant_id, new_message).await?;

        let delivery = self.relay(tenant_id, &conversation, &message).await;
        tracing::info!(
            tenant_id,
            conversation_id = %conversation.id,
            message_id = %message.id,
            delivery = ?delivery,
            "Outbound message stored"
        );
        Ok((message, delivery))
    }

    async fn relay(&self, tenant_id: &str, conversation: &Conversation, message: &Message) -> Delivery {
        let credentials = match self.credentials(tenant_id).await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => return Delivery::NotConfigured,
            Err(e) => {
                tracing::warn!(tenant_id, error = %e, "Could not load gateway credentials");
                return Delivery::Failed;
            }
        };
        let phone = match self.store.get_contact(tenant_id, &conversation.contact_id).await {
            Ok(contact) => contact.phone.filter(|p| !p.trim().is_empty()),
            Err(e) => {
                tracing::warn!(tenant_id, conversation_id = %conversation.id, error = %e, "Could not load contact");
                return Delivery::Failed;
            }
        };
        let Some(phone) = phone else {
            return Delivery::NoDestination;
        };

        match self.bounded(self.gateway.send_text(&credentials, &phone, &message.content)).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                tracing::warn!(tenant_id, message_id = %message.id, error = %e, "Outbound relay failed");
                Delivery::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::{AgentStatus, AgentType, MemoryStore, NewAgent, WhatsappSettingsChanges};
    use crate::services::gateway::recording::{GatewayCall, RecordingGateway};

    const TENANT: &str = "tenant-a";
    const PHONE: &str = "+5511999990000";

    struct Fixture {
        store: Arc<dyn Store>,
        gateway: Arc<RecordingGateway>,
        ingestor: Ingestor,
    }

    fn fixture_with(gateway: RecordingGateway, timeout: Duration) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let gateway = Arc::new(gateway);
        let ingestor = Ingestor::new(store.clone(), gateway.clone(), timeout);
        Fixture { store, gateway, ingestor }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingGateway::new(), Duration::from_secs(10))
    }

    fn event(id: &str, display_name: Option<&str>) -> NormalizedEvent {
        NormalizedEvent {
            routing_key: Some("PN1".to_string()),
            from_address: PHONE.to_string(),
            external_message_id: id.to_string(),
            body: format!("body of {id}"),
            display_name: display_name.map(str::to_string),
            sent_at: None,
        }
    }

    async fn configure(store: &Arc<dyn Store>, tenant_id: &str, phone_number_id: &str, access_token: Option<&str>) {
        store
            .upsert_whatsapp_settings(
                tenant_id,
                WhatsappSettingsChanges {
                    access_token: access_token.map(str::to_string),
                    phone_number_id: Some(phone_number_id.to_string()),
                    webhook_verify_token: Some(format!("verify-{tenant_id}")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_placeholder_name_uses_last_four_digits() {
        assert_eq!(placeholder_name("+5511999990000"), "WhatsApp User 0000");
        assert_eq!(placeholder_name("+1 555 123-4567"), "WhatsApp User 4567");
        assert_eq!(placeholder_name("42"), "WhatsApp User 42");
    }

    #[tokio::test]
    async fn test_first_event_creates_contact_conversation_and_message() {
        let f = fixture();
        let Ingested::Stored(message) = f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap() else {
            panic!("expected stored message");
        };

        let contacts = f.store.list_contacts(TENANT).await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name, "WhatsApp User 0000");
        assert_eq!(contacts[0].phone.as_deref(), Some(PHONE));
        assert_eq!(contacts[0].stage, ContactStage::New);
        assert_eq!(contacts[0].source.as_deref(), Some("whatsapp"));

        let conversations = f.store.list_conversations(TENANT).await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].status, ConversationStatus::Active);
        assert_eq!(conversations[0].assigned_agent_id, None);

        assert!(message.is_incoming);
        assert_eq!(message.sender_id, None);
        assert_eq!(message.message_type, MessageType::Text);
        assert_eq!(message.external_id.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn test_sequential_events_reuse_conversation() {
        let f = fixture();
        f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        let Ingested::Stored(second) = f.ingestor.ingest(TENANT, &event("m2", None)).await.unwrap() else {
            panic!("expected stored message");
        };

        let conversations = f.store.list_conversations(TENANT).await.unwrap();
        assert_eq!(conversations.len(), 1);
        let messages = f.store.list_messages(TENANT, &conversations[0].id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].external_id.as_deref(), Some("m1"));
        assert_eq!(conversations[0].last_message_at, second.timestamp);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_messages_share_contact_and_conversation() {
        const DELIVERIES: usize = 16;
        let f = fixture();

        let tasks: Vec<_> = (0..DELIVERIES)
            .map(|i| {
                let ingestor = f.ingestor.clone();
                let event = event(&format!("m{i}"), None);
                tokio::spawn(async move { ingestor.ingest(TENANT, &event).await })
            })
            .collect();
        for task in tasks {
            assert!(matches!(task.await.unwrap(), Ok(Ingested::Stored(_))));
        }

        assert_eq!(f.store.list_contacts(TENANT).await.unwrap().len(), 1);
        let conversations = f.store.list_conversations(TENANT).await.unwrap();
        assert_eq!(conversations.len(), 1);
        let messages = f.store.list_messages(TENANT, &conversations[0].id).await.unwrap();
        assert_eq!(messages.len(), DELIVERIES);
    }

    #[tokio::test]
    async fn test_name_backfill_happens_exactly_once() {
        let f = fixture();
        f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        f.ingestor.ingest(TENANT, &event("m2", Some("Maria Silva"))).await.unwrap();
        f.ingestor.ingest(TENANT, &event("m3", Some("Someone Else"))).await.unwrap();

        let contacts = f.store.list_contacts(TENANT).await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name, "Maria Silva");
    }

    #[tokio::test]
    async fn test_manual_name_is_never_overwritten() {
        let f = fixture();
        f.store
            .create_contact(
                TENANT,
                NewContact {
                    name: "Customer From Spreadsheet".to_string(),
                    phone: Some(PHONE.to_string()),
                    ..NewContact::default()
                },
            )
            .await
            .unwrap();

        f.ingestor.ingest(TENANT, &event("m1", Some("Maria"))).await.unwrap();

        let contacts = f.store.list_contacts(TENANT).await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name, "Customer From Spreadsheet");
    }

    #[tokio::test]
    async fn test_new_conversation_goes_to_first_active_sdr() {
        let f = fixture();
        let agent = |name: &str, agent_type: AgentType, status: AgentStatus| NewAgent {
            name: name.to_string(),
            agent_type,
            status,
            model: "gpt-4".to_string(),
            prompt: String::new(),
            tools: Vec::new(),
            accuracy: 90,
        };
        f.store.create_agent(TENANT, agent("Support", AgentType::Support, AgentStatus::Active)).await.unwrap();
        f.store.create_agent(TENANT, agent("Trainee", AgentType::Sdr, AgentStatus::Training)).await.unwrap();
        let sdr = f.store.create_agent(TENANT, agent("Closer", AgentType::Sdr, AgentStatus::Active)).await.unwrap();
        f.store.create_agent(TENANT, agent("Backup", AgentType::Sdr, AgentStatus::Active)).await.unwrap();

        f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();

        let conversations = f.store.list_conversations(TENANT).await.unwrap();
        assert_eq!(conversations[0].assigned_agent_id.as_deref(), Some(sdr.id.as_str()));
        let sdr = f.store.get_agent(TENANT, &sdr.id).await.unwrap();
        assert_eq!(sdr.conversation_count, 1);
    }

    #[tokio::test]
    async fn test_resolved_conversation_keeps_its_status() {
        let f = fixture();
        f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        let conversation = f.store.list_conversations(TENANT).await.unwrap().remove(0);
        f.store
            .update_conversation(
                TENANT,
                &conversation.id,
                crate::db::ConversationChanges {
                    status: Some(ConversationStatus::Resolved),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.ingestor.ingest(TENANT, &event("m2", None)).await.unwrap();

        let conversations = f.store.list_conversations(TENANT).await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].status, ConversationStatus::Resolved);
        assert_eq!(f.store.list_messages(TENANT, &conversation.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_redelivery_is_deduplicated_and_not_acknowledged_twice() {
        let f = fixture();
        configure(&f.store, TENANT, "PN1", Some("token")).await;

        f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        let again = f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        assert!(matches!(again, Ingested::Duplicate));

        let conversation = f.store.list_conversations(TENANT).await.unwrap().remove(0);
        assert_eq!(f.store.list_messages(TENANT, &conversation.id).await.unwrap().len(), 1);
        assert_eq!(
            f.gateway.calls(),
            vec![GatewayCall::MarkRead {
                phone_number_id: "PN1".to_string(),
                external_message_id: "m1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_acknowledgement_failure_keeps_message() {
        let f = fixture_with(RecordingGateway::failing(), Duration::from_secs(10));
        configure(&f.store, TENANT, "PN1", Some("token")).await;

        let outcome = f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        assert!(matches!(outcome, Ingested::Stored(_)));
        assert_eq!(f.gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_gateway_is_bounded_by_timeout() {
        let f = fixture_with(RecordingGateway::stalling(Duration::from_secs(5)), Duration::from_millis(20));
        configure(&f.store, TENANT, "PN1", Some("token")).await;

        let started = std::time::Instant::now();
        let outcome = f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        assert!(matches!(outcome, Ingested::Stored(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_no_acknowledgement_without_credentials() {
        let f = fixture();
        configure(&f.store, TENANT, "PN1", None).await;

        f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_process_webhook_routes_by_phone_number_id() {
        let f = fixture();
        configure(&f.store, "tenant-a", "PN-A", None).await;
        configure(&f.store, "tenant-b", "PN-B", None).await;
        for tenant in ["tenant-a", "tenant-b"] {
            f.store
                .create_contact(
                    tenant,
                    NewContact {
                        name: format!("Known to {tenant}"),
                        phone: Some("5511999990000".to_string()),
                        ..NewContact::default()
                    },
                )
                .await
                .unwrap();
        }

        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{"changes": [{
                "field": "messages",
                "value": {
                    "metadata": {"phone_number_id": "PN-A"},
                    "messages": [{"from": "5511999990000", "id": "wamid.A", "type": "text", "text": {"body": "Hello"}}]
                }
            }]}]
        });
        let report = f.ingestor.process_webhook(&payload).await;
        assert_eq!(report.ingested, 1);

        assert_eq!(f.store.list_conversations("tenant-a").await.unwrap().len(), 1);
        assert!(f.store.list_conversations("tenant-b").await.unwrap().is_empty());
        assert_eq!(f.store.list_contacts("tenant-b").await.unwrap()[0].name, "Known to tenant-b");
    }

    #[tokio::test]
    async fn test_process_webhook_reports_every_outcome() {
        let f = fixture();
        configure(&f.store, TENANT, "PN1", None).await;

        let message = |id: &str| json!({"from": "5511999990000", "id": id, "type": "text", "text": {"body": "hi"}});
        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{"changes": [
                {"field": "messages", "value": {"metadata": {"phone_number_id": "PN1"}, "messages": [message("a"), message("b"), message("a")]}},
                {"field": "messages", "value": {"metadata": {"phone_number_id": "UNKNOWN"}, "messages": [message("c")]}}
            ]}]
        });

        let report = f.ingestor.process_webhook(&payload).await;
        assert_eq!(
            report,
            WebhookReport {
                received: 4,
                ingested: 2,
                duplicates: 1,
                unrouted: 1,
                failed: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_outbound_without_credentials_stores_but_does_not_send() {
        let f = fixture();
        f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        let conversation = f.store.list_conversations(TENANT).await.unwrap().remove(0);

        let outgoing = OutgoingMessage {
            content: "Hi".to_string(),
            message_type: MessageType::Text,
            sender_id: None,
        };
        let (message, delivery) = f.ingestor.send_outbound(TENANT, &conversation.id, outgoing).await.unwrap();

        assert_eq!(delivery, Delivery::NotConfigured);
        assert!(!message.is_incoming);
        assert!(f.gateway.calls().is_empty());
        assert_eq!(f.store.list_messages(TENANT, &conversation.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_outbound_relays_to_contact_phone() {
        let f = fixture();
        f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        configure(&f.store, TENANT, "PN1", Some("token")).await;
        let conversation = f.store.list_conversations(TENANT).await.unwrap().remove(0);

        let outgoing = OutgoingMessage {
            content: "Hi".to_string(),
            message_type: MessageType::Text,
            sender_id: None,
        };
        let (_, delivery) = f.ingestor.send_outbound(TENANT, &conversation.id, outgoing).await.unwrap();

        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(
            f.gateway.calls(),
            vec![GatewayCall::SendText {
                phone_number_id: "PN1".to_string(),
                to: PHONE.to_string(),
                text: "Hi".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_outbound_gateway_failure_does_not_fail_the_call() {
        let f = fixture_with(RecordingGateway::failing(), Duration::from_secs(10));
        f.ingestor.ingest(TENANT, &event("m1", None)).await.unwrap();
        configure(&f.store, TENANT, "PN1", Some("token")).await;
        let conversation = f.store.list_conversations(TENANT).await.unwrap().remove(0);

        let outgoing = OutgoingMessage {
            content: "Hi".to_string(),
            message_type: MessageType::Text,
            sender_id: None,
        };
        let (message, delivery) = f.ingestor.send_outbound(TENANT, &conversation.id, outgoing).await.unwrap();

        assert_eq!(delivery, Delivery::Failed);
        let stored = f.store.list_messages(TENANT, &conversation.id).await.unwrap();
        assert_eq!(stored.last().map(|m| m.id.as_str()), Some(message.id.as_str()));
    }

    #[tokio::test]
    async fn test_outbound_to_foreign_conversation_is_not_found() {
        let f = fixture();
        f.ingestor.ingest("tenant-b", &event("m1", None)).await.unwrap();
        let foreign = f.store.list_conversations("tenant-b").await.unwrap().remove(0);

        let outgoing = OutgoingMessage {
            content: "Hi".to_string(),
            message_type: MessageType::Text,
            sender_id: None,
        };
        let result = f.ingestor.send_outbound(TENANT, &foreign.id, outgoing).await;
        assert!(matches!(result, Err(IngestError::Store(StoreError::NotFound("Conversation")))));
        assert_eq!(f.store.list_messages("tenant-b", &foreign.id).await.unwrap().len(), 1);
    }
}
