use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::core::{ApiError, ApiJson, ArcContext, FieldErrors};
use crate::db::{
    Agent, Contact, Conversation, ConversationChanges, Message, MessageType, NewConversation, NewMessage, PublicUser,
    StoreError,
};
use crate::services::ingest::OutgoingMessage;

/// Conversation as listed in the inbox, with what the list row displays.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub contact: Option<Contact>,
    pub agent: Option<Agent>,
    pub last_message: Option<Message>,
    pub message_count: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessage {
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub is_incoming: bool,
    #[serde(default)]
    pub sender_id: Option<String>,
}

fn found<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn view(context: &ArcContext, tenant_id: &str, conversation: Conversation) -> Result<ConversationView, ApiError> {
    let contact = found(context.store.get_contact(tenant_id, &conversation.contact_id).await)?;
    let agent = match &conversation.assigned_agent_id {
        Some(agent_id) => found(context.store.get_agent(tenant_id, agent_id).await)?,
        None => None,
    };
    let mut messages = context.store.list_messages(tenant_id, &conversation.id).await?;
    let message_count = messages.len();
    Ok(ConversationView {
        conversation,
        contact,
        agent,
        last_message: messages.pop(),
        message_count,
    })
}

pub async fn list(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = context.store.list_conversations(&user.id).await?;
    let mut views = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        views.push(view(&context, &user.id, conversation).await?);
    }
    Ok(Json(views))
}

pub async fn get(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = context.store.get_conversation(&user.id, &id).await?;
    Ok(Json(view(&context, &user.id, conversation).await?))
}

pub async fn create(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    ApiJson(new_conversation): ApiJson<NewConversation>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = context.store.create_conversation(&user.id, new_conversation).await?;
    tracing::info!(tenant_id = %user.id, conversation_id = %conversation.id, "Conversation created");
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn update(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
    ApiJson(changes): ApiJson<ConversationChanges>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(context.store.update_conversation(&user.id, &id, changes).await?))
}

pub async fn delete(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    context.store.delete_conversation(&user.id, &id).await?;
    tracing::info!(tenant_id = %user.id, conversation_id = %id, "Conversation deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_messages(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // an empty list must not hide a foreign or unknown conversation
    context.store.get_conversation(&user.id, &id).await?;
    Ok(Json(context.store.list_messages(&user.id, &id).await?))
}

/// Outgoing messages go through the relay path; incoming ones are only recorded.
pub async fn post_message(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<PostMessage>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = FieldErrors::new();
    errors.min_chars("content", &request.content, 1);
    errors.finish()?;

    let message = if request.is_incoming {
        let new_message = NewMessage {
            conversation_id: id,
            sender_id: None,
            content: request.content,
            message_type: request.message_type,
            is_incoming: true,
            external_id: None,
        };
        context.store.append_message(&user.id, new_message).await?
    } else {
        let outgoing = OutgoingMessage {
            content: request.content,
            message_type: request.message_type,
            sender_id: request.sender_id,
        };
        let (message, _delivery) = context.ingestor.send_outbound(&user.id, &id, outgoing).await?;
        message
    };
    Ok((StatusCode::CREATED, Json(message)))
}
