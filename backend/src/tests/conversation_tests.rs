use axum::http::StatusCode;
use serde_json::{Value, json};

use super::common::{
    Account, TestApp, configure_whatsapp, get_json, register, spawn_app, spawn_app_with, text_message, webhook_payload,
};
use crate::services::gateway::recording::{GatewayCall, RecordingGateway};

const PHONE: &str = "+5511988887777";

async fn create_contact(app: &TestApp, account: &Account, name: &str, phone: Option<&str>) -> Value {
    let response = app
        .server
        .post("/api/contacts")
        .authorization_bearer(&account.token)
        .json(&json!({"name": name, "phone": phone}))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

async fn open_conversation(app: &TestApp, account: &Account, contact_id: &str) -> String {
    let response = app
        .server
        .post("/api/conversations")
        .authorization_bearer(&account.token)
        .json(&json!({"contactId": contact_id}))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    body["id"].as_str().unwrap().to_string()
}

async fn post_reply(app: &TestApp, account: &Account, conversation_id: &str, content: &str) -> Value {
    let response = app
        .server
        .post(&format!("/api/conversations/{conversation_id}/messages"))
        .authorization_bearer(&account.token)
        .json(&json!({"content": content}))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

#[tokio::test]
async fn test_outbound_without_access_token_is_stored_only() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;
    configure_whatsapp(&app.server, &account, "PN-1", None).await;
    let contact = create_contact(&app, &account, "Bruno", Some(PHONE)).await;
    let conversation_id = open_conversation(&app, &account, contact["id"].as_str().unwrap()).await;

    let message = post_reply(&app, &account, &conversation_id, "Hi Bruno").await;
    assert_eq!(message["isIncoming"], false);
    assert_eq!(message["content"], "Hi Bruno");

    let messages = get_json(&app.server, &format!("/api/conversations/{conversation_id}/messages"), &account).await;
    assert_eq!(messages.as_array().unwrap().len(), 1);
    assert!(app.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_outbound_with_access_token_is_relayed() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;
    configure_whatsapp(&app.server, &account, "PN-1", Some("graph-token")).await;
    let contact = create_contact(&app, &account, "Bruno", Some(PHONE)).await;
    let conversation_id = open_conversation(&app, &account, contact["id"].as_str().unwrap()).await;

    post_reply(&app, &account, &conversation_id, "Hi Bruno").await;

    assert_eq!(
        app.gateway.calls(),
        vec![GatewayCall::SendText {
            phone_number_id: "PN-1".to_string(),
            to: PHONE.to_string(),
            text: "Hi Bruno".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_outbound_survives_gateway_failure() {
    let app = spawn_app_with(RecordingGateway::failing()).await;
    let account = register(&app.server, "alice").await;
    configure_whatsapp(&app.server, &account, "PN-1", Some("graph-token")).await;
    let contact = create_contact(&app, &account, "Bruno", Some(PHONE)).await;
    let conversation_id = open_conversation(&app, &account, contact["id"].as_str().unwrap()).await;

    post_reply(&app, &account, &conversation_id, "Are you there?").await;

    assert_eq!(app.gateway.calls().len(), 1);
    let messages = get_json(&app.server, &format!("/api/conversations/{conversation_id}/messages"), &account).await;
    assert_eq!(messages[0]["content"], "Are you there?");
}

#[tokio::test]
async fn test_outbound_to_contact_without_phone_is_not_relayed() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;
    configure_whatsapp(&app.server, &account, "PN-1", Some("graph-token")).await;
    let contact = create_contact(&app, &account, "No Phone", None).await;
    let conversation_id = open_conversation(&app, &account, contact["id"].as_str().unwrap()).await;

    post_reply(&app, &account, &conversation_id, "hello").await;

    assert!(app.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_empty_reply_is_rejected() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;
    let contact = create_contact(&app, &account, "Bruno", Some(PHONE)).await;
    let conversation_id = open_conversation(&app, &account, contact["id"].as_str().unwrap()).await;

    let response = app
        .server
        .post(&format!("/api/conversations/{conversation_id}/messages"))
        .authorization_bearer(&account.token)
        .json(&json!({"content": ""}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["fields"]["content"].is_string());
}

#[tokio::test]
async fn test_inbound_messages_share_one_conversation_and_move_last_message_at() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;
    configure_whatsapp(&app.server, &account, "PN-1", None).await;

    for (id, body) in [("wamid.1", "first"), ("wamid.2", "second")] {
        let payload = webhook_payload("PN-1", json!([]), vec![text_message(PHONE, id, body)]);
        app.server.post("/api/whatsapp/webhook").json(&payload).await.assert_status_ok();
    }

    let conversations = get_json(&app.server, "/api/conversations", &account).await;
    let conversations = conversations.as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    let conversation = &conversations[0];
    assert_eq!(conversation["messageCount"], 2);
    assert_eq!(conversation["lastMessage"]["content"], "second");
    assert_eq!(conversation["lastMessageAt"], conversation["lastMessage"]["timestamp"]);
    assert_eq!(conversation["contact"]["phone"], PHONE);
}

#[tokio::test]
async fn test_conversation_list_is_enriched_and_most_recent_first() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;
    let agent: Value = app
        .server
        .post("/api/agents")
        .authorization_bearer(&account.token)
        .json(&json!({"name": "Sales Bot", "type": "sdr"}))
        .await
        .json();

    let older = create_contact(&app, &account, "Older", Some("+15550000001")).await;
    let newer = create_contact(&app, &account, "Newer", Some("+15550000002")).await;
    let older_id = open_conversation(&app, &account, older["id"].as_str().unwrap()).await;
    let newer_id = open_conversation(&app, &account, newer["id"].as_str().unwrap()).await;
    app.server
        .put(&format!("/api/conversations/{newer_id}"))
        .authorization_bearer(&account.token)
        .json(&json!({"assignedAgentId": agent["id"]}))
        .await
        .assert_status_ok();

    post_reply(&app, &account, &newer_id, "newer first").await;
    post_reply(&app, &account, &older_id, "older bumped").await;

    let conversations = get_json(&app.server, "/api/conversations", &account).await;
    let conversations = conversations.as_array().unwrap();
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0]["id"], older_id.as_str());
    assert_eq!(conversations[0]["contact"]["name"], "Older");
    assert!(conversations[0]["agent"].is_null());
    assert_eq!(conversations[1]["agent"]["name"], "Sales Bot");
    assert_eq!(conversations[1]["lastMessage"]["content"], "newer first");
}

#[tokio::test]
async fn test_inbound_conversation_assigned_to_active_sdr_agent() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;
    configure_whatsapp(&app.server, &account, "PN-1", None).await;
    for (name, agent_type, status) in [
        ("Support", "support", "active"),
        ("Sleeping SDR", "sdr", "inactive"),
        ("Live SDR", "sdr", "active"),
    ] {
        app.server
            .post("/api/agents")
            .authorization_bearer(&account.token)
            .json(&json!({"name": name, "type": agent_type, "status": status}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let payload = webhook_payload("PN-1", json!([]), vec![text_message(PHONE, "wamid.1", "hi")]);
    app.server.post("/api/whatsapp/webhook").json(&payload).await.assert_status_ok();

    let conversations = get_json(&app.server, "/api/conversations", &account).await;
    assert_eq!(conversations[0]["agent"]["name"], "Live SDR");
    assert_eq!(conversations[0]["agent"]["conversationCount"], 1);
}

#[tokio::test]
async fn test_conversation_for_unknown_contact_is_not_found() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;

    app.server
        .post("/api/conversations")
        .authorization_bearer(&account.token)
        .json(&json!({"contactId": "missing"}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
