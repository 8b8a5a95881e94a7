use std::sync::Arc;

use axum_test::TestServer;
use serde_json::{Value, json};

use crate::app;
use crate::cfg;
use crate::core;
use crate::db::{self, SqliteStore, Store};
use crate::services::gateway::recording::RecordingGateway;

pub const TEST_PASSWORD: &str = "secret123";

pub struct TestApp {
    pub server: TestServer,
    pub context: core::ArcContext,
    pub gateway: Arc<RecordingGateway>,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(RecordingGateway::new()).await
}

/// Real router on a migrated in-memory SQLite database and a recording gateway.
pub async fn spawn_app_with(gateway: RecordingGateway) -> TestApp {
    let settings = cfg::AppSettings::for_tests();
    let pool = db::create_db_pool(&settings.database).await.unwrap();
    app::run_migrations(&pool).await.unwrap();

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let gateway = Arc::new(gateway);
    let context = core::Context::new(store, gateway.clone(), settings);
    let server = TestServer::new(app::create_router(context.clone())).unwrap();
    TestApp {
        server,
        context,
        gateway,
    }
}

pub struct Account {
    pub id: String,
    pub token: String,
    pub email: String,
}

pub async fn register(server: &TestServer, username: &str) -> Account {
    let email = format!("{username}@example.com");
    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "name": format!("{username} name"),
            "username": username,
            "email": email,
            "password": TEST_PASSWORD
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = response.json();
    Account {
        id: body["user"]["id"].as_str().unwrap().to_string(),
        token: body["token"].as_str().unwrap().to_string(),
        email,
    }
}

pub async fn configure_whatsapp(server: &TestServer, account: &Account, phone_number_id: &str, access_token: Option<&str>) {
    let mut settings = json!({
        "phoneNumberId": phone_number_id,
        "webhookVerifyToken": format!("verify-{phone_number_id}"),
        "isActive": true
    });
    if let Some(access_token) = access_token {
        settings["accessToken"] = json!(access_token);
    }
    server
        .put("/api/whatsapp/settings")
        .authorization_bearer(&account.token)
        .json(&settings)
        .await
        .assert_status_ok();
}

pub fn text_message(from: &str, id: &str, body: &str) -> Value {
    json!({"from": from, "id": id, "timestamp": "1700000000", "type": "text", "text": {"body": body}})
}

/// Provider payload with one change carrying the given messages.
pub fn webhook_payload(phone_number_id: &str, contacts: Value, messages: Vec<Value>) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550001111", "phone_number_id": phone_number_id},
                    "contacts": contacts,
                    "messages": messages
                }
            }]
        }]
    })
}

pub async fn get_json(server: &TestServer, path: &str, account: &Account) -> Value {
    let response = server.get(path).authorization_bearer(&account.token).await;
    response.assert_status_ok();
    response.json()
}
