use axum::http::{HeaderValue, StatusCode, header};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use super::common::{TEST_PASSWORD, register, spawn_app};
use crate::auth;
use crate::db::NewSession;

#[tokio::test]
async fn test_register_returns_public_user_and_token() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({
            "name": "Alice Doe",
            "username": "alice",
            "email": "alice@example.com",
            "password": TEST_PASSWORD
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["result"], "ok");
    assert!(body["token"].is_string());
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["name"], "Alice Doe");
    assert!(body["user"].get("passwordHash").is_none());
    assert!(body["user"].get("password").is_none());
}

#[tokio::test]
async fn test_login_after_register_resolves_same_user() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": account.email, "password": TEST_PASSWORD}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let token = body["token"].as_str().unwrap();
    assert_ne!(token, account.token);

    let me = app.server.get("/api/auth/me").authorization_bearer(token).await;
    me.assert_status_ok();
    let me: Value = me.json();
    assert_eq!(me["user"]["id"], account.id.as_str());

    // earlier sessions stay valid
    app.server
        .get("/api/auth/me")
        .authorization_bearer(&account.token)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;

    let wrong_password = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": account.email, "password": "not-the-password"}))
        .await;
    let unknown_email = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": "nobody@example.com", "password": TEST_PASSWORD}))
        .await;

    wrong_password.assert_status(StatusCode::UNAUTHORIZED);
    unknown_email.assert_status(StatusCode::UNAUTHORIZED);
    let wrong_password: Value = wrong_password.json();
    let unknown_email: Value = unknown_email.json();
    assert_eq!(wrong_password["kind"], "unauthenticated");
    assert_eq!(wrong_password, unknown_email);
}

#[tokio::test]
async fn test_register_duplicate_email_and_username_conflict() {
    let app = spawn_app().await;
    register(&app.server, "alice").await;

    let same_email = app
        .server
        .post("/api/auth/register")
        .json(&json!({"name": "Other", "username": "other", "email": "alice@example.com", "password": TEST_PASSWORD}))
        .await;
    same_email.assert_status(StatusCode::CONFLICT);
    let body: Value = same_email.json();
    assert_eq!(body["kind"], "conflict");

    let same_username = app
        .server
        .post("/api/auth/register")
        .json(&json!({"name": "Other", "username": "alice", "email": "other@example.com", "password": TEST_PASSWORD}))
        .await;
    same_username.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_validation_reports_fields() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({"name": "A", "username": "al", "email": "nope", "password": "123"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["kind"], "validation_error");
    for field in ["name", "username", "email", "password"] {
        assert!(body["fields"][field].is_string(), "missing field error for {field}");
    }
}

#[tokio::test]
async fn test_malformed_body_is_a_validation_error() {
    let app = spawn_app().await;

    let response = app.server.post("/api/auth/login").json(&json!({"email": "a@b.co"})).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["kind"], "validation_error");
    assert!(body["fields"]["body"].is_string());
}

#[tokio::test]
async fn test_protected_routes_require_bearer_token() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;

    let missing = app.server.get("/api/contacts").await;
    missing.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = missing.json();
    assert_eq!(body["kind"], "unauthenticated");

    let basic = app
        .server
        .get("/api/contacts")
        .add_header(header::AUTHORIZATION, HeaderValue::from_str(&format!("Basic {}", account.token)).unwrap())
        .await;
    basic.assert_status(StatusCode::UNAUTHORIZED);

    let bogus = app.server.get("/api/contacts").authorization_bearer("not-a-session").await;
    bogus.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_only_that_session() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;
    let second: Value = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": account.email, "password": TEST_PASSWORD}))
        .await
        .json();
    let second_token = second["token"].as_str().unwrap();

    app.server
        .post("/api/auth/logout")
        .authorization_bearer(&account.token)
        .await
        .assert_status_ok();

    app.server
        .get("/api/auth/me")
        .authorization_bearer(&account.token)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    app.server
        .get("/api/auth/me")
        .authorization_bearer(second_token)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_expired_session_is_rejected_and_removed() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;

    let token = auth::generate_token();
    let token_hash = auth::hash_token(&token);
    app.context
        .store
        .create_session(NewSession {
            user_id: account.id.clone(),
            token_hash: token_hash.clone(),
            expires_at: Utc::now() - Duration::minutes(1),
        })
        .await
        .unwrap();

    for _ in 0..2 {
        app.server
            .get("/api/auth/me")
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        assert!(app.context.store.find_session(&token_hash).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_password_reset_flow_revokes_all_sessions() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;
    let second: Value = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": account.email, "password": TEST_PASSWORD}))
        .await
        .json();
    let second_token = second["token"].as_str().unwrap().to_string();

    let forgot = app
        .server
        .post("/api/auth/forgot-password")
        .json(&json!({"email": account.email}))
        .await;
    forgot.assert_status_ok();
    let forgot: Value = forgot.json();
    let reset_token = forgot["resetToken"].as_str().unwrap();

    app.server
        .post("/api/auth/reset-password")
        .json(&json!({"token": reset_token, "password": "brand-new-secret"}))
        .await
        .assert_status_ok();

    for token in [&account.token, &second_token] {
        app.server
            .get("/api/auth/me")
            .authorization_bearer(token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    app.server
        .post("/api/auth/login")
        .json(&json!({"email": account.email, "password": TEST_PASSWORD}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    app.server
        .post("/api/auth/login")
        .json(&json!({"email": account.email, "password": "brand-new-secret"}))
        .await
        .assert_status_ok();

    // the token was consumed
    let reused = app
        .server
        .post("/api/auth/reset-password")
        .json(&json!({"token": reset_token, "password": "another-secret"}))
        .await;
    reused.assert_status(StatusCode::BAD_REQUEST);
    let reused: Value = reused.json();
    assert_eq!(reused["kind"], "invalid_token");
}

#[tokio::test]
async fn test_forgot_password_unknown_email_is_not_found() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/api/auth/forgot-password")
        .json(&json!({"email": "ghost@example.com"}))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_expired_reset_token_is_invalid() {
    let app = spawn_app().await;
    let account = register(&app.server, "alice").await;

    let reset_token = auth::generate_token();
    app.context
        .store
        .set_reset_token(&account.id, &auth::hash_token(&reset_token), Utc::now() - Duration::seconds(1))
        .await
        .unwrap();

    let response = app
        .server
        .post("/api/auth/reset-password")
        .json(&json!({"token": reset_token, "password": "brand-new-secret"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    app.server
        .get("/api/auth/me")
        .authorization_bearer(&account.token)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;

    let response = app.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "OK");
}
