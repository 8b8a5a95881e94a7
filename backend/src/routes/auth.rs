use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use crate::app::BearerToken;
use crate::auth::Registration;
use crate::core::{ApiError, ApiJson, ArcContext};
use crate::db::PublicUser;

#[derive(Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ForgotPassword {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPassword {
    pub token: String,
    pub password: String,
}

pub async fn register(
    State(context): State<ArcContext>,
    ApiJson(registration): ApiJson<Registration>,
) -> Result<impl IntoResponse, ApiError> {
    let signed_in = context.auth.register(registration).await?;
    let body = json!({
        "result": "ok",
        "user": signed_in.user,
        "token": signed_in.token
    });
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn login(
    State(context): State<ArcContext>,
    ApiJson(login): ApiJson<Login>,
) -> Result<impl IntoResponse, ApiError> {
    let signed_in = context.auth.login(&login.email, &login.password).await?;
    Ok(Json(json!({
        "result": "ok",
        "user": signed_in.user,
        "token": signed_in.token
    })))
}

pub async fn logout(
    State(context): State<ArcContext>,
    Extension(token): Extension<BearerToken>,
) -> Result<impl IntoResponse, ApiError> {
    context.auth.logout(&token.0).await?;
    Ok(Json(json!({"result": "ok"})))
}

#[allow(clippy::unused_async)]
pub async fn me(Extension(user): Extension<PublicUser>) -> impl IntoResponse {
    Json(json!({"result": "ok", "user": user}))
}

pub async fn forgot_password(
    State(context): State<ArcContext>,
    ApiJson(request): ApiJson<ForgotPassword>,
) -> Result<impl IntoResponse, ApiError> {
    let reset_token = context.auth.request_password_reset(&request.email).await?;
    let mut body = json!({
        "result": "ok",
        "message": "Password reset requested"
    });
    // there is no mail transport, so the caller gets the token directly
    if context.auth.settings().expose_reset_token {
        body["resetToken"] = json!(reset_token);
    }
    Ok(Json(body))
}

pub async fn reset_password(
    State(context): State<ArcContext>,
    ApiJson(request): ApiJson<ResetPassword>,
) -> Result<impl IntoResponse, ApiError> {
    context.auth.reset_password(&request.token, &request.password).await?;
    Ok(Json(json!({
        "result": "ok",
        "message": "Password updated, please log in again"
    })))
}
