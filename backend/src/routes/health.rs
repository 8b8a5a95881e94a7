use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::core;

pub async fn health_check(State(context): State<core::ArcContext>) -> Result<impl IntoResponse, axum::response::Response> {
    context.store.ping().await.map_err(|e| {
        tracing::error!("Health check failed to reach the store: {}", e);
        (StatusCode::SERVICE_UNAVAILABLE, "Store unavailable").into_response()
    })?;

    Ok((StatusCode::OK, "OK").into_response())
}
