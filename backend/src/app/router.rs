use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, header};
use axum::middleware;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::{self, ApiError};
use crate::routes;

/// Bearer token of the authenticated request, for handlers that act on the session itself.
#[derive(Clone, Debug)]
pub struct BearerToken(pub String);

/// Back end server built from public routes and bearer-protected routes.
pub fn create_router(context: core::ArcContext) -> Router {
    let api_routes = Router::new()
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/contacts", get(routes::contacts::list).post(routes::contacts::create))
        .route(
            "/api/contacts/{id}",
            get(routes::contacts::get)
                .put(routes::contacts::update)
                .delete(routes::contacts::delete),
        )
        .route("/api/agents", get(routes::agents::list).post(routes::agents::create))
        .route(
            "/api/agents/{id}",
            get(routes::agents::get)
                .put(routes::agents::update)
                .delete(routes::agents::delete),
        )
        .route(
            "/api/conversations",
            get(routes::conversations::list).post(routes::conversations::create),
        )
        .route(
            "/api/conversations/{id}",
            get(routes::conversations::get)
                .put(routes::conversations::update)
                .delete(routes::conversations::delete),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(routes::conversations::list_messages).post(routes::conversations::post_message),
        )
        .route(
            "/api/whatsapp/settings",
            get(routes::whatsapp::get_settings).put(routes::whatsapp::put_settings),
        )
        .layer(middleware::from_fn_with_state(context.clone(), auth_middleware))
        .with_state(context.clone());

    let public_routes = Router::new()
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/api/auth/reset-password", post(routes::auth::reset_password))
        .route(
            "/api/whatsapp/webhook",
            get(routes::whatsapp::verify_webhook).post(routes::whatsapp::receive_webhook),
        )
        .route("/health", get(routes::health::health_check))
        .with_state(context);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn auth_middleware(State(context): State<core::ArcContext>, mut req: Request<Body>, next: Next) -> Response {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match context.auth.authenticate_request(authorization.as_deref()).await {
        Ok(Some(user)) => {
            tracing::debug!(user_id = %user.id, "Authenticated user accessing API");
            let token = authorization
                .as_deref()
                .and_then(crate::auth::bearer_token)
                .unwrap_or_default()
                .to_string();
            req.extensions_mut().insert(user);
            req.extensions_mut().insert(BearerToken(token));
            next.run(req).await
        }
        Ok(None) => {
            tracing::warn!(path = %req.uri().path(), "Unauthorized access attempt");
            ApiError::unauthenticated().into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
