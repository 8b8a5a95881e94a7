use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use crate::core::{ApiError, ApiJson, ArcContext, FieldErrors};
use crate::db::{AgentChanges, NewAgent, PublicUser};

const MAX_ACCURACY: i64 = 100;

fn validate_agent(name: Option<&str>, accuracy: Option<i64>) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if let Some(name) = name {
        errors.min_chars("name", name, 1);
    }
    if accuracy.is_some_and(|a| !(0..=MAX_ACCURACY).contains(&a)) {
        errors.add("accuracy", format!("accuracy must be between 0 and {MAX_ACCURACY}"));
    }
    errors.finish()
}

pub async fn list(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(context.store.list_agents(&user.id).await?))
}

pub async fn get(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(context.store.get_agent(&user.id, &id).await?))
}

pub async fn create(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    ApiJson(new_agent): ApiJson<NewAgent>,
) -> Result<impl IntoResponse, ApiError> {
    validate_agent(Some(&new_agent.name), Some(new_agent.accuracy))?;
    let agent = context.store.create_agent(&user.id, new_agent).await?;
    tracing::info!(tenant_id = %user.id, agent_id = %agent.id, "Agent created");
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn update(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
    ApiJson(changes): ApiJson<AgentChanges>,
) -> Result<impl IntoResponse, ApiError> {
    validate_agent(changes.name.as_deref(), changes.accuracy)?;
    Ok(Json(context.store.update_agent(&user.id, &id, changes).await?))
}

pub async fn delete(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    context.store.delete_agent(&user.id, &id).await?;
    tracing::info!(tenant_id = %user.id, agent_id = %id, "Agent deleted");
    Ok(StatusCode::NO_CONTENT)
}
