use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use crate::core::{ApiError, ApiJson, ArcContext, FieldErrors};
use crate::db::{ContactChanges, NewContact, PublicUser};

fn validate_contact(name: Option<&str>, email: Option<&str>) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if let Some(name) = name {
        errors.min_chars("name", name, 1);
    }
    if let Some(email) = email.filter(|e| !e.is_empty()) {
        errors.email("email", email);
    }
    errors.finish()
}

pub async fn list(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
) -> Result<impl IntoResponse, ApiError> {
    let contacts = context.store.list_contacts(&user.id).await?;
    Ok(Json(contacts))
}

pub async fn get(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = context.store.get_contact(&user.id, &id).await?;
    Ok(Json(contact))
}

pub async fn create(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    ApiJson(new_contact): ApiJson<NewContact>,
) -> Result<impl IntoResponse, ApiError> {
    validate_contact(Some(&new_contact.name), new_contact.email.as_deref())?;
    let contact = context.store.create_contact(&user.id, new_contact).await?;
    tracing::info!(tenant_id = %user.id, contact_id = %contact.id, "Contact created");
    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn update(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
    ApiJson(changes): ApiJson<ContactChanges>,
) -> Result<impl IntoResponse, ApiError> {
    validate_contact(changes.name.as_deref(), changes.email.as_deref())?;
    let contact = context.store.update_contact(&user.id, &id, changes).await?;
    Ok(Json(contact))
}

pub async fn delete(
    State(context): State<ArcContext>,
    Extension(user): Extension<PublicUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    context.store.delete_contact(&user.id, &id).await?;
    tracing::info!(tenant_id = %user.id, contact_id = %id, "Contact deleted");
    Ok(StatusCode::NO_CONTENT)
}
