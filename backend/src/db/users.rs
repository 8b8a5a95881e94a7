use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::{DbPool, StoreError, StoreResult, new_record_id};

#[derive(Clone, Debug, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// User as exposed to API callers: no credentials, no reset state.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn create(new_user: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            username: new_user.username,
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, username, name, email, password_hash, reset_token_hash, reset_token_expires_at, created_at, updated_at";

pub async fn insert_user(db: &DbPool, user: &User) -> StoreResult<()> {
    sqlx::query(
        r"
        INSERT INTO users (id, username, name, email, password_hash, reset_token_hash, reset_token_expires_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.reset_token_hash)
    .bind(user.reset_token_expires_at)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(db)
    .await
    .map_err(|e| StoreError::from(e).entity("User"))?;
    Ok(())
}

async fn select_user_where(db: &DbPool, condition: &str, value: &str) -> StoreResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {condition} = ? LIMIT 1");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(value)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

pub async fn select_user_by_id(db: &DbPool, id: &str) -> StoreResult<Option<User>> {
    select_user_where(db, "id", id).await
}

pub async fn select_user_by_email(db: &DbPool, email: &str) -> StoreResult<Option<User>> {
    select_user_where(db, "email", email).await
}

pub async fn select_user_by_username(db: &DbPool, username: &str) -> StoreResult<Option<User>> {
    select_user_where(db, "username", username).await
}

pub async fn select_user_by_reset_token(db: &DbPool, token_hash: &str) -> StoreResult<Option<User>> {
    select_user_where(db, "reset_token_hash", token_hash).await
}

pub async fn update_reset_token(
    db: &DbPool,
    user_id: &str,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> StoreResult<()> {
    let result = sqlx::query(
        r"
        UPDATE users
        SET reset_token_hash = ?, reset_token_expires_at = ?, updated_at = ?
        WHERE id = ?
        ",
    )
    .bind(token_hash)
    .bind(expires_at)
    .bind(Utc::now())
    .bind(user_id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("User"));
    }
    Ok(())
}

pub async fn update_password_hash(db: &DbPool, user_id: &str, password_hash: &str) -> StoreResult<()> {
    let result = sqlx::query(
        r"
        UPDATE users
        SET password_hash = ?, reset_token_hash = NULL, reset_token_expires_at = NULL, updated_at = ?
        WHERE id = ?
        ",
    )
    .bind(password_hash)
    .bind(Utc::now())
    .bind(user_id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("User"));
    }
    Ok(())
}
