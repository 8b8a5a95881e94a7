use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::db::{DbPool, StoreError, StoreResult, new_record_id};

/// Bearer session. Only the SHA-256 digest of the token is persisted.
#[derive(Clone, Debug, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewSession {
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn create(new_session: NewSession, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            user_id: new_session.user_id,
            token_hash: new_session.token_hash,
            expires_at: new_session.expires_at,
            created_at: now,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

pub async fn insert_session(db: &DbPool, session: &Session) -> StoreResult<()> {
    sqlx::query(
        r"
        INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?)
        ",
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(&session.token_hash)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(db)
    .await
    .map_err(|e| StoreError::from(e).entity("Session"))?;
    Ok(())
}

pub async fn select_session_by_token(db: &DbPool, token_hash: &str) -> StoreResult<Option<Session>> {
    let session = sqlx::query_as::<_, Session>(
        r"
        SELECT id, user_id, token_hash, expires_at, created_at
        FROM sessions
        WHERE token_hash = ?
        ",
    )
    .bind(token_hash)
    .fetch_optional(db)
    .await?;
    Ok(session)
}

pub async fn delete_session_by_token(db: &DbPool, token_hash: &str) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_sessions_by_user(db: &DbPool, user_id: &str) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_sessions_expired_before(db: &DbPool, now: DateTime<Utc>) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
        .bind(now)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
