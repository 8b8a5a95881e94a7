use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::auth::{bearer_token, generate_token, hash_password, hash_token, verify_password};
use crate::cfg;
use crate::core::FieldErrors;
use crate::db::{NewSession, NewUser, PublicUser, Store, StoreError};

const MIN_NAME_CHARS: usize = 2;
const MIN_USERNAME_CHARS: usize = 3;
const MIN_PASSWORD_CHARS: usize = 6;

#[rustfmt::skip]
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Conflict(&'static str),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No account registered with this email")]
    UnknownEmail,

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Password hashing failed: {0}")]
    PasswordHashingFailed(#[from] bcrypt::BcryptError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<FieldErrors> for AuthError {
    fn from(fields: FieldErrors) -> Self {
        Self::Validation(fields)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Registration {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors
            .min_chars("name", &self.name, MIN_NAME_CHARS)
            .min_chars("username", &self.username, MIN_USERNAME_CHARS)
            .email("email", &self.email)
            .min_chars("password", &self.password, MIN_PASSWORD_CHARS);
        errors.finish()
    }
}

/// Session issued to a caller: the plaintext token only exists here.
#[derive(Clone, Debug)]
pub struct SignedIn {
    pub user: PublicUser,
    pub token: String,
}

/// Session and password-reset lifecycle on top of a [`Store`].
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    settings: cfg::AuthSettings,
}

impl AuthService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, settings: cfg::AuthSettings) -> Self {
        Self { store, settings }
    }

    #[must_use]
    pub const fn settings(&self) -> &cfg::AuthSettings {
        &self.settings
    }

    pub async fn register(&self, registration: Registration) -> Result<SignedIn, AuthError> {
        registration.validate()?;
        let email = registration.email.trim().to_string();
        let username = registration.username.trim().to_string();

        // two independent probes; the unique indexes catch what slips between them
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict("Email already registered"));
        }
        if self.store.find_user_by_username(&username).await?.is_some() {
            return Err(AuthError::Conflict("Username already taken"));
        }

        let password_hash = hash_password(&registration.password, self.settings.password_hash_cost)?;
        let new_user = NewUser {
            username,
            name: registration.name.trim().to_string(),
            email,
            password_hash,
        };
        let user = self.store.create_user(new_user).await.map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::Conflict("Email or username already registered"),
            other => other.into(),
        })?;

        let token = self.issue_session(&user.id).await?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok(SignedIn { user: user.into(), token })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        let mut errors = FieldErrors::new();
        errors.email("email", email).required("password", password);
        errors.finish()?;

        let Some(user) = self.store.find_user_by_email(email.trim()).await? else {
            tracing::warn!("Login attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "Invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_session(&user.id).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(SignedIn { user: user.into(), token })
    }

    /// Deleting an unknown token is not an error.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let deleted = self.store.delete_session(&hash_token(token)).await?;
        tracing::debug!(deleted, "Session logged out");
        Ok(())
    }

    /// Resolves a bearer token, deleting the session on the spot if it has expired.
    pub async fn get_user_by_token(&self, token: &str) -> Result<Option<PublicUser>, AuthError> {
        let token_hash = hash_token(token);
        let Some(session) = self.store.find_session(&token_hash).await? else {
            return Ok(None);
        };
        if session.is_expired(Utc::now()) {
            self.store.delete_session(&token_hash).await?;
            tracing::debug!(user_id = %session.user_id, "Expired session removed");
            return Ok(None);
        }
        let user = self.store.find_user_by_id(&session.user_id).await?;
        Ok(user.map(PublicUser::from))
    }

    /// Only the `Bearer <token>` scheme is accepted; anything else never reaches the store.
    pub async fn authenticate_request(&self, authorization: Option<&str>) -> Result<Option<PublicUser>, AuthError> {
        match authorization.and_then(bearer_token) {
            Some(token) => self.get_user_by_token(token).await,
            None => Ok(None),
        }
    }

    /// Issues a reset token, replacing any outstanding one.
    pub async fn request_password_reset(&self, email: &str) -> Result<String, AuthError> {
        let mut errors = FieldErrors::new();
        errors.email("email", email);
        errors.finish()?;

        let user = self
            .store
            .find_user_by_email(email.trim())
            .await?
            .ok_or(AuthError::UnknownEmail)?;

        let token = generate_token();
        let expires_at = Utc::now() + Duration::minutes(self.settings.reset_token_ttl_minutes);
        self.store.set_reset_token(&user.id, &hash_token(&token), expires_at).await?;
        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok(token)
    }

    /// Sets the new password and logs the user out of every session.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let mut errors = FieldErrors::new();
        errors.min_chars("password", new_password, MIN_PASSWORD_CHARS);
        errors.finish()?;

        let user = self
            .store
            .find_user_by_reset_token(&hash_token(token))
            .await?
            .ok_or(AuthError::InvalidResetToken)?;
        match user.reset_token_expires_at {
            Some(expires_at) if expires_at >= Utc::now() => {}
            _ => return Err(AuthError::InvalidResetToken),
        }

        let password_hash = hash_password(new_password, self.settings.password_hash_cost)?;
        self.store.update_password(&user.id, &password_hash).await?;
        let revoked = self.store.delete_user_sessions(&user.id).await?;
        tracing::info!(user_id = %user.id, revoked, "Password reset, all sessions revoked");
        Ok(())
    }

    /// Storage hygiene only; expiry is enforced on every lookup regardless.
    pub async fn sweep_expired_sessions(&self) -> Result<u64, AuthError> {
        Ok(self.store.delete_expired_sessions(Utc::now()).await?)
    }

    async fn issue_session(&self, user_id: &str) -> Result<String, AuthError> {
        let token = generate_token();
        let new_session = NewSession {
            user_id: user_id.to_string(),
            token_hash: hash_token(&token),
            expires_at: Utc::now() + Duration::days(self.settings.session_ttl_days),
        };
        self.store.create_session(new_session).await?;
        Ok(token)
    }
}
