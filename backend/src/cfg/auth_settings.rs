use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub session_ttl_days: i64,

    #[serde(default)]
    pub reset_token_ttl_minutes: i64,

    /// bcrypt work factor.
    #[serde(default)]
    pub password_hash_cost: u32,

    /// No mail transport exists, so forgot-password hands the token back to the caller.
    #[serde(default)]
    pub expose_reset_token: bool,

    /// Period of the expired-session cleanup task; 0 disables it.
    #[serde(default)]
    pub session_sweep_interval_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_ttl_days: 30,
            reset_token_ttl_minutes: 60,
            password_hash_cost: 12,
            expose_reset_token: true,
            session_sweep_interval_secs: 60 * 60,
        }
    }
}
