use std::{env, fs, path::Path};

use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::cfg;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AppSettings {
    #[serde(default)]
    pub server: cfg::ServerSettings,

    #[serde(default)]
    pub database: cfg::DatabaseSettings,

    #[serde(default)]
    pub auth: cfg::AuthSettings,

    #[serde(default)]
    pub gateway: cfg::GatewaySettings,
}

impl AppSettings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let app_run_env = Self::get_app_run_env();
        let config_path = Self::get_config_path();
        let mut builder = config::Config::builder();

        // Layer 0: built-in defaults
        let default_toml = toml::to_string(&Self::default())
            .map_err(|e| ConfigError::Message(format!("Failed to serialize defaults: {e}")))?;
        builder = builder.add_source(File::from_str(&default_toml, config::FileFormat::Toml));

        // Layer 1: shared defaults file
        let default_config_path = config_path.join("configs.default.toml");
        if default_config_path.exists() {
            builder = builder.add_source(File::from(default_config_path));
        }

        // Layer 2: environment-specific file
        let env_config_path = config_path.join(format!("configs.{app_run_env}.toml"));
        let env_config_exists = env_config_path.exists();
        if env_config_exists {
            builder = builder.add_source(File::from(env_config_path.clone()));
        }

        // Layer 3: local overrides, never committed
        let local_config_path = config_path.join("configs.local.toml");
        if local_config_path.exists() {
            builder = builder.add_source(File::from(local_config_path));
        }

        // Layer 4: APP_SERVER__PORT, APP_DATABASE__URL, APP_AUTH__PASSWORD_HASH_COST, ...
        builder = builder.add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?.try_deserialize::<Self>()?;

        // In production the resolved config is written out once so operators have a file to edit.
        if app_run_env == "production" && !env_config_exists {
            let settings_str = toml::to_string(&settings)
                .map_err(|e| ConfigError::Message(format!("Failed to serialize config: {e}")))?;
            fs::write(&env_config_path, settings_str)
                .map_err(|e| ConfigError::Message(format!("Failed to write config file: {e}")))?;
            println!("Created default config file at {}", env_config_path.to_string_lossy());
        }

        Ok(settings)
    }

    /// Settings for tests: in-memory SQLite, cheap password hashing.
    #[must_use]
    pub fn for_tests() -> Self {
        let mut settings = Self::default();
        settings.database.url = "sqlite::memory:".to_string();
        settings.database.max_connections = 1;
        settings.auth.password_hash_cost = 4;
        settings.auth.session_sweep_interval_secs = 0;
        settings
    }

    #[must_use]
    pub fn get_server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    #[must_use]
    pub fn get_app_run_env() -> String {
        env::var("APP_RUN_ENV").unwrap_or_else(|_| "production".to_string())
    }

    #[must_use]
    pub fn get_config_path() -> &'static Path {
        Path::new(".")
    }

    #[must_use]
    pub fn get_config_full_path() -> String {
        let config_path = Self::get_config_path();
        config_path
            .canonicalize()
            .ok()
            .unwrap_or_else(|| config_path.to_path_buf())
            .to_string_lossy()
            .to_string()
    }
}
