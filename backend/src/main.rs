#![deny(clippy::all)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![warn(clippy::todo)]
// #![warn(clippy::cargo)]
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]

#[tokio::main]
async fn main() {
    app::run().await;
}

#[cfg(test)]
mod tests {
    mod common;

    mod auth_tests;
    mod conversation_tests;
    mod entity_tests;
    mod tenant_isolation_tests;
    mod webhook_tests;
}

pub mod cfg {
    mod app_settings;
    mod auth_settings;
    mod database_settings;
    mod gateway_settings;
    mod server_settings;

    pub use app_settings::*;
    pub use auth_settings::*;
    pub use database_settings::*;
    pub use gateway_settings::*;
    pub use server_settings::*;
}

pub mod core {
    mod context;
    mod error;
    mod validation;

    pub use context::*;
    pub use error::*;
    pub use validation::*;
}

pub mod auth {
    mod password;
    mod service;
    mod tokens;

    pub use password::*;
    pub use service::*;
    pub use tokens::*;
}

pub mod db {
    mod agents;
    mod contacts;
    mod conversations;
    mod memory;
    mod messages;
    mod sessions;
    mod sqlite;
    mod store;
    mod users;
    mod whatsapp_settings;

    pub use agents::*;
    pub use contacts::*;
    pub use conversations::*;
    pub use memory::*;
    pub use messages::*;
    pub use sessions::*;
    pub use sqlite::*;
    pub use store::*;
    pub use users::*;
    pub use whatsapp_settings::*;
}

pub mod services {
    pub mod gateway;
    pub mod ingest;
    pub mod webhook;
}

pub mod routes {
    pub mod agents;
    pub mod auth;
    pub mod contacts;
    pub mod conversations;
    pub mod health;
    pub mod whatsapp;
}

pub mod app {
    mod cli;
    mod migrations;
    mod router;
    mod server;

    pub use cli::*;
    pub use migrations::*;
    pub use router::*;
    pub use server::*;
}
