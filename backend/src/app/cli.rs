use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::app;
use crate::auth::{AuthError, AuthService, Registration};
use crate::cfg;
use crate::db::{self, SqliteStore, StoreError};

#[rustfmt::skip]
#[derive(Debug, Error)]
pub enum CliError {
    #[error("This command needs the sqlite database backend")]
    SqliteBackendRequired,

    #[error("Opening the database failed")]
    DatabaseOpenFailed { #[source] source: StoreError },

    #[error("Checking migration status failed")]
    MigrationStatusCheckFailed { #[source] source: app::MigrationError },

    #[error("Running migrations failed")]
    MigrationRunFailed { #[source] source: app::MigrationError },

    #[error("Reading the password failed")]
    PasswordPromptFailed { #[source] source: std::io::Error },

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Creating the user failed")]
    UserCreationFailed { #[source] source: AuthError },
}

#[derive(Parser)]
#[command(name = "inboxcrm")]
#[command(about = "Multi-tenant CRM backend fed by WhatsApp Business webhooks", long_about = None)]
pub struct Cli {
    /// Without a command the HTTP server is started
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage the database schema
    Migrate {
        #[command(subcommand)]
        action: MigrateCommand,
    },
    /// Register an account; the password is prompted for
    CreateUser {
        #[arg(long)]
        name: String,
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Check if there are pending migrations
    Status,
    /// List all embedded migrations
    List,
}

async fn open_pool(settings: &cfg::DatabaseSettings) -> Result<db::DbPool, CliError> {
    if settings.backend != cfg::StoreBackend::Sqlite {
        return Err(CliError::SqliteBackendRequired);
    }
    db::create_db_pool(settings)
        .await
        .map_err(|e| CliError::DatabaseOpenFailed { source: e })
}

pub async fn run_command(command: Command, settings: cfg::AppSettings) -> Result<(), CliError> {
    match command {
        Command::Migrate { action: MigrateCommand::List } => {
            println!("Embedded migrations:");
            for (i, migration) in app::list_migrations().iter().enumerate() {
                println!("{}. {}", i + 1, migration);
            }
        }
        Command::Migrate { action: MigrateCommand::Status } => {
            let pool = open_pool(&settings.database).await?;
            match app::count_pending_migrations(&pool).await {
                Ok(0) => println!("Database is up to date. No pending migrations."),
                Ok(pending) => println!("There are {pending} pending migrations that need to be applied."),
                Err(app::MigrationError::NoMigrationsApplied) => println!("No migrations have been applied yet."),
                Err(e) => return Err(CliError::MigrationStatusCheckFailed { source: e }),
            }
        }
        Command::Migrate { action: MigrateCommand::Run } => {
            let pool = open_pool(&settings.database).await?;
            app::run_migrations(&pool)
                .await
                .map_err(|e| CliError::MigrationRunFailed { source: e })?;
            println!("Migrations applied successfully.");
        }
        Command::CreateUser { name, username, email } => {
            let pool = open_pool(&settings.database).await?;
            app::run_migrations(&pool)
                .await
                .map_err(|e| CliError::MigrationRunFailed { source: e })?;

            let password = rpassword::prompt_password(format!("Password for '{username}': "))
                .map_err(|e| CliError::PasswordPromptFailed { source: e })?;
            let confirmation = rpassword::prompt_password("Repeat password: ")
                .map_err(|e| CliError::PasswordPromptFailed { source: e })?;
            if password != confirmation {
                return Err(CliError::PasswordMismatch);
            }

            let auth = AuthService::new(std::sync::Arc::new(SqliteStore::new(pool)), settings.auth);
            let registration = Registration {
                name,
                username: username.clone(),
                email,
                password,
            };
            let signed_in = auth
                .register(registration)
                .await
                .map_err(|e| CliError::UserCreationFailed { source: e })?;
            println!("User '{username}' created with id {}.", signed_in.user.id);
        }
    }
    Ok(())
}
