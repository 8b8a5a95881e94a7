use sqlx::Error as SqlxError;
use sqlx::migrate::MigrateError as SqlxMigrateError;
use thiserror::Error;

use crate::db::DbPool;

#[rustfmt::skip]
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to run embedded migrations")]
    EmbeddedMigrationFailed { source: SqlxMigrateError },

    #[error("No migrations applied yet")]
    NoMigrationsApplied,

    #[error("Failed to fetch applied migrations")]
    FetchAppliedMigrationsFailed { #[from] source: SqlxError },
}

/// List all embedded migrations
#[must_use]
pub fn list_migrations() -> Vec<String> {
    sqlx::migrate!("./migrations")
        .iter()
        .map(|m| format!("{} {}", m.version, m.description))
        .collect::<Vec<_>>()
}

/// Runs the embedded migrations
pub async fn run_migrations(db: &DbPool) -> Result<(), MigrationError> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .map_err(|e| MigrationError::EmbeddedMigrationFailed { source: e })?;
    tracing::info!("Database migrations completed successfully.");
    Ok(())
}

/// Number of embedded migrations not applied to the database yet
pub async fn count_pending_migrations(db: &DbPool) -> Result<usize, MigrationError> {
    let available = sqlx::migrate!("./migrations").iter().count();
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(db)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(e) if e.message().contains("no such table") => MigrationError::NoMigrationsApplied,
            _ => MigrationError::FetchAppliedMigrationsFailed { source: err },
        })?;
    Ok(available.saturating_sub(usize::try_from(applied).unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::db;

    async fn memory_pool() -> DbPool {
        let settings = cfg::AppSettings::for_tests();
        db::create_db_pool(&settings.database).await.unwrap()
    }

    #[test]
    fn test_list_migrations_includes_initial_schema() {
        let migrations = list_migrations();
        assert!(migrations.iter().any(|m| m.contains("initial schema")));
    }

    #[tokio::test]
    async fn test_pending_count_before_and_after_run() {
        let pool = memory_pool().await;
        assert!(matches!(
            count_pending_migrations(&pool).await,
            Err(MigrationError::NoMigrationsApplied)
        ));

        run_migrations(&pool).await.unwrap();
        assert_eq!(count_pending_migrations(&pool).await.unwrap(), 0);

        // running again is a no-op
        run_migrations(&pool).await.unwrap();
    }
}
