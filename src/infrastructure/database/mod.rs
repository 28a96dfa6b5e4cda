//! PostgreSQL-backed durable storage.

mod postgres_repository;


use crate::config::DatabaseConfig;
use crate::domain::RepositoryPtr;
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

pub use postgres_repository::PostgresRepository;

/// Connects to PostgreSQL, retrying while the server comes up, then applies
/// the embedded migrations.
///
/// # Errors
/// Returns the last connection error once `retry_count` attempts are used up,
/// or any migration failure.
pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<PgPool> {
    // ---
    let mut attempt = 0;

    let pool = loop {
        attempt += 1;

        let result = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await;

        match result {
            Ok(pool) => break pool,
            Err(err) if attempt < config.retry_count => {
                tracing::warn!(
                    "Database connection attempt {}/{} failed: {}",
                    attempt,
                    config.retry_count,
                    err
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(err) => {
                return Err(err).context(format!(
                    "Failed to connect to database after {attempt} attempts"
                ))
            }
        }
    };

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database ready after {} attempt(s)", attempt);

    Ok(pool)
}

/// Creates the Postgres repository behind the `Repository` abstraction.
pub fn create_postgres_repository(pool: PgPool) -> RepositoryPtr {
    // ---
    Arc::new(postgres_repository::create_postgres_repository(pool))
}
