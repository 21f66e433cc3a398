//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! rl-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `LEDGER_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Embedded from `crates/server/migrations/`.

use secrecy::SecretString;
use thiserror::Error;

use rewards_server::db::{MIGRATOR, create_pool};

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run the ledger schema migrations.
///
/// # Errors
///
/// Returns an error if the URL is missing, the database is unreachable, or
/// a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("LEDGER_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| MigrationError::MissingEnvVar("LEDGER_DATABASE_URL"))?;

    tracing::info!("Connecting to ledger database...");
    let pool = create_pool(&SecretString::from(database_url)).await?;

    tracing::info!("Running ledger migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Ledger migrations complete!");
    Ok(())
}
