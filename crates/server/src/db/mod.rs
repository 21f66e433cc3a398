//! Account record storage.
//!
//! # Backends
//!
//! - [`PgRecordStore`] - `PostgreSQL`, table `ledger.account`
//! - [`MemoryRecordStore`] - process-local map for tests and demos
//!
//! Both implement [`RecordStore`], the only way the ledger reaches storage.
//! The store offers plain get/set/create-if-absent semantics; read-then-write
//! sequencing across calls is the caller's responsibility.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p rewards-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::time::Duration;

use futures::future::BoxFuture;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use rewards_core::{Points, UserId};

use crate::models::{AccountRecord, NewAccount};

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

/// Embedded schema migrations for the `PostgreSQL` backend.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate user id).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Key-value document storage for accounts, keyed by user id.
///
/// Object-safe so the backend can be chosen at startup.
pub trait RecordStore: Send + Sync {
    /// Fetch an account.
    fn get<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, Result<Option<AccountRecord>, RepositoryError>>;

    /// Overwrite an account's balance.
    ///
    /// Returns `RepositoryError::NotFound` if the account does not exist.
    fn set_points<'a>(
        &'a self,
        user_id: &'a UserId,
        points: Points,
    ) -> BoxFuture<'a, Result<AccountRecord, RepositoryError>>;

    /// Return the existing account, or create it from `account`.
    ///
    /// The boolean is `true` when this call created the record. Existing
    /// records are returned unchanged.
    fn get_or_insert(
        &self,
        account: NewAccount,
    ) -> BoxFuture<'_, Result<(AccountRecord, bool), RepositoryError>>;

    /// Create an account, failing with `RepositoryError::Conflict` if the id
    /// is taken.
    fn insert_if_absent(
        &self,
        account: NewAccount,
    ) -> BoxFuture<'_, Result<AccountRecord, RepositoryError>>;

    /// All accounts ordered by user id.
    fn list(&self) -> BoxFuture<'_, Result<Vec<AccountRecord>, RepositoryError>>;

    /// Cheap connectivity check for readiness probes.
    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
