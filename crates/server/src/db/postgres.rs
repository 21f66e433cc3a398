//! `PostgreSQL` account repository.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::PgPool;

use rewards_core::{EmailClaim, Points, UserId};

use super::{RecordStore, RepositoryError};
use crate::models::{AccountRecord, NewAccount};

const ACCOUNT_COLUMNS: &str = "user_id, email, points, is_admin, created_at, updated_at";

/// Row shape of `ledger.account`.
#[derive(sqlx::FromRow)]
struct AccountRow {
    user_id: String,
    email: Option<String>,
    points: i64,
    is_admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for AccountRecord {
    type Error = RepositoryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let user_id = UserId::parse(&row.user_id).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid user id in database: {e}"))
        })?;
        let email = row
            .email
            .as_deref()
            .map(EmailClaim::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })?;

        Ok(Self {
            user_id,
            email,
            points: Points::new(row.points),
            is_admin: row.is_admin,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Account store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch(&self, user_id: &UserId) -> Result<Option<AccountRecord>, RepositoryError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM ledger.account WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccountRecord::try_from).transpose()
    }

    async fn update_points(
        &self,
        user_id: &UserId,
        points: Points,
    ) -> Result<AccountRecord, RepositoryError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            r"
            UPDATE ledger.account
            SET points = $2, updated_at = now()
            WHERE user_id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(points.get())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn upsert_missing(
        &self,
        account: NewAccount,
    ) -> Result<(AccountRecord, bool), RepositoryError> {
        let inserted: Option<AccountRow> = sqlx::query_as(&format!(
            r"
            INSERT INTO ledger.account (user_id, email, is_admin)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING {ACCOUNT_COLUMNS}
            "
        ))
        .bind(&account.user_id)
        .bind(account.email.as_ref().map(EmailClaim::as_str))
        .bind(account.is_admin)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row.try_into()?, true));
        }

        // Conflict: the record already existed (or a concurrent insert won).
        let existing = self
            .fetch(&account.user_id)
            .await?
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "account {} conflicted on insert but cannot be read",
                    account.user_id
                ))
            })?;
        Ok((existing, false))
    }

    async fn insert(&self, account: NewAccount) -> Result<AccountRecord, RepositoryError> {
        let row: AccountRow = sqlx::query_as(&format!(
            r"
            INSERT INTO ledger.account (user_id, email, is_admin)
            VALUES ($1, $2, $3)
            RETURNING {ACCOUNT_COLUMNS}
            "
        ))
        .bind(&account.user_id)
        .bind(account.email.as_ref().map(EmailClaim::as_str))
        .bind(account.is_admin)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("user already exists".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        row.try_into()
    }

    async fn fetch_all(&self) -> Result<Vec<AccountRecord>, RepositoryError> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM ledger.account ORDER BY user_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AccountRecord::try_from).collect()
    }
}

impl RecordStore for PgRecordStore {
    fn get<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, Result<Option<AccountRecord>, RepositoryError>> {
        Box::pin(self.fetch(user_id))
    }

    fn set_points<'a>(
        &'a self,
        user_id: &'a UserId,
        points: Points,
    ) -> BoxFuture<'a, Result<AccountRecord, RepositoryError>> {
        Box::pin(self.update_points(user_id, points))
    }

    fn get_or_insert(
        &self,
        account: NewAccount,
    ) -> BoxFuture<'_, Result<(AccountRecord, bool), RepositoryError>> {
        Box::pin(self.upsert_missing(account))
    }

    fn insert_if_absent(
        &self,
        account: NewAccount,
    ) -> BoxFuture<'_, Result<AccountRecord, RepositoryError>> {
        Box::pin(self.insert(account))
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<AccountRecord>, RepositoryError>> {
        Box::pin(self.fetch_all())
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }
}
