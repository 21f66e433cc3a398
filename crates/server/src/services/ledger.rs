//! Ledger service: point balances over the record store.
//!
//! Owns the get-or-create-on-first-auth behavior and the per-user locks
//! that make read/check/write sequences atomic within the process.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use rewards_core::{AdminAllowList, EmailClaim, Points, UserId};

use crate::db::{RecordStore, RepositoryError};
use crate::models::{AccountRecord, NewAccount};
use crate::services::locks::{UserLockGuard, UserLocks};

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No account with this id.
    #[error("user not found")]
    UserNotFound,

    /// An account with this id already exists.
    #[error("user already exists")]
    AlreadyExists,

    /// Amount violates the balance policy.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Repository/database error.
    #[error("store error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for LedgerError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::UserNotFound,
            RepositoryError::Conflict(_) => Self::AlreadyExists,
            other => Self::Repository(other),
        }
    }
}

/// Point balances keyed by user id.
pub struct Ledger {
    store: Arc<dyn RecordStore>,
    admins: AdminAllowList,
    locks: UserLocks,
}

impl Ledger {
    /// Create a ledger over `store`, granting admin at account creation to
    /// emails in `admins`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, admins: AdminAllowList) -> Self {
        Self {
            store,
            admins,
            locks: UserLocks::new(),
        }
    }

    /// The underlying record store.
    #[must_use]
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Fetch a full account.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` if absent, or a repository error.
    pub async fn account(&self, user_id: &UserId) -> Result<AccountRecord, LedgerError> {
        self.store
            .get(user_id)
            .await?
            .ok_or(LedgerError::UserNotFound)
    }

    /// Look up an account without creating it.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the store fails.
    pub async fn find(&self, user_id: &UserId) -> Result<Option<AccountRecord>, LedgerError> {
        Ok(self.store.get(user_id).await?)
    }

    /// Current balance of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` if absent, or a repository error.
    pub async fn points(&self, user_id: &UserId) -> Result<Points, LedgerError> {
        Ok(self.account(user_id).await?.points)
    }

    /// Overwrite the balance of `user_id` (admin correction).
    ///
    /// Serialized with in-flight purchases for the same user.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` for negative balances,
    /// `LedgerError::UserNotFound` if absent, or a repository error.
    #[instrument(skip(self), fields(user_id = %user_id, points = %points))]
    pub async fn set_points(
        &self,
        user_id: &UserId,
        points: Points,
    ) -> Result<AccountRecord, LedgerError> {
        if points.is_negative() {
            return Err(LedgerError::InvalidAmount(
                "points cannot be negative".to_string(),
            ));
        }

        let guard = self.lock(user_id).await;
        let record = self.write_points(&guard, points).await?;
        info!("balance overwritten");
        Ok(record)
    }

    /// Return the caller's account, creating it on first sight.
    ///
    /// A new account starts at zero points with `is_admin` taken from the
    /// allow-list at this moment. Existing accounts are returned unchanged;
    /// the admin flag is never recomputed.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the store fails.
    pub async fn get_or_create(
        &self,
        user_id: &UserId,
        email: Option<&EmailClaim>,
    ) -> Result<AccountRecord, LedgerError> {
        let account = NewAccount {
            user_id: user_id.clone(),
            email: email.cloned(),
            is_admin: self.admins.contains(email),
        };

        let (record, created) = self.store.get_or_insert(account).await?;
        if created {
            info!(user_id = %record.user_id, is_admin = record.is_admin, "account created on first authentication");
        }
        Ok(record)
    }

    /// Explicit registration: create `user_id` with zero points.
    ///
    /// `email` is the registrant's own claim when a user registers itself;
    /// the admin flag is snapshotted from it exactly as on first login.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::AlreadyExists` if the id is taken, or a
    /// repository error.
    #[instrument(skip(self, email), fields(user_id = %user_id))]
    pub async fn create_if_absent(
        &self,
        user_id: &UserId,
        email: Option<&EmailClaim>,
    ) -> Result<AccountRecord, LedgerError> {
        let record = self
            .store
            .insert_if_absent(NewAccount {
                user_id: user_id.clone(),
                email: email.cloned(),
                is_admin: self.admins.contains(email),
            })
            .await?;
        info!("account registered");
        Ok(record)
    }

    /// All accounts ordered by user id.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the store fails.
    pub async fn list(&self) -> Result<Vec<AccountRecord>, LedgerError> {
        Ok(self.store.list().await?)
    }

    /// Wait for exclusive write access to `user_id`'s balance.
    pub async fn lock(&self, user_id: &UserId) -> UserLockGuard {
        self.locks.acquire(user_id).await
    }

    /// Overwrite the balance of the user held by `guard`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` if absent, or a repository error.
    pub async fn write_points(
        &self,
        guard: &UserLockGuard,
        points: Points,
    ) -> Result<AccountRecord, LedgerError> {
        Ok(self.store.set_points(guard.user_id(), points).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryRecordStore;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn ledger(admins: &str) -> Ledger {
        Ledger::new(
            Arc::new(MemoryRecordStore::new()),
            AdminAllowList::from_csv(admins),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_snapshots_admin_flag() {
        let email = EmailClaim::parse("boss@example.com").unwrap();

        let first = ledger("boss@example.com");
        let created = first.get_or_create(&uid("b1"), Some(&email)).await.unwrap();
        assert!(created.is_admin);
        assert_eq!(created.points, Points::ZERO);
        assert_eq!(created.email.as_ref(), Some(&email));

        // Same store, allow-list no longer contains the email.
        let second = Ledger::new(Arc::clone(&first.store), AdminAllowList::default());
        let again = second.get_or_create(&uid("b1"), Some(&email)).await.unwrap();
        assert!(again.is_admin);
    }

    #[tokio::test]
    async fn test_get_or_create_without_email_is_not_admin() {
        let ledger = ledger("boss@example.com");
        let record = ledger.get_or_create(&uid("anon"), None).await.unwrap();
        assert!(!record.is_admin);
        assert!(record.email.is_none());
    }

    #[tokio::test]
    async fn test_points_missing_user() {
        let ledger = ledger("");
        assert!(matches!(
            ledger.points(&uid("ghost")).await,
            Err(LedgerError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_create_if_absent_fails_loudly_on_duplicate() {
        let ledger = ledger("");
        let record = ledger.create_if_absent(&uid("u1"), None).await.unwrap();
        assert_eq!(record.points, Points::ZERO);
        assert!(matches!(
            ledger.create_if_absent(&uid("u1"), None).await,
            Err(LedgerError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_find_does_not_create() {
        let ledger = ledger("");
        assert!(ledger.find(&uid("u1")).await.unwrap().is_none());
        assert!(ledger.list().await.unwrap().is_empty());

        ledger.create_if_absent(&uid("u1"), None).await.unwrap();
        assert!(ledger.find(&uid("u1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_self_registration_snapshots_admin_flag() {
        let ledger = ledger("boss@example.com");
        let email = EmailClaim::parse("boss@example.com").unwrap();

        let record = ledger.create_if_absent(&uid("b1"), Some(&email)).await.unwrap();
        assert!(record.is_admin);
        assert_eq!(record.email, Some(email));
    }

    #[tokio::test]
    async fn test_set_points_overwrites() {
        let ledger = ledger("");
        ledger.create_if_absent(&uid("u1"), None).await.unwrap();
        ledger.set_points(&uid("u1"), Points::new(100)).await.unwrap();
        ledger.set_points(&uid("u1"), Points::new(7)).await.unwrap();
        assert_eq!(ledger.points(&uid("u1")).await.unwrap(), Points::new(7));
    }

    #[tokio::test]
    async fn test_set_points_rejects_negative() {
        let ledger = ledger("");
        ledger.create_if_absent(&uid("u1"), None).await.unwrap();
        assert!(matches!(
            ledger.set_points(&uid("u1"), Points::new(-1)).await,
            Err(LedgerError::InvalidAmount(_))
        ));
        assert_eq!(ledger.points(&uid("u1")).await.unwrap(), Points::ZERO);
    }

    #[tokio::test]
    async fn test_set_points_unknown_user() {
        let ledger = ledger("");
        assert!(matches!(
            ledger.set_points(&uid("ghost"), Points::new(1)).await,
            Err(LedgerError::UserNotFound)
        ));
    }
}
