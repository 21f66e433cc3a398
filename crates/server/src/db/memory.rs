//! In-process account store.
//!
//! Used by tests and single-process demos (`LEDGER_STORE=memory`). Contents
//! are lost when the process exits.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use rewards_core::{Points, UserId};

use super::{RecordStore, RepositoryError};
use crate::models::{AccountRecord, NewAccount};

/// Account store held in a `BTreeMap` (ordered, so `list` is by user id).
#[derive(Default)]
pub struct MemoryRecordStore {
    accounts: RwLock<BTreeMap<UserId, AccountRecord>>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn materialize(account: NewAccount) -> AccountRecord {
    let now = Utc::now();
    AccountRecord {
        user_id: account.user_id,
        email: account.email,
        points: Points::ZERO,
        is_admin: account.is_admin,
        created_at: now,
        updated_at: now,
    }
}

impl RecordStore for MemoryRecordStore {
    fn get<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, Result<Option<AccountRecord>, RepositoryError>> {
        Box::pin(async move { Ok(self.accounts.read().await.get(user_id).cloned()) })
    }

    fn set_points<'a>(
        &'a self,
        user_id: &'a UserId,
        points: Points,
    ) -> BoxFuture<'a, Result<AccountRecord, RepositoryError>> {
        Box::pin(async move {
            let mut accounts = self.accounts.write().await;
            let record = accounts.get_mut(user_id).ok_or(RepositoryError::NotFound)?;
            record.points = points;
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
    }

    fn get_or_insert(
        &self,
        account: NewAccount,
    ) -> BoxFuture<'_, Result<(AccountRecord, bool), RepositoryError>> {
        Box::pin(async move {
            let mut accounts = self.accounts.write().await;
            match accounts.entry(account.user_id.clone()) {
                Entry::Occupied(existing) => Ok((existing.get().clone(), false)),
                Entry::Vacant(slot) => Ok((slot.insert(materialize(account)).clone(), true)),
            }
        })
    }

    fn insert_if_absent(
        &self,
        account: NewAccount,
    ) -> BoxFuture<'_, Result<AccountRecord, RepositoryError>> {
        Box::pin(async move {
            let mut accounts = self.accounts.write().await;
            match accounts.entry(account.user_id.clone()) {
                Entry::Occupied(_) => Err(RepositoryError::Conflict(
                    "user already exists".to_owned(),
                )),
                Entry::Vacant(slot) => Ok(slot.insert(materialize(account)).clone()),
            }
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<AccountRecord>, RepositoryError>> {
        Box::pin(async move { Ok(self.accounts.read().await.values().cloned().collect()) })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_account(id: &str, is_admin: bool) -> NewAccount {
        NewAccount {
            user_id: UserId::parse(id).unwrap(),
            email: None,
            is_admin,
        }
    }

    #[tokio::test]
    async fn test_get_or_insert_returns_existing_unchanged() {
        let store = MemoryRecordStore::new();
        let (first, created) = store.get_or_insert(new_account("u1", true)).await.unwrap();
        assert!(created);
        assert!(first.is_admin);
        assert_eq!(first.points, Points::ZERO);

        // A second call with a different admin bit must not overwrite.
        let (second, created) = store.get_or_insert(new_account("u1", false)).await.unwrap();
        assert!(!created);
        assert!(second.is_admin);
    }

    #[tokio::test]
    async fn test_insert_if_absent_conflicts() {
        let store = MemoryRecordStore::new();
        store.insert_if_absent(new_account("u1", false)).await.unwrap();
        let err = store
            .insert_if_absent(new_account("u1", false))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_set_points_missing_account() {
        let store = MemoryRecordStore::new();
        let id = UserId::parse("ghost").unwrap();
        let err = store.set_points(&id, Points::new(5)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let store = MemoryRecordStore::new();
        for id in ["charlie", "alpha", "bravo"] {
            store.insert_if_absent(new_account(id, false)).await.unwrap();
        }
        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.user_id.into_inner())
            .collect();
        assert_eq!(ids, ["alpha", "bravo", "charlie"]);
    }
}
