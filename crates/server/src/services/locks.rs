//! Per-user mutual exclusion.
//!
//! Balance writes are read-modify-write sequences against a store that only
//! offers plain get/set. Holding a [`UserLockGuard`] across the sequence
//! serializes concurrent writers for the same user inside this process.
//! Different users never contend.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use rewards_core::UserId;

/// One user's lock plus the number of holders and waiters registered on it.
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    registered: usize,
}

/// Registry of per-user async locks.
///
/// Entries exist only while someone holds or awaits the lock.
#[derive(Clone, Default)]
pub struct UserLocks {
    slots: Arc<Mutex<HashMap<UserId, Slot>>>,
}

/// Claim on a registry entry, released on drop.
///
/// Lives across the wait as well as the hold, so a waiter whose future is
/// dropped before it gets the lock still gives its entry back.
struct Registration {
    user_id: UserId,
    locks: UserLocks,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut slots = self.locks.slots();
        if let Some(slot) = slots.get_mut(&self.user_id) {
            slot.registered = slot.registered.saturating_sub(1);
            if slot.registered == 0 {
                slots.remove(&self.user_id);
            }
        }
    }
}

/// Exclusive access to one user's balance. Released on drop.
pub struct UserLockGuard {
    // Field order matters: the lock is released before the registration.
    _guard: OwnedMutexGuard<()>,
    registration: Registration,
}

impl UserLocks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<UserId, Slot>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, user_id: &UserId) -> (Arc<AsyncMutex<()>>, Registration) {
        let lock = match self.slots().entry(user_id.clone()) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                slot.registered += 1;
                Arc::clone(&slot.lock)
            }
            Entry::Vacant(entry) => {
                let lock = Arc::new(AsyncMutex::new(()));
                entry.insert(Slot {
                    lock: Arc::clone(&lock),
                    registered: 1,
                });
                lock
            }
        };

        let registration = Registration {
            user_id: user_id.clone(),
            locks: self.clone(),
        };
        (lock, registration)
    }

    /// Wait for exclusive access to `user_id`.
    ///
    /// Cancel-safe: dropping the returned future while it waits leaves no
    /// entry behind.
    pub async fn acquire(&self, user_id: &UserId) -> UserLockGuard {
        let (lock, registration) = self.register(user_id);
        let guard = lock.lock_owned().await;

        UserLockGuard {
            _guard: guard,
            registration,
        }
    }

    /// Number of users with a live lock entry.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.slots().len()
    }
}

impl UserLockGuard {
    /// The user this guard protects.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.registration.user_id
    }
}
