//! Account domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use rewards_core::{EmailClaim, Points, UserId};

/// A ledger account (domain type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Account id (the verified subject for identity-created accounts).
    pub user_id: UserId,
    /// Email claim captured at creation, if any.
    pub email: Option<EmailClaim>,
    /// Current balance.
    pub points: Points,
    /// Admin flag snapshotted at creation; never recomputed.
    pub is_admin: bool,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last written.
    pub updated_at: DateTime<Utc>,
}

/// Values for a freshly created account. Balance always starts at zero.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: UserId,
    pub email: Option<EmailClaim>,
    pub is_admin: bool,
}

/// Public view of an account as returned by the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub user_id: UserId,
    pub email: Option<EmailClaim>,
    pub points: Points,
    pub is_admin: bool,
}

impl From<AccountRecord> for AccountSummary {
    fn from(record: AccountRecord) -> Self {
        Self {
            user_id: record.user_id,
            email: record.email,
            points: record.points,
            is_admin: record.is_admin,
        }
    }
}
