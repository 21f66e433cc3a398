//! Integer point balances.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A point balance or amount.
///
/// Stored as a signed integer. The ledger keeps balances non-negative by
/// policy; the type itself does not, so that a stored value that violates
/// the policy can still be read back and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Points(i64);

impl Points {
    /// An empty balance.
    pub const ZERO: Self = Self(0);

    /// Create a new amount.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Whether this balance covers `cost` (equality counts).
    #[must_use]
    pub const fn covers(self, cost: Self) -> bool {
        self.0 >= cost.0
    }

    /// Subtract `cost`, returning `None` on overflow.
    #[must_use]
    pub const fn checked_debit(self, cost: Self) -> Option<Self> {
        match self.0.checked_sub(cost.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Points {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Points> for i64 {
    fn from(points: Points) -> Self {
        points.0
    }
}
