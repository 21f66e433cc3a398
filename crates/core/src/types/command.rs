//! Purchase commands consumed by the external dispenser.

use serde::{Deserialize, Serialize};

use super::{Points, UserId};

/// Item name marking a balance correction rather than a real purchase.
///
/// Transactions with this item never produce a fulfillment command.
pub const ADMIN_ADJUSTMENT: &str = "ADMIN_ADJUSTMENT";

/// One paid-for purchase awaiting fulfillment.
///
/// `cost` is the amount that was already debited when the command was
/// produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCommand {
    /// Account that paid.
    pub user: UserId,
    /// Free-form item label.
    pub item: String,
    /// Points debited for this purchase.
    pub cost: Points,
}

impl PurchaseCommand {
    /// Create a new command.
    #[must_use]
    pub const fn new(user: UserId, item: String, cost: Points) -> Self {
        Self { user, item, cost }
    }
}

/// Whether an item name denotes an administrative balance adjustment.
#[must_use]
pub fn is_admin_adjustment(item: &str) -> bool {
    item == ADMIN_ADJUSTMENT
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let cmd = PurchaseCommand::new(UserId::parse("u1").unwrap(), "soda".into(), Points::new(50));
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json, serde_json::json!({"user": "u1", "item": "soda", "cost": 50}));
    }

    #[test]
    fn test_sentinel_is_exact_match() {
        assert!(is_admin_adjustment("ADMIN_ADJUSTMENT"));
        assert!(!is_admin_adjustment("admin_adjustment"));
        assert!(!is_admin_adjustment("ADMIN_ADJUSTMENT "));
    }
}
