//! Purchase transaction.
//!
//! The only path that mutates a balance and the fulfillment pipeline
//! together. Stages:
//!
//! ```text
//! Validating -> Authorizing -> CheckingBalance -> Debiting -> Dispatching -> Completed
//! ```
//!
//! Any stage before `Debiting` may reject. Once the debit is written the
//! transaction runs to completion: the commit half executes on its own task,
//! so a dropped request future cannot stop it between debit and dispatch.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Instrument, debug, info, instrument};

use rewards_core::{
    AccessPolicy, CallerContext, Points, PurchaseCommand, UserId, is_admin_adjustment,
};

use crate::services::fulfillment::FulfillmentSink;
use crate::services::ledger::{Ledger, LedgerError};

/// Inbound purchase request.
///
/// Every field is optional on the wire so that absent fields are reported
/// as `missing_fields` rather than as a body parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseRequest {
    pub user_id: Option<String>,
    pub item_name: Option<String>,
    pub cost: Option<i64>,
}

/// Stages of a purchase, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseStage {
    Validating,
    Authorizing,
    CheckingBalance,
    Debiting,
    Dispatching,
    Completed,
}

impl fmt::Display for PurchaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Authorizing => "authorizing",
            Self::CheckingBalance => "checking_balance",
            Self::Debiting => "debiting",
            Self::Dispatching => "dispatching",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Why a purchase did not complete.
#[derive(Debug, Error)]
pub enum PurchaseError {
    /// Required fields absent or blank.
    #[error("missing fields: {0}")]
    MissingFields(String),

    /// Cost violates the amount policy.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Caller may not spend from the target account.
    #[error("not permitted to spend from this account")]
    Unauthorized,

    /// Target account does not exist.
    #[error("user not found")]
    UserNotFound,

    /// Balance does not cover the cost.
    #[error("not enough points: have {available}, need {cost}")]
    InsufficientBalance { available: Points, cost: Points },

    /// Store failure.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    /// The commit task panicked or was shut down.
    #[error("purchase aborted: {0}")]
    Aborted(String),
}

impl From<LedgerError> for PurchaseError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UserNotFound => Self::UserNotFound,
            LedgerError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            other => Self::Ledger(other),
        }
    }
}

/// Outcome of a committed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub user_id: UserId,
    pub item: String,
    pub cost: Points,
    pub new_points: Points,
    /// Whether a fulfillment command was produced.
    pub dispatched: bool,
}

/// A request that passed validation.
#[derive(Debug, Clone)]
struct Order {
    user_id: UserId,
    item: String,
    cost: Points,
}

/// Runs purchase transactions against the ledger and a fulfillment sink.
#[derive(Clone)]
pub struct PurchaseService {
    ledger: Arc<Ledger>,
    sink: Arc<dyn FulfillmentSink>,
}

impl PurchaseService {
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, sink: Arc<dyn FulfillmentSink>) -> Self {
        Self { ledger, sink }
    }

    /// Execute a purchase on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// Returns a [`PurchaseError`] for every rejection. Rejections never
    /// change the balance or the fulfillment pipeline.
    #[instrument(skip_all, fields(caller = %caller.subject))]
    pub async fn purchase(
        &self,
        caller: &CallerContext,
        request: PurchaseRequest,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        debug!(stage = %PurchaseStage::Validating);
        let order = validate(request)?;

        debug!(stage = %PurchaseStage::Authorizing, target = %order.user_id);
        authorize(caller, &order)?;

        let ledger = Arc::clone(&self.ledger);
        let sink = Arc::clone(&self.sink);
        let outcome = tokio::spawn(commit(ledger, sink, order).in_current_span())
            .await
            .map_err(|e| PurchaseError::Aborted(e.to_string()))?;

        match &outcome {
            Ok(receipt) => info!(
                user_id = %receipt.user_id,
                item = %receipt.item,
                cost = %receipt.cost,
                new_points = %receipt.new_points,
                dispatched = receipt.dispatched,
                "purchase committed"
            ),
            Err(e) => info!(error = %e, "purchase rejected"),
        }
        outcome
    }
}

fn validate(request: PurchaseRequest) -> Result<Order, PurchaseError> {
    let user_id = request.user_id.filter(|s| !s.trim().is_empty());
    let item = request.item_name.filter(|s| !s.trim().is_empty());

    let (Some(user_id), Some(item), Some(cost)) = (user_id.as_ref(), item.as_ref(), request.cost)
    else {
        let missing: Vec<&str> = [
            ("user_id", user_id.is_none()),
            ("item_name", item.is_none()),
            ("cost", request.cost.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        return Err(PurchaseError::MissingFields(missing.join(", ")));
    };

    let user_id = UserId::parse(user_id)
        .map_err(|e| PurchaseError::MissingFields(format!("user_id: {e}")))?;

    Ok(Order {
        user_id,
        item: item.clone(),
        cost: Points::new(cost),
    })
}

fn authorize(caller: &CallerContext, order: &Order) -> Result<(), PurchaseError> {
    if !AccessPolicy::self_or_admin(caller, &order.user_id).is_allowed() {
        return Err(PurchaseError::Unauthorized);
    }

    // A negative cost is a credit, reserved for admin balance corrections.
    if order.cost.is_negative() && !(caller.is_admin && is_admin_adjustment(&order.item)) {
        return Err(PurchaseError::InvalidAmount(
            "cost cannot be negative".to_string(),
        ));
    }

    Ok(())
}

/// Balance check, debit and dispatch, under the user's lock.
async fn commit(
    ledger: Arc<Ledger>,
    sink: Arc<dyn FulfillmentSink>,
    order: Order,
) -> Result<PurchaseReceipt, PurchaseError> {
    let guard = ledger.lock(&order.user_id).await;

    debug!(stage = %PurchaseStage::CheckingBalance, user_id = %order.user_id);
    let available = ledger.points(&order.user_id).await?;
    if !available.covers(order.cost) {
        return Err(PurchaseError::InsufficientBalance {
            available,
            cost: order.cost,
        });
    }
    let new_points = available
        .checked_debit(order.cost)
        .ok_or_else(|| PurchaseError::InvalidAmount("balance overflow".to_string()))?;

    debug!(stage = %PurchaseStage::Debiting, %available, %new_points);
    ledger.write_points(&guard, new_points).await?;

    let dispatched = !is_admin_adjustment(&order.item);
    if dispatched {
        debug!(stage = %PurchaseStage::Dispatching, item = %order.item);
        sink.dispatch(PurchaseCommand::new(
            order.user_id.clone(),
            order.item.clone(),
            order.cost,
        ));
    }
    drop(guard);

    debug!(stage = %PurchaseStage::Completed);
    Ok(PurchaseReceipt {
        user_id: order.user_id,
        item: order.item,
        cost: order.cost,
        new_points,
        dispatched,
    })
}
