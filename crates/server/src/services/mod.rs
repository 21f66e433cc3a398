//! Business logic services.
//!
//! - [`identity`] - bearer credential verification and minting
//! - [`ledger`] - balances, first-login account creation, per-user locking
//! - [`fulfillment`] - poll queue and broadcast sinks for purchase commands
//! - [`purchase`] - the purchase transaction
//! - [`bootstrap`] - break-glass operator login

pub mod bootstrap;
pub mod fulfillment;
pub mod identity;
pub mod ledger;
pub mod locks;
pub mod purchase;

pub use bootstrap::{BootstrapError, BootstrapLogin, BootstrapSession};
pub use fulfillment::{Broadcaster, Fulfillment, FulfillmentSink, PollQueue, QueueEmpty};
pub use identity::{
    IdentityAdapter, IdentityError, IdentityVerifier, SignedTokenVerifier, TokenIssuer, TokenScope,
    VerifiedIdentity,
};
pub use ledger::{Ledger, LedgerError};
pub use purchase::{PurchaseError, PurchaseReceipt, PurchaseRequest, PurchaseService};
