//! Core types for the rewards ledger.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod command;
pub mod email;
pub mod id;
pub mod points;

pub use command::{ADMIN_ADJUSTMENT, PurchaseCommand, is_admin_adjustment};
pub use email::{EmailClaim, EmailClaimError};
pub use id::{UserId, UserIdError};
pub use points::Points;
