//! Rewards Core - Shared domain types for the rewards ledger.
//!
//! This crate provides the types shared by every rewards component:
//! - `server` - HTTP service owning the ledger and the fulfillment queue
//! - `cli` - Command-line tools for migrations and credential minting
//!
//! # Architecture
//!
//! The core crate contains only types and pure decision logic - no I/O, no
//! database access, no HTTP. Authorization decisions live here so they can
//! be exercised without a running server.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for user ids, email claims, point balances
//!   and purchase commands
//! - [`policy`] - Caller context, admin allow-list and the access rules

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod policy;
pub mod types;

pub use policy::*;
pub use types::*;
