//! Domain models for the ledger service.

pub mod account;

pub use account::{AccountRecord, AccountSummary, NewAccount};
