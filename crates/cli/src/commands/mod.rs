//! Subcommand implementations.

pub mod bootstrap;
pub mod keygen;
pub mod migrate;
pub mod token;
