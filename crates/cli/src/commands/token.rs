//! Credential minting.
//!
//! Issues bearer credentials signed with `LEDGER_TOKEN_SECRET`, for local
//! testing and for service accounts that cannot reach an identity provider.
//!
//! ```bash
//! rl-cli token issue --sub u1 --email u1@example.com --ttl-secs 3600
//! ```

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use rewards_core::{EmailClaim, EmailClaimError, UserId, UserIdError};
use rewards_server::config::{ConfigError, validate_token_secret};
use rewards_server::services::TokenIssuer;
use rewards_server::services::identity::VerifyError;

/// Errors that can occur while issuing a credential.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid subject: {0}")]
    Subject(#[from] UserIdError),

    #[error("Invalid email: {0}")]
    Email(#[from] EmailClaimError),

    #[error("Signing failed: {0}")]
    Sign(#[from] VerifyError),
}

/// Mint a user credential for `sub`.
///
/// # Errors
///
/// Returns an error if the secret is missing or weak, or the claims are
/// invalid.
pub fn issue(sub: &str, email: Option<&str>, ttl_secs: u64) -> Result<String, TokenError> {
    dotenvy::dotenv().ok();

    let secret = std::env::var("LEDGER_TOKEN_SECRET")
        .map(SecretString::from)
        .map_err(|_| TokenError::MissingEnvVar("LEDGER_TOKEN_SECRET"))?;
    validate_token_secret(&secret)?;

    let subject = UserId::parse(sub)?;
    let email = email.map(EmailClaim::parse).transpose()?;

    let token = TokenIssuer::new(secret).issue(
        &subject,
        email.as_ref(),
        Duration::from_secs(ttl_secs),
    )?;
    tracing::info!(subject = %subject, ttl_secs, "Credential issued");
    Ok(token)
}
