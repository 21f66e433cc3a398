//! Break-glass operator login.
//!
//! A single statically configured username and argon2 password hash. A
//! successful login yields a short-lived credential with bootstrap scope;
//! requests carrying it are treated as admin but never get a ledger account.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use rewards_core::UserId;

use crate::config::BootstrapConfig;
use crate::services::identity::{TokenIssuer, VerifyError};

/// Prefix of the subject recorded for operator sessions.
pub const BOOTSTRAP_SUBJECT_PREFIX: &str = "bootstrap:";

/// Bootstrap login failures.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Wrong username or password. Which one is never revealed.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Password hashing failed.
    #[error("password hashing failed")]
    PasswordHash,

    /// Credential could not be minted.
    #[error("failed to issue credential: {0}")]
    Issue(#[from] VerifyError),

    /// Hashing task did not complete.
    #[error("password verification aborted: {0}")]
    Aborted(String),
}

/// Credential handed to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapSession {
    pub token: String,
    pub subject: UserId,
    pub expires_in: u64,
}

/// Verifies operator credentials and issues bootstrap-scoped tokens.
#[derive(Clone)]
pub struct BootstrapLogin {
    config: BootstrapConfig,
    issuer: TokenIssuer,
}

impl BootstrapLogin {
    #[must_use]
    pub const fn new(config: BootstrapConfig, issuer: TokenIssuer) -> Self {
        Self { config, issuer }
    }

    /// Check `username`/`password` and issue an operator credential.
    ///
    /// The password hash is always checked, even for an unknown username.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::InvalidCredentials` if either part is wrong.
    pub async fn login(
        &self,
        username: &str,
        password: SecretString,
    ) -> Result<BootstrapSession, BootstrapError> {
        let hash = self.config.password_hash.clone();
        let password_ok = tokio::task::spawn_blocking(move || {
            verify_password(password.expose_secret(), hash.expose_secret()).is_ok()
        })
        .await
        .map_err(|e| BootstrapError::Aborted(e.to_string()))?;

        let username_ok = constant_time_compare(username, &self.config.username);
        if !(password_ok && username_ok) {
            warn!("bootstrap login rejected");
            return Err(BootstrapError::InvalidCredentials);
        }

        let subject = UserId::parse(&format!("{BOOTSTRAP_SUBJECT_PREFIX}{}", self.config.username))
            .map_err(|e| VerifyError::InvalidClaims(e.to_string()))?;
        let token = self.issuer.issue_bootstrap(&subject, self.config.token_ttl)?;

        info!(subject = %subject, "bootstrap login succeeded");
        Ok(BootstrapSession {
            token,
            subject,
            expires_in: self.config.token_ttl.as_secs(),
        })
    }
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `BootstrapError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, BootstrapError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| BootstrapError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), BootstrapError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| BootstrapError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| BootstrapError::InvalidCredentials)
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::services::identity::{
        IdentityAdapter, IdentityVerifier, SignedTokenVerifier, TokenScope,
    };

    const KEY: &str = "n7Qx!p2Lk9#vR4tZ8wY1bM6cF3hJ0sD5";

    fn login() -> BootstrapLogin {
        let config = BootstrapConfig {
            username: "ops".to_string(),
            password_hash: SecretString::from(hash_password("correct horse battery").unwrap()),
            token_ttl: Duration::from_secs(60),
        };
        BootstrapLogin::new(config, TokenIssuer::new(SecretString::from(KEY)))
    }

    #[tokio::test]
    async fn test_login_issues_bootstrap_scoped_token() {
        let session = login()
            .login("ops", SecretString::from("correct horse battery"))
            .await
            .unwrap();
        assert_eq!(session.subject.as_str(), "bootstrap:ops");
        assert_eq!(session.expires_in, 60);

        let verifier: Arc<dyn IdentityVerifier> =
            Arc::new(SignedTokenVerifier::new(SecretString::from(KEY)));
        let identity = IdentityAdapter::new(verifier, Duration::from_secs(1))
            .verify(&session.token)
            .await
            .unwrap();
        assert_eq!(identity.scope, TokenScope::Bootstrap);
        assert_eq!(identity.subject, session.subject);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let err = login()
            .login("ops", SecretString::from("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_wrong_username_rejected() {
        let err = login()
            .login("admin", SecretString::from("correct horse battery"))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidCredentials));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("ops", "ops"));
        assert!(!constant_time_compare("ops", "opz"));
        assert!(!constant_time_compare("ops", "ops2"));
    }
}
