//! Identity verification.
//!
//! [`IdentityVerifier`] is the seam to whatever validates bearer credentials.
//! The shipped implementation, [`SignedTokenVerifier`], checks compact
//! HMAC-SHA256 tokens minted by [`TokenIssuer`]:
//!
//! ```text
//! base64url(claims-json) "." base64url(hmac-sha256(secret, first-part))
//! ```
//!
//! Callers never see why a credential failed. [`IdentityAdapter`] strips the
//! optional `Bearer ` prefix, enforces the verification deadline and
//! collapses every failure into [`IdentityError::InvalidCredential`].

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use futures::future::BoxFuture;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use rewards_core::{EmailClaim, UserId};

type HmacSha256 = Hmac<Sha256>;

const BEARER_PREFIX: &str = "bearer ";
const BOOTSTRAP_SCOPE: &str = "bootstrap";

/// What a verified credential is allowed to stand for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    /// A regular user identity, backed by a ledger account.
    User,
    /// The break-glass operator.
    Bootstrap,
}

/// Identity established by a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Stable subject identifier.
    pub subject: UserId,
    /// Email-like claim, if present and well-formed.
    pub email: Option<EmailClaim>,
    /// Credential scope.
    pub scope: TokenScope,
}

/// Verifier-internal failure detail. Logged, never returned to callers.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed credential: {0}")]
    Malformed(&'static str),
    #[error("signature mismatch")]
    BadSignature,
    #[error("credential expired")]
    Expired,
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

/// The only identity failure callers can observe.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid credential")]
    InvalidCredential,
}

/// Validates a bare credential (prefix already stripped).
pub trait IdentityVerifier: Send + Sync {
    fn verify<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<VerifiedIdentity, VerifyError>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

fn mac_for(secret: &SecretString) -> Result<HmacSha256, VerifyError> {
    HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| VerifyError::Unavailable(e.to_string()))
}

/// Verifies tokens signed with the shared HMAC secret.
pub struct SignedTokenVerifier {
    secret: SecretString,
}

impl SignedTokenVerifier {
    /// Create a verifier for tokens signed with `secret`.
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn verify_now(&self, credential: &str) -> Result<VerifiedIdentity, VerifyError> {
        let (payload, signature) = credential
            .split_once('.')
            .ok_or(VerifyError::Malformed("missing signature segment"))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| VerifyError::Malformed("signature is not base64url"))?;

        let mut mac = mac_for(&self.secret)?;
        mac.update(payload.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| VerifyError::BadSignature)?;

        let claims_json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| VerifyError::Malformed("payload is not base64url"))?;
        let claims: Claims = serde_json::from_slice(&claims_json)
            .map_err(|e| VerifyError::InvalidClaims(e.to_string()))?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(VerifyError::Expired);
        }

        let subject =
            UserId::parse(&claims.sub).map_err(|e| VerifyError::InvalidClaims(e.to_string()))?;

        let email = claims.email.as_deref().and_then(|raw| {
            EmailClaim::parse(raw)
                .inspect_err(|e| debug!(error = %e, "ignoring malformed email claim"))
                .ok()
        });

        let scope = match claims.scope.as_deref() {
            None => TokenScope::User,
            Some(BOOTSTRAP_SCOPE) => TokenScope::Bootstrap,
            Some(other) => {
                return Err(VerifyError::InvalidClaims(format!("unknown scope '{other}'")));
            }
        };

        Ok(VerifiedIdentity {
            subject,
            email,
            scope,
        })
    }
}

impl IdentityVerifier for SignedTokenVerifier {
    fn verify<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<VerifiedIdentity, VerifyError>> {
        Box::pin(async move { self.verify_now(credential) })
    }
}

/// Mints tokens accepted by [`SignedTokenVerifier`] with the same secret.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: SecretString,
}

impl TokenIssuer {
    /// Create an issuer signing with `secret`.
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Issue a user credential valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::Unavailable` if the key cannot be used or
    /// `VerifyError::InvalidClaims` if `ttl` overflows the expiry timestamp.
    pub fn issue(
        &self,
        subject: &UserId,
        email: Option<&EmailClaim>,
        ttl: Duration,
    ) -> Result<String, VerifyError> {
        self.sign(subject, email, ttl, None)
    }

    /// Issue a break-glass operator credential valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Same as [`TokenIssuer::issue`].
    pub fn issue_bootstrap(&self, subject: &UserId, ttl: Duration) -> Result<String, VerifyError> {
        self.sign(subject, None, ttl, Some(BOOTSTRAP_SCOPE))
    }

    fn sign(
        &self,
        subject: &UserId,
        email: Option<&EmailClaim>,
        ttl: Duration,
        scope: Option<&str>,
    ) -> Result<String, VerifyError> {
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| VerifyError::InvalidClaims("ttl too large".to_string()))?;
        let exp = Utc::now()
            .timestamp()
            .checked_add(ttl_secs)
            .ok_or_else(|| VerifyError::InvalidClaims("ttl too large".to_string()))?;

        let claims = Claims {
            sub: subject.to_string(),
            email: email.map(|e| e.as_str().to_owned()),
            exp,
            scope: scope.map(String::from),
        };
        let json =
            serde_json::to_vec(&claims).map_err(|e| VerifyError::InvalidClaims(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = mac_for(&self.secret)?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }
}

/// Strip an optional, case-insensitive `Bearer ` prefix.
#[must_use]
pub fn strip_bearer(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.get(..BEARER_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => {
            raw.get(BEARER_PREFIX.len()..).unwrap_or_default().trim_start()
        }
        _ => raw,
    }
}

/// Uniform front door to the configured verifier.
#[derive(Clone)]
pub struct IdentityAdapter {
    verifier: Arc<dyn IdentityVerifier>,
    timeout: Duration,
}

impl IdentityAdapter {
    /// Wrap `verifier`, failing any verification that exceeds `timeout`.
    #[must_use]
    pub fn new(verifier: Arc<dyn IdentityVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    /// Verify a raw credential as received from the caller.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidCredential` for every failure: empty,
    /// malformed, expired, forged, or verifier timeout/unavailability.
    pub async fn verify(&self, raw: &str) -> Result<VerifiedIdentity, IdentityError> {
        let credential = strip_bearer(raw);
        if credential.is_empty() {
            debug!("rejecting empty credential");
            return Err(IdentityError::InvalidCredential);
        }

        match tokio::time::timeout(self.timeout, self.verifier.verify(credential)).await {
            Ok(Ok(identity)) => Ok(identity),
            Ok(Err(e)) => {
                debug!(error = %e, "credential verification failed");
                Err(IdentityError::InvalidCredential)
            }
            Err(_) => {
                debug!(timeout_ms = self.timeout.as_millis(), "credential verification timed out");
                Err(IdentityError::InvalidCredential)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KEY: &str = "n7Qx!p2Lk9#vR4tZ8wY1bM6cF3hJ0sD5";

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(SecretString::from(KEY))
    }

    fn adapter() -> IdentityAdapter {
        IdentityAdapter::new(
            Arc::new(SignedTokenVerifier::new(SecretString::from(KEY))),
            Duration::from_secs(1),
        )
    }

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc.def"), "abc.def");
        assert_eq!(strip_bearer("bearer   abc.def"), "abc.def");
        assert_eq!(strip_bearer("BEARER abc"), "abc");
        assert_eq!(strip_bearer("abc.def"), "abc.def");
        assert_eq!(strip_bearer("Bearer"), "Bearer");
        assert_eq!(strip_bearer(""), "");
    }

    #[tokio::test]
    async fn test_issued_token_verifies() {
        let email = EmailClaim::parse("u1@example.com").unwrap();
        let token = issuer()
            .issue(&uid("u1"), Some(&email), Duration::from_secs(60))
            .unwrap();

        let identity = adapter().verify(&format!("Bearer {token}")).await.unwrap();
        assert_eq!(identity.subject, uid("u1"));
        assert_eq!(identity.email, Some(email));
        assert_eq!(identity.scope, TokenScope::User);
    }

    #[tokio::test]
    async fn test_bootstrap_scope_round_trips() {
        let token = issuer()
            .issue_bootstrap(&uid("bootstrap:ops"), Duration::from_secs(60))
            .unwrap();
        let identity = adapter().verify(&token).await.unwrap();
        assert_eq!(identity.scope, TokenScope::Bootstrap);
        assert!(identity.email.is_none());
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let other = TokenIssuer::new(SecretString::from("Zr8$kP1!mQ7@wX3#nB6^vL0&tY5*cH2%"));
        let token = other.issue(&uid("u1"), None, Duration::from_secs(60)).unwrap();
        assert_eq!(
            adapter().verify(&token).await,
            Err(IdentityError::InvalidCredential)
        );
    }

    #[tokio::test]
    async fn test_expired_rejected() {
        let token = issuer().issue(&uid("u1"), None, Duration::ZERO).unwrap();
        assert_eq!(
            adapter().verify(&token).await,
            Err(IdentityError::InvalidCredential)
        );
    }

    #[tokio::test]
    async fn test_tampered_payload_rejected() {
        let token = issuer()
            .issue(&uid("u1"), None, Duration::from_secs(60))
            .unwrap();
        let (_, signature) = token.split_once('.').unwrap();
        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"root","exp":99999999999}"#);
        let forged = format!("{forged_claims}.{signature}");
        assert!(adapter().verify(&forged).await.is_err());
    }

    #[tokio::test]
    async fn test_garbage_and_empty_rejected() {
        for raw in ["", "Bearer ", "not-a-token", "a.b.c", "Bearer %%%.%%%"] {
            assert_eq!(
                adapter().verify(raw).await,
                Err(IdentityError::InvalidCredential),
                "{raw:?} should be rejected"
            );
        }
    }

    struct StalledVerifier;

    impl IdentityVerifier for StalledVerifier {
        fn verify<'a>(
            &'a self,
            _credential: &'a str,
        ) -> BoxFuture<'a, Result<VerifiedIdentity, VerifyError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(VerifyError::Unavailable("never".to_string()))
            })
        }
    }

    #[tokio::test]
    async fn test_timeout_is_invalid_credential() {
        let adapter = IdentityAdapter::new(Arc::new(StalledVerifier), Duration::from_millis(50));
        assert_eq!(
            adapter.verify("anything").await,
            Err(IdentityError::InvalidCredential)
        );
    }
}
