//! Email claim carried by a verified identity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`EmailClaim`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailClaimError {
    /// The input string is empty.
    #[error("email cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("email must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input is not shaped like `local@domain`.
    #[error("email must look like local@domain")]
    Malformed,
}

/// An email-like claim asserted by the identity provider.
///
/// The claim is kept as issued (minus surrounding whitespace). Comparisons
/// against the admin allow-list go through [`EmailClaim::normalized`], which
/// is case-insensitive.
///
/// ```
/// use rewards_core::EmailClaim;
///
/// let claim = EmailClaim::parse(" Ops@Example.com ").unwrap();
/// assert_eq!(claim.as_str(), "Ops@Example.com");
/// assert_eq!(claim.normalized(), "ops@example.com");
///
/// assert!(EmailClaim::parse("").is_err());
/// assert!(EmailClaim::parse("no-at-symbol").is_err());
/// assert!(EmailClaim::parse("@example.com").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailClaim(String);

impl EmailClaim {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse an `EmailClaim` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, longer than 254
    /// characters, or lacks a non-empty local part and domain around an `@`.
    pub fn parse(s: &str) -> Result<Self, EmailClaimError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EmailClaimError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(EmailClaimError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        match s.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
                Ok(Self(s.to_owned()))
            }
            _ => Err(EmailClaimError::Malformed),
        }
    }

    /// Returns the claim as issued.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used for allow-list membership.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for EmailClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EmailClaim {
    type Error = EmailClaimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmailClaim> for String {
    fn from(claim: EmailClaim) -> Self {
        claim.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_but_preserves_case() {
        let claim = EmailClaim::parse("  Admin@Example.COM\n").unwrap();
        assert_eq!(claim.as_str(), "Admin@Example.COM");
        assert_eq!(claim.normalized(), "admin@example.com");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(EmailClaim::parse("   "), Err(EmailClaimError::Empty));
        assert_eq!(EmailClaim::parse("user@"), Err(EmailClaimError::Malformed));
        assert_eq!(EmailClaim::parse("userexample.com"), Err(EmailClaimError::Malformed));
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            EmailClaim::parse(&long),
            Err(EmailClaimError::TooLong { .. })
        ));
    }
}
