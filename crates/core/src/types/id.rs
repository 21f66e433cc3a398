//! Opaque user identifier.
//!
//! User ids are assigned by the identity provider (the verified subject) or
//! chosen by the caller on self-service registration. The ledger never
//! interprets them beyond the constraints below.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`UserId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UserIdError {
    /// The input is empty or only whitespace.
    #[error("user id cannot be empty")]
    Empty,
    /// The input is too long.
    #[error("user id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains control characters.
    #[error("user id cannot contain control characters")]
    ControlCharacter,
}

/// A stable, opaque account identifier.
///
/// ## Constraints
///
/// - Not empty and not only whitespace
/// - At most 128 characters
/// - No control characters
///
/// ## Examples
///
/// ```
/// use rewards_core::UserId;
///
/// assert!(UserId::parse("u1").is_ok());
/// assert!(UserId::parse("kD9x2Lq0aVbN7sYt").is_ok());
///
/// assert!(UserId::parse("").is_err());
/// assert!(UserId::parse("   ").is_err());
/// assert!(UserId::parse("bad\nid").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Maximum length of a user id, matching common identity provider limits.
    pub const MAX_LENGTH: usize = 128;

    /// Parse a `UserId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is blank, longer than
    /// [`UserId::MAX_LENGTH`] characters, or contains control characters.
    pub fn parse(s: &str) -> Result<Self, UserIdError> {
        if s.trim().is_empty() {
            return Err(UserIdError::Empty);
        }

        if s.chars().count() > Self::MAX_LENGTH {
            return Err(UserIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if s.chars().any(char::is_control) {
            return Err(UserIdError::ControlCharacter);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `UserId` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for UserId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for UserId {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for UserId {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_provider_style_ids() {
        assert!(UserId::parse("u1").is_ok());
        assert!(UserId::parse("Xy7pQ2mN9aLk3zW8vB4cD1eF6gH5").is_ok());
        assert!(UserId::parse("user with spaces").is_ok());
    }

    #[test]
    fn test_parse_blank() {
        assert_eq!(UserId::parse(""), Err(UserIdError::Empty));
        assert_eq!(UserId::parse(" \t "), Err(UserIdError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = "a".repeat(UserId::MAX_LENGTH + 1);
        assert!(matches!(
            UserId::parse(&long),
            Err(UserIdError::TooLong { .. })
        ));
        assert!(UserId::parse(&"a".repeat(UserId::MAX_LENGTH)).is_ok());
    }

    #[test]
    fn test_parse_control_character() {
        assert_eq!(
            UserId::parse("abc\u{0}def"),
            Err(UserIdError::ControlCharacter)
        );
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let ok: UserId = serde_json::from_str("\"u1\"").unwrap();
        assert_eq!(ok.as_str(), "u1");
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
    }
}
