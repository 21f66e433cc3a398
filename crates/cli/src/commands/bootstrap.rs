//! Break-glass operator password hashing.
//!
//! ```bash
//! printf '%s' "$PASSWORD" | rl-cli bootstrap hash-password
//! ```
//!
//! The output goes into `LEDGER_BOOTSTRAP_PASSWORD_HASH`.

use std::io::BufRead;

use thiserror::Error;

use rewards_server::services::BootstrapError;
use rewards_server::services::bootstrap::hash_password;

const MIN_PASSWORD_LENGTH: usize = 12;

/// Errors that can occur while hashing.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("Failed to read password from stdin: {0}")]
    Stdin(#[from] std::io::Error),

    #[error("Password must be at least {MIN_PASSWORD_LENGTH} characters")]
    TooShort,

    #[error(transparent)]
    Hash(#[from] BootstrapError),
}

/// Read one line from `input` and return its argon2 hash.
///
/// # Errors
///
/// Returns an error if reading fails, the password is too short, or hashing
/// fails.
pub fn hash_from_reader(mut input: impl BufRead) -> Result<String, HashError> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']);

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(HashError::TooShort);
    }

    Ok(hash_password(password)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_from_reader() {
        let hash = hash_from_reader("correct horse battery\n".as_bytes()).unwrap();
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            hash_from_reader("short\n".as_bytes()),
            Err(HashError::TooShort)
        ));
    }
}
