//! Signing key generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use secrecy::SecretString;

use rewards_server::config::{ConfigError, validate_token_secret};

const KEY_BYTES: usize = 32;
const MAX_ATTEMPTS: usize = 16;

/// Generate a random key that passes `LEDGER_TOKEN_SECRET` validation.
///
/// # Errors
///
/// Returns the last validation error if no candidate passed.
pub fn generate() -> Result<String, ConfigError> {
    let mut rng = rand::rng();
    let mut last_err = None;

    for _ in 0..MAX_ATTEMPTS {
        let mut bytes = [0u8; KEY_BYTES];
        rng.fill_bytes(&mut bytes);
        let candidate = URL_SAFE_NO_PAD.encode(bytes);

        // Random output can still spell a blocklisted word; draw again.
        match validate_token_secret(&SecretString::from(candidate.clone())) {
            Ok(()) => return Ok(candidate),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        ConfigError::InsecureSecret("LEDGER_TOKEN_SECRET".to_string(), "no candidate".to_string())
    }))
}
