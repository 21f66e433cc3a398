//! Ledger service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LEDGER_TOKEN_SECRET` - HMAC key for bearer credentials (min 32 chars, high entropy)
//!
//! ## Optional
//! - `LEDGER_HOST` - Bind address (default: 127.0.0.1)
//! - `LEDGER_PORT` - Listen port (default: 8000)
//! - `LEDGER_STORE` - `postgres` or `memory` (default: postgres)
//! - `LEDGER_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `LEDGER_ADMIN_EMAILS` - Comma-separated admin allow-list
//! - `LEDGER_FULFILLMENT` - `queue` or `broadcast` (default: queue)
//! - `LEDGER_BROADCAST_CAPACITY` - Per-observer lag buffer (default: 64)
//! - `LEDGER_VERIFY_TIMEOUT_MS` - Identity verification deadline (default: 2000)
//! - `LEDGER_OPEN_REGISTRATION` - Allow unauthenticated account creation (default: false)
//! - `LEDGER_DISPENSER_TOKEN` - Bearer token required on queue endpoints
//! - `LEDGER_BOOTSTRAP_USERNAME` - Break-glass operator username
//! - `LEDGER_BOOTSTRAP_PASSWORD_HASH` - Argon2 hash of the operator password
//! - `LEDGER_BOOTSTRAP_TOKEN_TTL_SECS` - Operator credential lifetime (default: 900)
//! - `LEDGER_CORS_ORIGINS` - Comma-separated allowed origins
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rewards_core::AdminAllowList;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_TOKEN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_BROADCAST_CAPACITY: usize = 64;
const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_BOOTSTRAP_TTL_SECS: u64 = 900;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Where account records live.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// `PostgreSQL` via sqlx.
    Postgres {
        /// Connection URL (contains password)
        database_url: SecretString,
    },
    /// Process-local map; contents are lost on restart.
    Memory,
}

/// How purchase commands reach the dispenser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillmentMode {
    /// Durable-for-process FIFO with poll and acknowledge.
    Queue,
    /// Fire-and-forget push to connected observers.
    Broadcast {
        /// Messages buffered per observer before it starts skipping.
        capacity: usize,
    },
}

/// Break-glass operator login.
///
/// Implements `Debug` manually to redact the password hash.
#[derive(Clone)]
pub struct BootstrapConfig {
    /// Operator username
    pub username: String,
    /// Argon2 PHC string of the operator password
    pub password_hash: SecretString,
    /// Lifetime of the credential issued on login
    pub token_ttl: Duration,
}

impl std::fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

/// Ledger service configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Account record store
    pub store: StoreBackend,
    /// HMAC key for bearer credentials
    pub token_secret: SecretString,
    /// Emails granted admin when their account is first created
    pub admin_emails: AdminAllowList,
    /// Fulfillment strategy
    pub fulfillment: FulfillmentMode,
    /// Deadline for a single identity verification
    pub verify_timeout: Duration,
    /// Whether `CreateUser` accepts unauthenticated requests
    pub open_registration: bool,
    /// Token the dispenser must present on queue endpoints
    pub dispenser_token: Option<SecretString>,
    /// Break-glass operator login, if enabled
    pub bootstrap: Option<BootstrapConfig>,
    /// Allowed CORS origins (empty disables the CORS layer)
    pub cors_origins: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the token secret fails validation (length, placeholder, entropy).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env("LEDGER_HOST", "127.0.0.1")?;
        let port = parse_env("LEDGER_PORT", "8000")?;

        let token_secret = SecretString::from(get_required_env("LEDGER_TOKEN_SECRET")?);
        validate_token_secret(&token_secret)?;

        let store = match get_env_or_default("LEDGER_STORE", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres {
                database_url: get_database_url("LEDGER_DATABASE_URL")?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "LEDGER_STORE".to_string(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };

        let fulfillment = match get_env_or_default("LEDGER_FULFILLMENT", "queue").as_str() {
            "queue" => FulfillmentMode::Queue,
            "broadcast" => FulfillmentMode::Broadcast {
                capacity: parse_env(
                    "LEDGER_BROADCAST_CAPACITY",
                    &DEFAULT_BROADCAST_CAPACITY.to_string(),
                )?,
            },
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "LEDGER_FULFILLMENT".to_string(),
                    format!("expected 'queue' or 'broadcast', got '{other}'"),
                ));
            }
        };

        let admin_emails = AdminAllowList::from_csv(&get_env_or_default("LEDGER_ADMIN_EMAILS", ""));
        let verify_timeout = Duration::from_millis(parse_env(
            "LEDGER_VERIFY_TIMEOUT_MS",
            &DEFAULT_VERIFY_TIMEOUT_MS.to_string(),
        )?);
        let open_registration = parse_env("LEDGER_OPEN_REGISTRATION", "false")?;
        let dispenser_token = get_optional_env("LEDGER_DISPENSER_TOKEN").map(SecretString::from);
        let bootstrap = BootstrapConfig::from_env()?;
        let cors_origins = get_optional_env("LEDGER_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            store,
            token_secret,
            admin_emails,
            fulfillment,
            verify_timeout,
            open_registration,
            dispenser_token,
            bootstrap,
            cors_origins,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Configuration with defaults for everything except the token secret:
    /// memory store, poll queue, no admins, no bootstrap login.
    ///
    /// The secret is not validated here; use [`LedgerConfig::from_env`] for
    /// deployments.
    #[must_use]
    pub fn with_defaults(token_secret: SecretString) -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 8000,
            store: StoreBackend::Memory,
            token_secret,
            admin_emails: AdminAllowList::default(),
            fulfillment: FulfillmentMode::Queue,
            verify_timeout: Duration::from_millis(DEFAULT_VERIFY_TIMEOUT_MS),
            open_registration: false,
            dispenser_token: None,
            bootstrap: None,
            cors_origins: Vec::new(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl BootstrapConfig {
    /// Both username and hash must be set to enable the login; one without
    /// the other is a configuration error.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let username = get_optional_env("LEDGER_BOOTSTRAP_USERNAME");
        let password_hash = get_optional_env("LEDGER_BOOTSTRAP_PASSWORD_HASH");

        match (username, password_hash) {
            (None, None) => Ok(None),
            (Some(username), Some(password_hash)) => {
                if !password_hash.starts_with("$argon2") {
                    return Err(ConfigError::InvalidEnvVar(
                        "LEDGER_BOOTSTRAP_PASSWORD_HASH".to_string(),
                        "must be an argon2 PHC string (see `rl-cli bootstrap hash-password`)"
                            .to_string(),
                    ));
                }
                let ttl_secs = parse_env(
                    "LEDGER_BOOTSTRAP_TOKEN_TTL_SECS",
                    &DEFAULT_BOOTSTRAP_TTL_SECS.to_string(),
                )?;
                Ok(Some(Self {
                    username,
                    password_hash: SecretString::from(password_hash),
                    token_ttl: Duration::from_secs(ttl_secs),
                }))
            }
            (Some(_), None) => Err(ConfigError::MissingEnvVar(
                "LEDGER_BOOTSTRAP_PASSWORD_HASH".to_string(),
            )),
            (None, Some(_)) => Err(ConfigError::MissingEnvVar(
                "LEDGER_BOOTSTRAP_USERNAME".to_string(),
            )),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_TOKEN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use `rl-cli keygen`."
            ),
        ));
    }

    Ok(())
}

/// Check a bearer-credential signing key against the placeholder
/// blocklist, the entropy floor and the minimum length.
///
/// # Errors
///
/// Returns `ConfigError::InsecureSecret` describing the first failed check.
pub fn validate_token_secret(secret: &SecretString) -> Result<(), ConfigError> {
    validate_secret_strength(secret.expose_secret(), "LEDGER_TOKEN_SECRET")?;
    validate_secret_length(secret, "LEDGER_TOKEN_SECRET")
}
