//! Runtime configuration for the RSVP notifier.
//!
//! This crate is the **single source of truth** for environment resolution.
//!
//! # Contract
//! - Binaries call [`NotifierConfig::from_env`] once at startup and pass the
//!   result into constructors; never scatter `std::env::var` calls elsewhere.
//! - Missing required values fail fast with [`ConfigError::Missing`] naming
//!   the env var. The process does not start.
//! - `Debug` impls on secret-carrying structs **redact** values.
//! - Error messages reference the env var **NAME**, never the value.
//!
//! # Backend selection
//! - `GUESTS_API_URL` set -> remote HTTP store (cursor variant), which also
//!   requires `GUESTS_API_KEY`.
//! - otherwise `DATABASE_URL` is required -> Postgres store (flag variant).

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use rsvp_schemas::Recipient;

pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
pub const ENV_BRIDE_CHAT_ID: &str = "BRIDE_CHAT_ID";
pub const ENV_ADMIN_CHAT_ID: &str = "ADMIN_CHAT_ID";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_GUESTS_API_URL: &str = "GUESTS_API_URL";
pub const ENV_GUESTS_API_KEY: &str = "GUESTS_API_KEY";
pub const ENV_POLL_INTERVAL_SECS: &str = "RSVP_POLL_INTERVAL_SECS";
pub const ENV_CALL_TIMEOUT_SECS: &str = "RSVP_CALL_TIMEOUT_SECS";
pub const ENV_CURSOR_PATH: &str = "RSVP_CURSOR_PATH";
pub const ENV_MAX_DELIVERY_ATTEMPTS: &str = "RSVP_MAX_DELIVERY_ATTEMPTS";
pub const ENV_TELEGRAM_API_URL: &str = "TELEGRAM_API_URL";
pub const ENV_DAEMON_ADDR: &str = "RSVP_DAEMON_ADDR";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CURSOR_PATH: &str = "rsvp_cursor.json";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_DAEMON_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8898);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Startup configuration failure. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required env var is unset or blank.
    Missing(&'static str),
    /// An env var is present but cannot be parsed.
    Invalid { var: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(var) => {
                write!(f, "CONFIG_MISSING: required env var {var} is not set")
            }
            ConfigError::Invalid { var, reason } => {
                write!(f, "CONFIG_INVALID: env var {var}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Where guest records live. Chosen once at startup.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Direct relational access; acknowledgment is the per-row `notified` flag.
    Postgres { database_url: String },
    /// Remote guest API; new records are detected with a persisted cursor.
    RemoteApi {
        base_url: String,
        api_key: String,
        cursor_path: PathBuf,
    },
}

impl StoreBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreBackend::Postgres { .. } => "postgres",
            StoreBackend::RemoteApi { .. } => "remote_api",
        }
    }
}

impl fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Database URLs usually embed a password.
        match self {
            StoreBackend::Postgres { .. } => f
                .debug_struct("Postgres")
                .field("database_url", &"<REDACTED>")
                .finish(),
            StoreBackend::RemoteApi {
                base_url,
                cursor_path,
                ..
            } => f
                .debug_struct("RemoteApi")
                .field("base_url", base_url)
                .field("api_key", &"<REDACTED>")
                .field("cursor_path", cursor_path)
                .finish(),
        }
    }
}

/// Everything the notifier needs, resolved once at startup.
/// **Secret values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct NotifierConfig {
    pub bot_token: String,
    pub telegram_api_url: String,
    pub bride_chat_id: i64,
    pub admin_chat_id: i64,
    pub backend: StoreBackend,
    pub poll_interval: Duration,
    /// Upper bound for every single store or delivery call.
    pub call_timeout: Duration,
    /// `None` keeps head-of-line blocking; `Some(n)` skips a record after
    /// `n` failed delivery attempts.
    pub max_delivery_attempts: Option<u32>,
    pub daemon_addr: SocketAddr,
}

impl fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("bot_token", &"<REDACTED>")
            .field("telegram_api_url", &self.telegram_api_url)
            .field("bride_chat_id", &self.bride_chat_id)
            .field("admin_chat_id", &self.admin_chat_id)
            .field("backend", &self.backend)
            .field("poll_interval", &self.poll_interval)
            .field("call_timeout", &self.call_timeout)
            .field("max_delivery_attempts", &self.max_delivery_attempts)
            .field("daemon_addr", &self.daemon_addr)
            .finish()
    }
}

impl NotifierConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve through an arbitrary lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| -> Option<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let bot_token = require(ENV_BOT_TOKEN)?;
        let bride_chat_id = parse_chat_id(ENV_BRIDE_CHAT_ID, &require(ENV_BRIDE_CHAT_ID)?)?;
        let admin_chat_id = parse_chat_id(ENV_ADMIN_CHAT_ID, &require(ENV_ADMIN_CHAT_ID)?)?;

        let backend = match get(ENV_GUESTS_API_URL) {
            Some(base_url) => StoreBackend::RemoteApi {
                base_url,
                api_key: require(ENV_GUESTS_API_KEY)?,
                cursor_path: PathBuf::from(
                    get(ENV_CURSOR_PATH).unwrap_or_else(|| DEFAULT_CURSOR_PATH.to_string()),
                ),
            },
            None => StoreBackend::Postgres {
                database_url: require(ENV_DATABASE_URL)?,
            },
        };

        let poll_interval = match get(ENV_POLL_INTERVAL_SECS) {
            Some(v) => Duration::from_secs(parse_positive(ENV_POLL_INTERVAL_SECS, &v)?),
            None => DEFAULT_POLL_INTERVAL,
        };
        let call_timeout = match get(ENV_CALL_TIMEOUT_SECS) {
            Some(v) => Duration::from_secs(parse_positive(ENV_CALL_TIMEOUT_SECS, &v)?),
            None => DEFAULT_CALL_TIMEOUT,
        };
        let max_delivery_attempts = match get(ENV_MAX_DELIVERY_ATTEMPTS) {
            Some(v) => {
                let n = parse_positive(ENV_MAX_DELIVERY_ATTEMPTS, &v)?;
                Some(u32::try_from(n).map_err(|_| ConfigError::Invalid {
                    var: ENV_MAX_DELIVERY_ATTEMPTS,
                    reason: "value too large".to_string(),
                })?)
            }
            None => None,
        };
        let daemon_addr = match get(ENV_DAEMON_ADDR) {
            Some(v) => v.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                var: ENV_DAEMON_ADDR,
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(DEFAULT_DAEMON_ADDR),
        };

        Ok(Self {
            bot_token,
            telegram_api_url: get(ENV_TELEGRAM_API_URL)
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
            bride_chat_id,
            admin_chat_id,
            backend,
            poll_interval,
            call_timeout,
            max_delivery_attempts,
            daemon_addr,
        })
    }

    /// The fixed recipient set, bride first.
    pub fn recipients(&self) -> Vec<Recipient> {
        vec![
            Recipient::bride(self.bride_chat_id),
            Recipient::admin(self.admin_chat_id),
        ]
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_chat_id(var: &'static str, raw: &str) -> Result<i64, ConfigError> {
    let id = raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })?;
    if id == 0 {
        return Err(ConfigError::Invalid {
            var,
            reason: "chat id must be non-zero".to_string(),
        });
    }
    Ok(id)
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            reason: "must be > 0".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_positive_rejects_zero() {
        assert!(parse_positive("X", "0").is_err());
        assert_eq!(parse_positive("X", "7").unwrap(), 7);
    }

    #[test]
    fn negative_chat_ids_are_valid_group_ids() {
        assert_eq!(parse_chat_id("X", "-1001234").unwrap(), -1001234);
    }

    #[test]
    fn display_names_var_not_value() {
        let e = ConfigError::Missing(ENV_BOT_TOKEN);
        assert_eq!(
            e.to_string(),
            "CONFIG_MISSING: required env var BOT_TOKEN is not set"
        );
    }
}
