//! Live runtime configuration.
//!
//! Configuration is loaded from environment variables. The session secret is
//! redacted in Debug output.

use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default clock publisher interval in milliseconds.
pub const DEFAULT_CLOCK_INTERVAL_MS: u64 = 1000;

/// Default delay before the one-shot reload signal, in milliseconds.
pub const DEFAULT_RELOAD_DELAY_MS: u64 = 3000;

/// Default session inbox capacity.
pub const DEFAULT_INBOX_CAPACITY: usize = 200;

/// Default time a producer may wait on a full inbox before the message is dropped.
pub const DEFAULT_INBOX_SEND_TIMEOUT_MS: u64 = 50;

/// Default session identity cookie name.
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "session-name";

/// Default retention of a disconnected session's snapshot, in seconds.
pub const DEFAULT_SESSION_RETENTION_SECONDS: u64 = 30;

/// Minimum decoded length of the session secret (HMAC-SHA256 key material).
pub const MIN_SESSION_SECRET_LENGTH: usize = 32;

/// Runtime configuration for sessions, inboxes and publishers.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Interval of the clock publisher.
    pub clock_interval: Duration,

    /// One-shot delay of the reload publisher.
    pub reload_delay: Duration,

    /// Capacity of each session inbox.
    pub inbox_capacity: usize,

    /// Bounded wait on a full inbox before a message is dropped.
    pub inbox_send_timeout: Duration,

    /// Cookie key carrying the session identity.
    pub session_cookie_name: String,

    /// Base64 master secret for signing session cookies.
    /// Protected by `SecretString` to prevent accidental logging.
    pub session_secret: SecretString,

    /// How long a terminated session's snapshot stays resumable.
    pub session_retention: Duration,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("clock_interval", &self.clock_interval)
            .field("reload_delay", &self.reload_delay)
            .field("inbox_capacity", &self.inbox_capacity)
            .field("inbox_send_timeout", &self.inbox_send_timeout)
            .field("session_cookie_name", &self.session_cookie_name)
            .field("session_secret", &"[REDACTED]")
            .field("session_retention", &self.session_retention)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let session_secret = SecretString::from(
            vars.get("LIVE_SESSION_SECRET")
                .ok_or_else(|| ConfigError::MissingEnvVar("LIVE_SESSION_SECRET".to_string()))?
                .clone(),
        );
        decode_session_secret(&session_secret)?;

        let clock_interval_ms = vars
            .get("LIVE_CLOCK_INTERVAL_MS")
            .and_then(|s| s.parse().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_CLOCK_INTERVAL_MS);

        let reload_delay_ms = vars
            .get("LIVE_RELOAD_DELAY_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RELOAD_DELAY_MS);

        // A zero-capacity inbox cannot be created; reject instead of defaulting
        let inbox_capacity = match vars.get("LIVE_INBOX_CAPACITY") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "LIVE_INBOX_CAPACITY must be a positive integer, got {raw:?}"
                    )))
                }
            },
            None => DEFAULT_INBOX_CAPACITY,
        };

        let inbox_send_timeout_ms = vars
            .get("LIVE_INBOX_SEND_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_INBOX_SEND_TIMEOUT_MS);

        let session_cookie_name = vars
            .get("LIVE_SESSION_COOKIE_NAME")
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE_NAME.to_string());

        let session_retention_seconds = vars
            .get("LIVE_SESSION_RETENTION_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SESSION_RETENTION_SECONDS);

        Ok(RuntimeConfig {
            clock_interval: Duration::from_millis(clock_interval_ms),
            reload_delay: Duration::from_millis(reload_delay_ms),
            inbox_capacity,
            inbox_send_timeout: Duration::from_millis(inbox_send_timeout_ms),
            session_cookie_name,
            session_secret,
            session_retention: Duration::from_secs(session_retention_seconds),
        })
    }
}

/// Decode and validate the base64 session secret.
pub fn decode_session_secret(secret: &SecretString) -> Result<Vec<u8>, ConfigError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(secret.expose_secret())
        .map_err(|e| {
            ConfigError::InvalidValue(format!("LIVE_SESSION_SECRET is not valid base64: {e}"))
        })?;

    if bytes.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InvalidValue(format!(
            "LIVE_SESSION_SECRET must be at least {MIN_SESSION_SECRET_LENGTH} bytes, got {}",
            bytes.len()
        )));
    }

    Ok(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // 32 bytes of 'k', base64-encoded
    const TEST_SECRET: &str = "a2tra2tra2tra2tra2tra2tra2tra2tra2tra2tra2s=";

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([("LIVE_SESSION_SECRET".to_string(), TEST_SECRET.to_string())])
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_vars(&base_vars()).unwrap();

        assert_eq!(config.clock_interval, Duration::from_millis(1000));
        assert_eq!(config.reload_delay, Duration::from_millis(3000));
        assert_eq!(config.inbox_capacity, DEFAULT_INBOX_CAPACITY);
        assert_eq!(config.inbox_send_timeout, Duration::from_millis(50));
        assert_eq!(config.session_cookie_name, "session-name");
        assert_eq!(config.session_retention, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let mut vars = base_vars();
        vars.insert("LIVE_CLOCK_INTERVAL_MS".to_string(), "250".to_string());
        vars.insert("LIVE_RELOAD_DELAY_MS".to_string(), "10".to_string());
        vars.insert("LIVE_INBOX_CAPACITY".to_string(), "8".to_string());
        vars.insert("LIVE_SESSION_COOKIE_NAME".to_string(), "thermo".to_string());

        let config = RuntimeConfig::from_vars(&vars).unwrap();

        assert_eq!(config.clock_interval, Duration::from_millis(250));
        assert_eq!(config.reload_delay, Duration::from_millis(10));
        assert_eq!(config.inbox_capacity, 8);
        assert_eq!(config.session_cookie_name, "thermo");
    }

    #[test]
    fn test_missing_secret() {
        let result = RuntimeConfig::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "LIVE_SESSION_SECRET"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let vars = HashMap::from([(
            "LIVE_SESSION_SECRET".to_string(),
            "d2Vhay1zZWNyZXQ=".to_string(), // "weak-secret"
        )]);
        let result = RuntimeConfig::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_zero_inbox_capacity_rejected() {
        let mut vars = base_vars();
        vars.insert("LIVE_INBOX_CAPACITY".to_string(), "0".to_string());
        assert!(matches!(
            RuntimeConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_zero_clock_interval_falls_back() {
        let mut vars = base_vars();
        vars.insert("LIVE_CLOCK_INTERVAL_MS".to_string(), "0".to_string());
        let config = RuntimeConfig::from_vars(&vars).unwrap();
        assert_eq!(config.clock_interval, Duration::from_millis(1000));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = RuntimeConfig::from_vars(&base_vars()).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(TEST_SECRET));
    }
}
