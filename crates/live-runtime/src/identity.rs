//! Session identity cookies.
//!
//! A session's identity is a random [`SessionId`] carried in a signed cookie
//! so that it survives reconnects and page reloads:
//!
//! - **Cookie value**: `<session-uuid>.<hex HMAC-SHA256(cookie_key, session-uuid)>`
//! - **Key derivation**: `HKDF-SHA256(session_secret, salt="live-session", info="session-cookie")`
//! - **Validation**: constant-time via `ring::hmac::verify`
//!
//! A missing, malformed or forged cookie is replaced by a fresh identity.

use crate::config::{decode_session_secret, ConfigError, RuntimeConfig};
use crate::types::SessionId;

use ring::{hkdf, hmac};

const HKDF_SALT: &[u8] = b"live-session";
const HKDF_INFO: &[u8] = b"session-cookie";

/// Identity resolved for an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// The session identity to use.
    pub session_id: SessionId,
    /// `Set-Cookie` header value when a new identity was issued.
    pub set_cookie: Option<String>,
}

/// Issues and verifies session identity cookies.
pub struct SessionIdentity {
    key: hmac::Key,
    cookie_name: String,
}

impl std::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("cookie_name", &self.cookie_name)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SessionIdentity {
    /// Derive the cookie key from `secret`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if key derivation fails.
    pub fn new(secret: &[u8], cookie_name: impl Into<String>) -> Result<Self, ConfigError> {
        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_SALT).extract(secret);
        let okm = prk
            .expand(&[HKDF_INFO], hmac::HMAC_SHA256)
            .map_err(|_| ConfigError::InvalidValue("session key derivation failed".to_string()))?;

        Ok(Self {
            key: hmac::Key::from(okm),
            cookie_name: cookie_name.into(),
        })
    }

    /// Build from runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the session secret is invalid.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ConfigError> {
        let secret = decode_session_secret(&config.session_secret)?;
        Self::new(&secret, config.session_cookie_name.clone())
    }

    /// Name of the identity cookie.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Signed cookie value for `session_id`.
    #[must_use]
    pub fn sign(&self, session_id: &SessionId) -> String {
        let id = session_id.to_string();
        let tag = hmac::sign(&self.key, id.as_bytes());
        format!("{id}.{}", hex::encode(tag.as_ref()))
    }

    /// Verify a cookie value and return the identity it carries.
    #[must_use]
    pub fn verify(&self, value: &str) -> Option<SessionId> {
        let (id, tag) = value.split_once('.')?;
        let tag = hex::decode(tag).ok()?;
        hmac::verify(&self.key, id.as_bytes(), &tag).ok()?;
        id.parse().ok()
    }

    /// Issue a new identity and its signed cookie value.
    #[must_use]
    pub fn issue(&self) -> (SessionId, String) {
        let session_id = SessionId::new();
        let value = self.sign(&session_id);
        (session_id, value)
    }

    /// Resolve the identity of a request from its `Cookie` header.
    #[must_use]
    pub fn resolve(&self, cookie_header: Option<&str>) -> ResolvedIdentity {
        let existing = cookie_header
            .and_then(|header| cookie_value(header, &self.cookie_name))
            .and_then(|value| self.verify(value));

        match existing {
            Some(session_id) => ResolvedIdentity {
                session_id,
                set_cookie: None,
            },
            None => {
                let (session_id, value) = self.issue();
                ResolvedIdentity {
                    session_id,
                    set_cookie: Some(self.set_cookie_header(&value)),
                }
            }
        }
    }

    /// `Set-Cookie` header value carrying `value`.
    #[must_use]
    pub fn set_cookie_header(&self, value: &str) -> String {
        format!(
            "{}={value}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name
        )
    }
}

/// Find the value of cookie `name` in a `Cookie` header.
#[must_use]
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value.trim_matches('"'))
    })
}
