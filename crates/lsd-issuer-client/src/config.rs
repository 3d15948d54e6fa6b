//! Issuing server client configuration.
//!
//! Points at the issuer's public base URL and carries the credentials of
//! its license update endpoint. Built by the service from its layered
//! configuration, or explicitly in tests.

use url::Url;
use zeroize::Zeroizing;

/// Default per-request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration for connecting to the issuing server.
///
/// Custom `Debug` implementation redacts the `password` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct IssuerConfig {
    /// Base URL of the issuing server, e.g. `https://lcp.example.com`.
    pub base_url: Url,
    /// Basic auth user for license updates. Empty disables auth.
    pub username: String,
    /// Basic auth password for license updates.
    pub password: Zeroizing<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl IssuerConfig {
    /// Build a configuration from an explicit base URL string.
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUrl(base_url.to_string(), e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(
                base_url.to_string(),
                "not a base URL".to_string(),
            ));
        }
        if timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self {
            base_url,
            username: username.into(),
            password: Zeroizing::new(password.into()),
            timeout_secs,
        })
    }

    /// Create a configuration pointing to a local mock server (for testing).
    pub fn local_mock(port: u16) -> Result<Self, ConfigError> {
        Self::new(&format!("http://127.0.0.1:{port}"), "", "", 5)
    }

    /// Whether license updates carry Basic auth credentials.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A URL failed to parse.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    /// A zero timeout would fail every request.
    #[error("issuer timeout must be at least one second")]
    ZeroTimeout,
}
