//! # Service Configuration
//!
//! Loaded once at startup from an optional YAML file, then overlaid with
//! environment variables, validated, and shared read-only behind an `Arc`.
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8990
//!   public_base_url: https://lsd.example.com
//! issuer:
//!   public_base_url: https://lcp.example.com
//!   username: lsd
//!   password: secret
//!   timeout_secs: 10
//! license_link_url: https://front.example.com/licenses/{license_id}
//! policy:
//!   register_enabled: true
//!   renew_enabled: true
//!   return_enabled: true
//!   max_devices: 5
//!   renew_default_days: 7
//!   renew_max_days: 60
//! localization:
//!   default_language: en
//! operator_auth:
//!   username: admin
//!   password: secret
//! database_url: postgres://lsd@localhost/lsd
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use zeroize::Zeroizing;

use lsd_issuer_client::IssuerConfig;
use lsd_state::{LinkConfig, Policy, PolicyConfig};

/// A credential read from configuration.
///
/// Zeroed on drop. `Debug` never prints the value.
#[derive(Clone, Default, Deserialize)]
#[serde(from = "String")]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wrap a credential.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the raw value.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// HTTP listener and public identity of this server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Base URL clients reach this server at; prefixes action links.
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8990,
            public_base_url: "http://localhost:8990".into(),
        }
    }
}

/// The license issuing server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IssuerSection {
    /// Base URL of the issuer; prefixes the default license link and update calls.
    pub public_base_url: String,
    /// Basic auth user for license updates. Empty disables auth.
    pub username: String,
    /// Basic auth password for license updates.
    pub password: Secret,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for IssuerSection {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8989".into(),
            username: String::new(),
            password: Secret::default(),
            timeout_secs: lsd_issuer_client::config::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Message localization.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    /// Language used when `Accept-Language` matches nothing.
    pub default_language: String,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            default_language: "en".into(),
        }
    }
}

/// Basic auth credentials guarding operator endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorAuth {
    /// Expected user name.
    pub username: String,
    /// Expected password.
    pub password: Secret,
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listener.
    pub server: ServerConfig,
    /// Issuing server.
    pub issuer: IssuerSection,
    /// Optional license link template containing `{license_id}`.
    pub license_link_url: Option<String>,
    /// Transition policy limits.
    pub policy: PolicyConfig,
    /// Message localization.
    pub localization: LocalizationConfig,
    /// Operator credentials. `None` disables operator auth.
    pub operator_auth: Option<OperatorAuth>,
    /// PostgreSQL URL. `None` selects the in-memory store.
    pub database_url: Option<Secret>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid YAML for [`AppConfig`].
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// A value is out of range or malformed.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    /// Load from `path` if given, apply environment overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document. Missing sections take their defaults.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Overlay environment variables read through `var`.
    ///
    /// Variables:
    /// - `LSD_HOST`, `LSD_PORT`, `LSD_PUBLIC_BASE_URL`
    /// - `LSD_ISSUER_URL`, `LSD_ISSUER_USERNAME`, `LSD_ISSUER_PASSWORD`, `LSD_ISSUER_TIMEOUT_SECS`
    /// - `LSD_LICENSE_LINK_URL`, `LSD_DEFAULT_LANGUAGE`
    /// - `LSD_OPERATOR_USERNAME` + `LSD_OPERATOR_PASSWORD`
    /// - `DATABASE_URL`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("LSD_HOST") {
            self.server.host = v;
        }
        if let Some(port) = var("LSD_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(v) = var("LSD_PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }
        if let Some(v) = var("LSD_ISSUER_URL") {
            self.issuer.public_base_url = v;
        }
        if let Some(v) = var("LSD_ISSUER_USERNAME") {
            self.issuer.username = v;
        }
        if let Some(v) = var("LSD_ISSUER_PASSWORD") {
            self.issuer.password = Secret::new(v);
        }
        if let Some(secs) = var("LSD_ISSUER_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.issuer.timeout_secs = secs;
        }
        if let Some(v) = var("LSD_LICENSE_LINK_URL") {
            self.license_link_url = Some(v);
        }
        if let Some(v) = var("LSD_DEFAULT_LANGUAGE") {
            self.localization.default_language = v;
        }
        if let (Some(username), Some(password)) =
            (var("LSD_OPERATOR_USERNAME"), var("LSD_OPERATOR_PASSWORD"))
        {
            self.operator_auth = Some(OperatorAuth {
                username,
                password: Secret::new(password),
            });
        }
        if let Some(v) = var("DATABASE_URL") {
            self.database_url = Some(Secret::new(v));
        }
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("server.public_base_url", &self.server.public_base_url),
            ("issuer.public_base_url", &self.issuer.public_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))?;
        }
        if self.issuer.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "issuer.timeout_secs must be at least 1".into(),
            ));
        }
        if self.policy.max_devices == 0 {
            return Err(ConfigError::Invalid(
                "policy.max_devices must be at least 1".into(),
            ));
        }
        if self.policy.renew_default_days == 0 {
            return Err(ConfigError::Invalid(
                "policy.renew_default_days must be at least 1".into(),
            ));
        }
        if self.localization.default_language.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "localization.default_language must not be empty".into(),
            ));
        }
        if let Some(auth) = &self.operator_auth {
            if auth.username.is_empty() || auth.password.expose().is_empty() {
                return Err(ConfigError::Invalid(
                    "operator_auth requires both username and password".into(),
                ));
            }
        }
        Ok(())
    }

    /// The transition policy.
    pub fn policy(&self) -> Policy {
        Policy::new(self.policy.clone())
    }

    /// Link rendering identity.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            status_base_url: self.server.public_base_url.clone(),
            issuer_base_url: self.issuer.public_base_url.clone(),
            license_link_template: self.license_link_url.clone(),
        }
    }

    /// Configuration of the issuer client.
    pub fn issuer_config(&self) -> Result<IssuerConfig, ConfigError> {
        IssuerConfig::new(
            &self.issuer.public_base_url,
            self.issuer.username.clone(),
            self.issuer.password.expose(),
            self.issuer.timeout_secs,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
server:
  port: 9000
  public_base_url: https://lsd.example.com
issuer:
  public_base_url: https://lcp.example.com
  username: lsd
  password: hunter2
license_link_url: https://front.example.com/licenses/{license_id}
policy:
  max_devices: 2
  renew_max_days: 30
operator_auth:
  username: admin
  password: opensesame
"#;

    #[test]
    fn parses_yaml_and_defaults_missing_fields() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.issuer.timeout_secs, 10);
        assert_eq!(config.issuer.password.expose(), "hunter2");
        assert_eq!(config.policy.max_devices, 2);
        assert_eq!(config.policy.renew_default_days, 7);
        assert!(config.policy.register_enabled);
        assert_eq!(config.localization.default_language, "en");
        assert!(config.database_url.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn empty_document_is_default() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config.server.port, 8990);
        assert!(config.operator_auth.is_none());
    }

    #[test]
    fn debug_never_prints_secrets() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("opensesame"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("LSD_PORT", "7000"),
            ("LSD_ISSUER_URL", "http://issuer.internal"),
            ("LSD_OPERATOR_USERNAME", "ops"),
            ("LSD_OPERATOR_PASSWORD", "pw"),
            ("DATABASE_URL", "postgres://localhost/lsd"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::from_yaml(SAMPLE).unwrap();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.issuer.public_base_url, "http://issuer.internal");
        assert_eq!(config.operator_auth.unwrap().username, "ops");
        assert_eq!(
            config.database_url.unwrap().expose(),
            "postgres://localhost/lsd"
        );
    }

    #[test]
    fn issuer_env_reaches_client_config() {
        let env: HashMap<&str, &str> = [
            ("LSD_ISSUER_URL", "http://issuer.internal:8989"),
            ("LSD_ISSUER_USERNAME", "updater"),
            ("LSD_ISSUER_PASSWORD", "s3cret"),
            ("LSD_ISSUER_TIMEOUT_SECS", "3"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::from_yaml(SAMPLE).unwrap();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        let issuer = config.issuer_config().unwrap();
        assert_eq!(issuer.base_url.as_str(), "http://issuer.internal:8989/");
        assert_eq!(issuer.username, "updater");
        assert_eq!(issuer.password.as_str(), "s3cret");
        assert_eq!(issuer.timeout_secs, 3);
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let mut config = AppConfig::default();
        config.policy.max_devices = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.issuer.public_base_url = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.issuer.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_yaml_shape_is_a_parse_error() {
        assert!(matches!(
            AppConfig::from_yaml("server: [1, 2]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn derived_component_configs() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        let links = config.link_config();
        assert_eq!(links.status_base_url, "https://lsd.example.com");
        assert_eq!(
            links.license_link_template.as_deref(),
            Some("https://front.example.com/licenses/{license_id}")
        );
        let issuer = config.issuer_config().unwrap();
        assert_eq!(issuer.username, "lsd");
        assert_eq!(config.policy().config().max_devices, 2);
    }
}
