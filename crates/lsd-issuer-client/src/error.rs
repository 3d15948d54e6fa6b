//! Issuer client error types.

/// Errors from issuing server calls.
///
/// Network failures ([`Unreachable`](Self::Unreachable),
/// [`Timeout`](Self::Timeout)) leave nothing half-applied on our side and
/// are safe for the device to retry. [`Rejected`](Self::Rejected) means the
/// issuer answered and refused the update.
#[derive(Debug, thiserror::Error)]
pub enum IssuerError {
    /// Transport failure before a response arrived.
    #[error("issuer unreachable calling {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        source: reqwest::Error,
    },
    /// No response within the configured deadline.
    #[error("issuer did not answer {endpoint} within {timeout_secs}s")]
    Timeout { endpoint: String, timeout_secs: u64 },
    /// The issuer answered with something other than 200.
    #[error("issuer {endpoint} returned {status}: {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl IssuerError {
    /// Whether the failure happened in the network, before the issuer decided.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }

    /// Remote status code, when the issuer answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
