//! Error Types
//!
//! Two layers of failure:
//! - `ServiceError`: what a vendor client reports for a single request
//! - `OrchestrationError`: what the gateway reports once retries are spent

use std::time::Duration;

/// Fault reported by a completion or search client for one request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Request timed out")]
    Timeout,
}

impl ServiceError {
    /// Classify an HTTP status + body returned by a vendor API
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            // 529 is Anthropic's "overloaded"
            429 | 529 => Self::RateLimited(format!("{}: {}", status, body)),
            401 | 403 => Self::Auth(format!("{}: {}", status, body)),
            500..=599 => Self::Transient(format!("{}: {}", status, body)),
            _ => Self::Malformed(format!("{}: {}", status, body)),
        }
    }

    /// Only rate-limit and transient faults are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transient(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() || e.is_request() {
            Self::Transient(e.to_string())
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}

/// Fault surfaced by the call gateway to the orchestration layers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Upstream completion failed after {attempts} attempt(s): {source}")]
    Upstream { attempts: u32, source: ServiceError },

    #[error("Search failed after {attempts} attempt(s): {source}")]
    Search { attempts: u32, source: ServiceError },

    #[error("Call exceeded {0:?} deadline")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

pub type Result<T, E = OrchestrationError> = std::result::Result<T, E>;
