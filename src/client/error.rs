//! Answer client error types

use thiserror::Error;

/// Failure to complete an exchange with the answer endpoint
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AskError {
    pub kind: AskErrorKind,
    pub message: String,
}

impl AskError {
    pub fn new(kind: AskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AskErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(AskErrorKind::Timeout, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(AskErrorKind::Decode, message)
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else if e.is_decode() {
            Self::decode(format!("Failed to parse response: {e}"))
        } else {
            Self::network(format!("Request failed: {e}"))
        }
    }
}

/// What went wrong on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskErrorKind {
    /// Connection refused, reset, DNS failure
    Network,
    /// Configured request timeout elapsed
    Timeout,
    /// 2xx response whose body is not a reply
    Decode,
}
