//! Error taxonomy.
//!
//! Transport faults and exchange rejections are recovered inside a cycle.
//! Configuration faults are fatal at startup.

use std::time::Duration;
use thiserror::Error;

/// Errors from exchange calls.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Network failure, timeout or non-success HTTP status.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The exchange answered but refused the request.
    #[error("{endpoint} rejected: {reason}")]
    Rejected { endpoint: String, reason: String },

    /// The response did not have the expected shape.
    #[error("unexpected response from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },

    /// Form encoding of the request body failed.
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
}

impl ExchangeError {
    pub fn rejected(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }

    pub fn decode(endpoint: &str, detail: impl Into<String>) -> Self {
        Self::Decode {
            endpoint: endpoint.to_string(),
            detail: detail.into(),
        }
    }
}

/// Errors from the recommendation oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("oracle transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("oracle API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("oracle returned no content")]
    Empty,
}

/// Errors reading or writing the trade memory file.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("memory file is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Misconfiguration detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("API secret is not valid base64: {0}")]
    InvalidSecret(#[from] base64::DecodeError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error(transparent)]
    Load(#[from] config::ConfigError),
}
