//! Error types shared across the monitor.
//!
//! Only startup errors ever reach `main`. A [`MonitorError::FetchExhausted`]
//! is turned into a notification by the scheduler and never escapes a cycle.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error used at the fetch seam for a single failed attempt.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared `Result` alias for the crate.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("cannot verify {label} after {attempts} attempts: {url}")]
    FetchExhausted {
        label: String,
        url: String,
        attempts: u32,
    },

    #[error("invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("cannot read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("trigger server failed: {0}")]
    Server(#[source] std::io::Error),
}

impl MonitorError {
    pub fn invalid(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }
}
