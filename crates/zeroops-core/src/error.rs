//! Error taxonomy shared by every ZeroOps crate.
//!
//! Four families: validation (rejected input), not-found (absent note, date,
//! schedule), I/O (filesystem or network), and upstream (the automation
//! engine answered, but not with success). Nothing here retries.

use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error ({op} {}): {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Unexpected status: {status}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    /// Wrap a filesystem error with the operation and path that produced it.
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidSchedule(_))
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamStatus { .. })
    }
}
