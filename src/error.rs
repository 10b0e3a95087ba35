//! Error types for the language server

use thiserror::Error;

/// Errors raised while resolving and refreshing workflow metadata.
///
/// None of these reach the editor as a failed request: cache refreshes that
/// fail keep serving the last value they had.
#[derive(Error, Debug)]
pub enum Error {
    /// Network error while downloading remote metadata
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Remote answered with a non-success status
    #[error("Request to {url} returned {status}")]
    Status { url: String, status: u16 },

    /// Local action file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Metadata document is not valid YAML
    #[error("Failed to parse action metadata: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// `uses:` value that does not name a resolvable action
    #[error("Invalid action reference: {0}")]
    InvalidAction(String),
}

/// Convenience Result type for the language server.
pub type Result<T> = std::result::Result<T, Error>;
