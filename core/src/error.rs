//! Error types for eval-fleet-core

use std::path::PathBuf;

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (caught before any process is started)
    #[error("configuration error: {0}")]
    Config(String),

    /// A candidate server port is already bound
    #[error("port {0} is already in use; choose a different base_port or free the port")]
    PortInUse(u16),

    /// A server never answered its health endpoint within the retry budget
    #[error("server at {url} failed to become healthy after {attempts} attempts")]
    Unhealthy {
        /// Health endpoint that was polled
        url: String,
        /// Number of probes issued before giving up
        attempts: u32,
    },

    /// A child process could not be launched
    #[error("failed to launch subprocess: {0}")]
    Spawn(#[source] std::io::Error),

    /// A settings or catalog file did not parse as the expected JSON
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying parse error
        source: serde_json::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
