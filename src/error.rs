//! Error types for the update engine.
//!
//! Every fatal error propagates to the orchestrator's run boundary and
//! terminates the batch; nothing is retried automatically. "No release
//! found" is not an error and is modelled as `Option::None` by the
//! release client.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can abort an update run.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The release feed could not be reached or returned a non-success
    /// status.
    #[error("release feed unavailable: {0}")]
    FeedUnavailable(String),

    /// The release feed responded but the payload could not be decoded.
    #[error("release feed returned malformed data: {0}")]
    FeedMalformed(String),

    /// A download stream failed partway through.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// A downloaded archive could not be extracted.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// Persisted configuration could not be read or written.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// File system error outside the config store.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
