//! Error types for imagegen-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Surface, Download)
//! - The run-lifecycle rejection for duplicate start requests
//!
//! Generation timeouts and rate limits are deliberately *not* errors: they are
//! [`GenerationOutcome`](crate::types::GenerationOutcome) values consumed by
//! the retry loop. A timeout counts as a normal failed attempt; a rate limit
//! schedules a resubmission without touching the retry budget. Only the
//! failures below cross an API boundary as `Err`.

use thiserror::Error;

/// Result type alias for imagegen-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for imagegen-dl
#[derive(Debug, Error)]
pub enum Error {
    /// A run is already active; start requests are rejected, never queued
    #[error("a run is already active")]
    RunActive,

    /// Interactive surface error
    #[error("surface error: {0}")]
    Surface(#[from] SurfaceError),

    /// Download handler error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// A grammar or directive pattern failed to compile
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

/// Errors reported by a [`ChatSurface`](crate::surface::ChatSurface) adapter
///
/// These are local, immediately-retryable failures: the orchestrator absorbs
/// them into the per-entry retry loop and they never propagate past the entry
/// boundary.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The input control or its confirmation control is missing or disabled.
    /// A pre-flight failure raised before anything was submitted.
    #[error("input surface unavailable: {reason}")]
    InputUnavailable {
        /// What the adapter could not find or use
        reason: String,
    },

    /// The surface could not be observed on this poll tick
    #[error("snapshot failed: {reason}")]
    Snapshot {
        /// Why the observation failed
        reason: String,
    },
}

/// Errors raised by a [`DownloadHandler`](crate::download::DownloadHandler)
#[derive(Debug, Error)]
pub enum DownloadError {
    /// HTTP request failed
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing the downloaded file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source URL could not be parsed or carries an unsupported scheme
    #[error("invalid source url: {reason}")]
    InvalidUrl {
        /// Why the URL was rejected
        reason: String,
    },

    /// The relative filename would escape the download directory
    #[error("unsafe filename: {filename}")]
    UnsafeFilename {
        /// The rejected relative filename
        filename: String,
    },
}
