//! # imagegen-dl
//!
//! Backend library for automating prompt queues against chat-based
//! image-generation UIs, with rate-limit-aware retry and recovery.
//!
//! ## Design Philosophy
//!
//! imagegen-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to run events, no polling required
//! - **Surface-agnostic** - The conversation UI sits behind a trait; any
//!   browser or API adapter plugs in
//! - **Unattended-friendly** - Rate limits pause the run for minutes or hours
//!   and resume on their own; only a genuine dead end gives up on a prompt
//!
//! ## Quick Start
//!
//! ```no_run
//! use imagegen_dl::{HttpDownloadHandler, PromptRunner, RunOptions};
//! # use imagegen_dl::ChatSurface;
//! use std::sync::Arc;
//!
//! # async fn example(surface: Arc<dyn ChatSurface>) -> Result<(), Box<dyn std::error::Error>> {
//! let downloads = Arc::new(HttpDownloadHandler::new("./output")?);
//! let runner = PromptRunner::new(surface, downloads);
//!
//! // Subscribe to events
//! let mut events = runner.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let script = "\
//! ##### 00001 \"Castle Series\"
//! A castle at dawn, oil painting
//! The same castle at dusk";
//! runner.start_run(RunOptions::new(script)).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Failure artifacts and output filenames
pub mod artifacts;
/// Run configuration
pub mod config;
/// Download requests and handlers
pub mod download;
/// Error types
pub mod error;
/// Run lifecycle and orchestration
pub mod runner;
/// Prompt script parsing
pub mod script;
/// Chat surface seam
pub mod surface;
/// Wait-time extraction from rate-limit phrasing
pub mod timeparse;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{DEFAULT_PROBE_PROMPT, RunOptions};
pub use download::{DownloadHandler, DownloadRequest, HttpDownloadHandler, NoOpDownloadHandler};
pub use error::{DownloadError, Error, Result, SurfaceError};
pub use runner::PromptRunner;
pub use script::{QueueEntry, ScriptParser};
pub use surface::{ChatSurface, ChoiceAction, ChoicePrompt, ImageElement, TurnSnapshot};
pub use timeparse::{LimitGrammar, ProbeReply, TimeParser};
pub use types::{FilePrefix, GenerationOutcome, RunEvent, Severity};
