//! Core types and events for imagegen-dl

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sequential numeric prefix for output filenames.
///
/// Renders zero-padded to at least five digits (`00001`, `00042`). Values past
/// `99999` widen naturally to six or more digits rather than wrapping or
/// truncating, so a long run keeps producing unique, sortable filenames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilePrefix(u64);

impl FilePrefix {
    /// Create a prefix from a raw counter value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Parse a prefix from a decimal digit string (as captured from a config
    /// directive). Leading zeros are accepted; returns `None` on overflow.
    pub fn from_digits(digits: &str) -> Option<Self> {
        digits.parse::<u64>().ok().map(Self)
    }

    /// The prefix for the next output file
    #[must_use]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the inner counter value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for FilePrefix {
    fn default() -> Self {
        Self(1)
    }
}

impl From<u64> for FilePrefix {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for FilePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:05}", self.0)
    }
}

/// Severity of a user-facing log event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine progress information
    Info,
    /// A step completed successfully
    Success,
    /// Recoverable problem, the run continues
    Warn,
    /// Unrecoverable problem for the current entry or run
    Error,
}

/// Terminal classification of one submission exchange.
///
/// Produced once per driver invocation and consumed immediately by the
/// orchestrator; never persisted.
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationOutcome {
    /// A generated image was found in the completed turn
    Success {
        /// URL of the accepted image
        image_url: String,
    },

    /// The surface announced a usage limit ending at a wall-clock time
    RateLimitedAbsolute {
        /// The clock-time token as captured (`"14:54"`, `"2:30 pm"`)
        time_of_day: String,
    },

    /// The turn text stated a relative cooldown duration
    RateLimitedDuration {
        /// Parsed wait, safety buffer included
        wait: Duration,
        /// The full turn text, kept for the escalation probe's re-parse
        text: String,
    },

    /// The exchange failed: text-only reply, empty reply, or timeout
    Error {
        /// The turn text or a fixed timeout/halt message
        message: String,
    },
}

/// Event emitted during an automation run
///
/// Delivered fire-and-forget over a broadcast channel; a slow or absent
/// subscriber never blocks the run loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// User-facing log line
    Log {
        /// The message text
        message: String,
        /// Display severity
        severity: Severity,
    },

    /// Live countdown display update
    Countdown {
        /// Rendered countdown text; an empty string clears the display
        text: String,
    },

    /// A queue entry resolved; the resume position moved forward
    IndexAdvanced {
        /// 1-based start index that would resume after the resolved entry
        next_index: usize,
    },

    /// A requested download finished
    DownloadFinished {
        /// Relative filename that was requested
        filename: String,
    },

    /// A requested download failed
    DownloadFailed {
        /// Relative filename that was requested
        filename: String,
        /// Handler error message
        error: String,
    },

    /// The run ended
    RunEnded {
        /// `true` when the queue walk finished; `false` when it was halted
        completed: bool,
    },
}
