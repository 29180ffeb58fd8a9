//! Run lifecycle and orchestration, split into focused submodules.
//!
//! [`PromptRunner`] is the embedding host's handle: it owns the collaborator
//! seams, the event channel, and the one-active-run rule. The actual work
//! happens on a spawned task:
//! - [`driver`] - one prompt/response exchange against the surface
//! - [`run_loop`] - the queue walk with retry, escalation, and countdowns
//! - [`countdown`] - cancellable once-per-second wait rendering

pub(crate) mod countdown;
pub(crate) mod driver;
mod run_loop;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::RunOptions;
use crate::download::DownloadHandler;
use crate::error::{Error, Result};
use crate::script::ScriptParser;
use crate::surface::ChatSurface;
use crate::timeparse::TimeParser;
use crate::types::{RunEvent, Severity};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

/// Buffer size of the event broadcast channel. A subscriber that falls more
/// than this many events behind receives `RecvError::Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// One spawned automation run
struct ActiveRun {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Drives prompt scripts against one interactive surface.
///
/// One runner owns one surface and one download side-channel for its whole
/// life; each [`start_run`](Self::start_run) walks one script against them.
/// At most one run is active at a time; a start request while a run is
/// active is rejected, never queued.
///
/// # Examples
///
/// ```no_run
/// use imagegen_dl::{NoOpDownloadHandler, PromptRunner, RunOptions};
/// # use imagegen_dl::ChatSurface;
/// # async fn example(surface: std::sync::Arc<dyn ChatSurface>) -> Result<(), Box<dyn std::error::Error>> {
/// let runner = PromptRunner::new(surface, std::sync::Arc::new(NoOpDownloadHandler));
///
/// let mut events = runner.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{event:?}");
///     }
/// });
///
/// runner.start_run(RunOptions::new("a castle at dawn\na castle at dusk")).await?;
/// # Ok(())
/// # }
/// ```
pub struct PromptRunner {
    surface: Arc<dyn ChatSurface>,
    downloads: Arc<dyn DownloadHandler>,
    event_tx: broadcast::Sender<RunEvent>,
    active: Mutex<Option<ActiveRun>>,
}

impl PromptRunner {
    /// Create a runner over a surface adapter and a download handler
    pub fn new(surface: Arc<dyn ChatSurface>, downloads: Arc<dyn DownloadHandler>) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            surface,
            downloads,
            event_tx,
            active: Mutex::new(None),
        }
    }

    /// Subscribe to run events.
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently. Events are fire-and-forget: with no subscriber they are
    /// dropped, and the run never blocks on a slow one.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }

    /// Start walking `options.script` on a background task.
    ///
    /// Returns as soon as the run is spawned; progress and the final
    /// [`RunEvent::RunEnded`] arrive through [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunActive`] when a run is already in progress, or
    /// [`Error::Pattern`] if the script/limit grammars fail to compile.
    pub async fn start_run(&self, options: RunOptions) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(run) = active.as_ref() {
            if !run.handle.is_finished() {
                tracing::warn!(surface = self.surface.name(), "start requested while a run is active");
                emit_log(
                    &self.event_tx,
                    Severity::Warn,
                    "A run is already active. Stop it before starting another.",
                );
                return Err(Error::RunActive);
            }
        }

        // Grammar compilation happens before the spawn so a pattern typo is
        // an Err here, not a dead background task
        let entries = ScriptParser::new()?.parse(&options.script);
        let parser = TimeParser::new()?;

        let cancel = CancellationToken::new();
        let context = run_loop::RunContext {
            surface: self.surface.clone(),
            downloads: self.downloads.clone(),
            events: self.event_tx.clone(),
            cancel: cancel.clone(),
            parser,
            options,
        };
        let handle = tokio::spawn(run_loop::execute_run(context, entries));

        *active = Some(ActiveRun { cancel, handle });
        Ok(())
    }

    /// Request the active run to halt.
    ///
    /// Idempotent; a no-op with no observable effect when no run is active.
    /// The run stops within one poll/countdown tick and reports
    /// `RunEnded { completed: false }`.
    pub async fn stop_run(&self) {
        let active = self.active.lock().await;
        if let Some(run) = active.as_ref() {
            if !run.handle.is_finished() {
                tracing::info!("stop requested, cancelling active run");
            }
            run.cancel.cancel();
        }
    }

    /// Whether a run is currently in progress
    pub async fn is_running(&self) -> bool {
        let active = self.active.lock().await;
        active.as_ref().is_some_and(|run| !run.handle.is_finished())
    }

    /// Halt any active run and wait for its task to finish.
    ///
    /// For graceful host teardown; after this returns no background work
    /// remains.
    pub async fn shutdown(&self) {
        let run = {
            let mut active = self.active.lock().await;
            active.take()
        };

        if let Some(run) = run {
            run.cancel.cancel();
            if let Err(e) = run.handle.await {
                tracing::error!(error = %e, "run task panicked during shutdown");
            }
        }
    }
}

/// Emit a user-facing log line through the event channel.
///
/// send() returns Err with no receivers, which is fine - the event is dropped
/// and the run continues whether or not anyone is listening.
pub(crate) fn emit_log(
    events: &broadcast::Sender<RunEvent>,
    severity: Severity,
    message: impl Into<String>,
) {
    let message = message.into();
    match severity {
        Severity::Error => tracing::error!("{message}"),
        Severity::Warn => tracing::warn!("{message}"),
        _ => tracing::info!("{message}"),
    }
    events.send(RunEvent::Log { message, severity }).ok();
}
