//! Live countdown rendering and delivery
//!
//! Every blocking wait in a run (rate-limit pause, retry delay, inter-prompt
//! gap) shows a once-per-second countdown through the event channel. The
//! display is cleared with an empty update on every exit path, completed or
//! cancelled, so a stale "Next in: 3s" never outlives the wait it described.

use crate::types::RunEvent;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Which label a countdown renders with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CountdownStyle {
    /// Waiting out a rate limit
    LimitPause,
    /// Waiting before retrying a failed prompt
    Retry,
    /// Pause between queue entries
    NextPrompt,
}

/// Render one countdown frame.
///
/// Sub-second remainders round up, so a wait never displays a value below
/// what is actually left. Limit pauses can span days and cascade through
/// coarser units; the short waits stay in plain seconds.
fn render_countdown(style: CountdownStyle, remaining: Duration) -> String {
    let total_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);

    match style {
        CountdownStyle::Retry => format!("Retry in: {total_secs}s"),
        CountdownStyle::NextPrompt => format!("Next in: {total_secs}s"),
        CountdownStyle::LimitPause => {
            let days = total_secs / 86_400;
            let hours = (total_secs % 86_400) / 3600;
            let minutes = (total_secs % 3600) / 60;
            let seconds = total_secs % 60;
            if days > 0 {
                format!("Limit Pause: {days}d {hours:02}h {minutes:02}m")
            } else if hours > 0 {
                format!("Limit Pause: {hours}h {minutes:02}m {seconds:02}s")
            } else {
                format!("Limit Pause: {minutes}m {seconds:02}s")
            }
        }
    }
}

/// Wait out `total`, re-rendering the countdown every second.
///
/// Returns `true` when the wait ran to completion, `false` when it was
/// cancelled. The clearing update is sent either way.
pub(crate) async fn run_countdown(
    events: &broadcast::Sender<RunEvent>,
    cancel: &CancellationToken,
    style: CountdownStyle,
    total: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + total;
    let mut interval = tokio::time::interval_at(
        tokio::time::Instant::now() + Duration::from_secs(1),
        Duration::from_secs(1),
    );
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let completed = loop {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            break true;
        }

        events
            .send(RunEvent::Countdown {
                text: render_countdown(style, deadline - now),
            })
            .ok();

        tokio::select! {
            _ = cancel.cancelled() => break false,
            _ = interval.tick() => {}
        }
    };

    events
        .send(RunEvent::Countdown {
            text: String::new(),
        })
        .ok();

    completed
}
