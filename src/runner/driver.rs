//! Submission driver: one prompt/response exchange
//!
//! [`Driver::await_outcome`] is the poll loop that watches the surface after
//! a submission and classifies how the exchange ended. It is an explicit
//! state machine (waiting for the new turn, generating, finishing) rather
//! than nested conditionals, so the terminal conditions stay independently
//! testable. One invocation covers exactly one exchange; retries are the
//! run loop's business.

use crate::surface::{ChatSurface, ChoiceAction, ChoicePrompt, ImageElement, TurnSnapshot};
use crate::timeparse::TimeParser;
use crate::types::{GenerationOutcome, RunEvent, Severity};
use rand::Rng;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::emit_log;

/// Cadence of the observation loop
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on one exchange; generation beyond this is stuck
const HARD_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// How long the complete signal must hold before content is trusted.
/// Image fade-ins briefly flip the signal, and reading the turn mid-fade
/// sees a blurred placeholder instead of the final image.
const STABILIZATION_WINDOW: Duration = Duration::from_secs(4);

/// Smallest rendered width a generated image can plausibly have
const MIN_IMAGE_WIDTH: u32 = 100;

/// URL fragments of decoration images that are never generation output
const EXCLUDED_URL_MARKERS: &[&str] = &["avatar", "profile", "favicon"];

/// URL fragments of the hosts' image CDNs
const GENERATED_URL_MARKERS: &[&str] = &["oaiusercontent.com", "dall-e", "estuary"];

/// Accessible-description keywords marking generation output
const GENERATED_DESCRIPTION_MARKERS: &[&str] = &["generated", "dall·e", "gerada", "criada"];

pub(crate) const HARD_TIMEOUT_MESSAGE: &str = "Hard timeout of 20 minutes reached.";
pub(crate) const HALTED_MESSAGE: &str = "Automation halted by user.";
pub(crate) const EMPTY_RESPONSE_MESSAGE: &str = "Empty response or unknown error.";

/// Observation state across poll ticks
enum DriverState {
    /// No turn beyond the baseline yet
    WaitingForNewTurn,
    /// The new turn exists and is still streaming
    Generating,
    /// Complete signal showing; waiting out the stabilization window
    Finishing { stable_since: Instant },
}

/// Drives one exchange against a surface
pub(crate) struct Driver<'a> {
    pub surface: &'a dyn ChatSurface,
    pub parser: &'a TimeParser,
    pub events: &'a broadcast::Sender<RunEvent>,
    pub cancel: &'a CancellationToken,
}

impl Driver<'_> {
    /// Submit prompt text to the surface
    pub async fn submit(&self, text: &str) -> Result<(), crate::error::SurfaceError> {
        self.surface.submit_text(text).await
    }

    /// Watch the surface until the exchange started above `baseline_turns`
    /// reaches a terminal outcome.
    ///
    /// Snapshot failures are absorbed (logged, retried next tick); only the
    /// hard timeout and cancellation end the loop without a resolved turn.
    pub async fn await_outcome(&self, baseline_turns: usize) -> GenerationOutcome {
        let deadline = Instant::now() + HARD_TIMEOUT;
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut state = DriverState::WaitingForNewTurn;
        let mut banner_time: Option<String> = None;
        let mut choice_handled = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return GenerationOutcome::Error {
                        message: HALTED_MESSAGE.to_string(),
                    };
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return GenerationOutcome::Error {
                        message: HARD_TIMEOUT_MESSAGE.to_string(),
                    };
                }
                _ = interval.tick() => {}
            }

            let snapshot = match self.surface.latest_turn().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!(error = %e, "turn snapshot failed, retrying next tick");
                    continue;
                }
            };

            // The banner is page-level and can pre-empt the response
            // entirely, so it is checked on every tick
            if let Some(banner) = snapshot.rate_limit_banner.as_deref() {
                if let Some(time) = self.parser.banner_limit_time(banner) {
                    banner_time = Some(time.clone());
                    self.surface.dismiss_rate_limit_banner().await;

                    let turns = self
                        .surface
                        .completed_turns()
                        .await
                        .unwrap_or(baseline_turns);
                    if turns <= baseline_turns {
                        return GenerationOutcome::RateLimitedAbsolute { time_of_day: time };
                    }
                }
            }

            if matches!(state, DriverState::WaitingForNewTurn) {
                let turns = match self.surface.completed_turns().await {
                    Ok(turns) => turns,
                    Err(e) => {
                        debug!(error = %e, "turn count failed, retrying next tick");
                        continue;
                    }
                };
                if turns <= baseline_turns {
                    continue;
                }
                state = DriverState::Generating;
            }

            // An image-choice control pauses completion until resolved; it
            // is acted on once and the window restarts while it is visible
            if let Some(choice) = snapshot.choice_prompt {
                if !choice_handled {
                    choice_handled = true;
                    self.resolve_choice_prompt(choice).await;
                }
                state = DriverState::Generating;
                continue;
            }

            let finished = snapshot.complete_signal && !snapshot.stop_signal;
            match state {
                DriverState::Generating if finished => {
                    emit_log(
                        self.events,
                        Severity::Info,
                        "Response complete. Waiting 4s for image transitions and overlays to clear...",
                    );
                    state = DriverState::Finishing {
                        stable_since: Instant::now(),
                    };
                }
                DriverState::Finishing { .. } if !finished => {
                    state = DriverState::Generating;
                }
                DriverState::Finishing { stable_since }
                    if stable_since.elapsed() >= STABILIZATION_WINDOW =>
                {
                    return resolve_outcome(self.parser, &snapshot, banner_time);
                }
                _ => {}
            }
        }
    }

    /// Resolve a visible image-choice control: pick one of the two options
    /// at random, fall back to the skip control, or log the dead end.
    async fn resolve_choice_prompt(&self, choice: ChoicePrompt) {
        if choice.option_count >= 2 {
            let index = rand::thread_rng().gen_range(0..2);
            emit_log(
                self.events,
                Severity::Info,
                format!(
                    "Image choice prompt detected! Randomly selecting Option {}...",
                    index + 1
                ),
            );
            if self
                .surface
                .resolve_choice(ChoiceAction::Pick(index))
                .await
                .is_ok()
            {
                return;
            }
            if choice.has_skip && self.surface.resolve_choice(ChoiceAction::Skip).await.is_ok() {
                return;
            }
            emit_log(
                self.events,
                Severity::Error,
                "Image choice prompt could not be resolved.",
            );
        } else if choice.has_skip {
            if self.surface.resolve_choice(ChoiceAction::Skip).await.is_err() {
                emit_log(
                    self.events,
                    Severity::Error,
                    "Image choice prompt could not be resolved.",
                );
            }
        } else {
            emit_log(
                self.events,
                Severity::Error,
                "Image choice prompt detected but no option or skip control found.",
            );
        }
    }
}

/// Classify a stabilized turn into its terminal outcome.
///
/// An accepted image wins; otherwise the turn text (an empty turn stands in
/// as the fixed empty-response message) is read as a relative cooldown, then
/// as an absolute limit, then the banner capture (if any) stands in, and
/// only then is the text a plain error.
pub(crate) fn resolve_outcome(
    parser: &TimeParser,
    snapshot: &TurnSnapshot,
    banner_time: Option<String>,
) -> GenerationOutcome {
    if let Some(image) = select_generated_image(&snapshot.images) {
        return GenerationOutcome::Success {
            image_url: image.url.clone(),
        };
    }

    // An empty turn still walks the whole chain: a banner capture may carry
    // the real resume time even when the response itself was swallowed
    let text = snapshot.text_content.trim();
    let text = if text.is_empty() {
        EMPTY_RESPONSE_MESSAGE
    } else {
        text
    };

    if let Some(wait) = parser.relative_wait(text) {
        return GenerationOutcome::RateLimitedDuration {
            wait,
            text: text.to_string(),
        };
    }
    if let Some(time) = parser.limit_time_in_text(text) {
        return GenerationOutcome::RateLimitedAbsolute { time_of_day: time };
    }
    if let Some(time) = banner_time {
        return GenerationOutcome::RateLimitedAbsolute { time_of_day: time };
    }

    GenerationOutcome::Error {
        message: text.to_string(),
    }
}

/// Pick the generated image out of a turn's image elements.
///
/// Decoration images (avatars, icons), undersized elements, blurred
/// placeholders, and crossfade artifacts at near-zero opacity are dropped;
/// among the rest, the last element bearing a known CDN or description
/// signature wins.
pub(crate) fn select_generated_image(images: &[ImageElement]) -> Option<&ImageElement> {
    images
        .iter()
        .rev()
        .find(|image| !is_excluded(image) && is_generated(image))
}

fn is_excluded(image: &ImageElement) -> bool {
    let url = image.url.to_lowercase();
    EXCLUDED_URL_MARKERS.iter().any(|marker| url.contains(marker))
        || image.width < MIN_IMAGE_WIDTH
        || image.blurred
        || image.opacity.is_some_and(|opacity| opacity <= 0.01)
}

fn is_generated(image: &ImageElement) -> bool {
    let url = image.url.to_lowercase();
    if GENERATED_URL_MARKERS.iter().any(|marker| url.contains(marker)) {
        return true;
    }
    let description = image.description.to_lowercase();
    GENERATED_DESCRIPTION_MARKERS
        .iter()
        .any(|marker| description.contains(marker))
}
