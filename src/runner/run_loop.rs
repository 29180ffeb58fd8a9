//! The queue walk: retry policy, rate-limit pauses, and escalation
//!
//! One [`execute_run`] invocation processes one parsed script from start to
//! finish on its own task. Each prompt entry goes through a retry loop that
//! treats rate limits as scheduled pauses (not failures), escalates to the
//! probe prompt when the retry budget runs out, and always advances the
//! output numbering whether the entry succeeded or failed terminally.

use crate::artifacts;
use crate::config::RunOptions;
use crate::download::{DownloadHandler, DownloadRequest};
use crate::script::{QueueEntry, prompt_count};
use crate::surface::ChatSurface;
use crate::timeparse::{ProbeReply, TimeParser};
use crate::types::{FilePrefix, GenerationOutcome, RunEvent, Severity};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::countdown::{CountdownStyle, run_countdown};
use super::driver::Driver;
use super::emit_log;

/// Output folder used until the script's first config directive
const DEFAULT_FOLDER: &str = "AI_Images";

/// Pause between entries when the configured inter-prompt delay is zero.
/// Keeps a cancellation point between entries and lets the surface settle.
const MIN_INTER_PROMPT_DELAY: Duration = Duration::from_secs(2);

/// Everything a spawned run needs, moved onto its task
pub(crate) struct RunContext {
    pub surface: Arc<dyn ChatSurface>,
    pub downloads: Arc<dyn DownloadHandler>,
    pub events: broadcast::Sender<RunEvent>,
    pub cancel: CancellationToken,
    pub parser: TimeParser,
    pub options: RunOptions,
}

/// Mutable bookkeeping for one run: dedup set, output numbering, position.
///
/// Created when the run starts and dropped when it ends; nothing here
/// outlives the task.
struct RunState {
    /// Prompt texts submitted so far this run (unsuffixed), for the
    /// continuation-suffix logic on repeats
    used_prompts: HashSet<String>,
    current_prefix: FilePrefix,
    current_folder: String,
    variation: bool,
    current_ordinal: usize,
}

impl RunState {
    fn new() -> Self {
        Self {
            used_prompts: HashSet::new(),
            current_prefix: FilePrefix::default(),
            current_folder: DEFAULT_FOLDER.to_string(),
            variation: false,
            current_ordinal: 0,
        }
    }
}

/// How one prompt entry's processing ended
enum EntryOutcome {
    /// Success or terminal failure; numbering advances either way
    Resolved,
    /// Cancellation fired; the walk stops here
    Halted,
}

/// Per-entry retry scratch, discarded when the entry resolves
struct RetryContext {
    attempt: u32,
    last_error: String,
}

impl RetryContext {
    fn new() -> Self {
        Self {
            attempt: 0,
            last_error: "Unknown error".to_string(),
        }
    }
}

/// Walk `entries` to completion or cancellation, emitting events throughout
pub(crate) async fn execute_run(ctx: RunContext, entries: Vec<QueueEntry>) {
    let total_prompts = prompt_count(&entries);
    emit_log(
        &ctx.events,
        Severity::Info,
        format!(
            "Starting automation. Found {total_prompts} prompts to process. Wait time is {}s.",
            ctx.options.inter_prompt_delay_secs
        ),
    );

    let mut state = RunState::new();
    let mut completed = true;

    for (position, entry) in entries.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            completed = false;
            break;
        }

        match entry {
            QueueEntry::ConfigDirective {
                prefix,
                folder,
                is_variation,
            } => {
                state.current_prefix = *prefix;
                state.current_folder = folder.clone();
                state.variation = *is_variation;
                // Directive chatter is noise while skipping to the resume
                // point; log again once the position catches up
                if state.current_ordinal + 1 >= ctx.options.start_index {
                    emit_log(
                        &ctx.events,
                        Severity::Info,
                        format!(
                            "Config: prefix {prefix}, folder \"{folder}\"{}",
                            if *is_variation { ", variation" } else { "" }
                        ),
                    );
                }
            }

            QueueEntry::Prompt { text, ordinal } => {
                state.current_ordinal = *ordinal;

                let repeated = !state.used_prompts.insert(text.clone());
                let submission_text = if repeated {
                    format!("{text}{}", ctx.options.continuation_suffix)
                } else {
                    text.clone()
                };

                if *ordinal < ctx.options.start_index {
                    // Resume bookkeeping: the skipped prompt still owns its
                    // slot in the dedup set and the numbering sequence
                    debug!(ordinal, "skipping prompt below the start index");
                    state.current_prefix = state.current_prefix.next();
                    continue;
                }

                if repeated {
                    emit_log(
                        &ctx.events,
                        Severity::Warn,
                        "Duplicate prompt detected. Appending the continuation suffix.",
                    );
                }

                match process_prompt(&ctx, &state, &submission_text, total_prompts).await {
                    EntryOutcome::Resolved => {}
                    EntryOutcome::Halted => {
                        completed = false;
                        break;
                    }
                }

                state.current_prefix = state.current_prefix.next();
                ctx.events
                    .send(RunEvent::IndexAdvanced {
                        next_index: ordinal + 1,
                    })
                    .ok();

                if prompts_remain(&entries[position + 1..]) {
                    let delay = if ctx.options.inter_prompt_delay_secs == 0 {
                        MIN_INTER_PROMPT_DELAY
                    } else {
                        Duration::from_secs(ctx.options.inter_prompt_delay_secs)
                    };
                    if !run_countdown(&ctx.events, &ctx.cancel, CountdownStyle::NextPrompt, delay)
                        .await
                    {
                        completed = false;
                        break;
                    }
                }
            }
        }
    }

    if completed {
        emit_log(
            &ctx.events,
            Severity::Success,
            format!("Automation completed. Processed {total_prompts} prompts."),
        );
    } else {
        emit_log(&ctx.events, Severity::Error, "Automation halted by user.");
    }

    ctx.events
        .send(RunEvent::Countdown {
            text: String::new(),
        })
        .ok();
    ctx.events.send(RunEvent::RunEnded { completed }).ok();
}

/// Any prompt entry left in the remainder of the script
fn prompts_remain(rest: &[QueueEntry]) -> bool {
    rest.iter()
        .any(|entry| matches!(entry, QueueEntry::Prompt { .. }))
}

/// Process one prompt through the retry/escalation loop.
///
/// Rate limits pause and resubmit without touching the attempt counter;
/// errors consume the retry budget; exhausting it triggers the escalation
/// probe. Success and terminal failure both resolve the entry.
async fn process_prompt(
    ctx: &RunContext,
    state: &RunState,
    text: &str,
    total_prompts: usize,
) -> EntryOutcome {
    let driver = Driver {
        surface: ctx.surface.as_ref(),
        parser: &ctx.parser,
        events: &ctx.events,
        cancel: &ctx.cancel,
    };
    let mut retry = RetryContext::new();
    let prefix = state.current_prefix;
    let folder = &state.current_folder;

    emit_log(
        &ctx.events,
        Severity::Info,
        format!(
            "Processing prompt {}/{total_prompts} for image [{prefix}] of project [{folder}]{}...",
            state.current_ordinal,
            if state.variation { " (variation)" } else { "" }
        ),
    );

    loop {
        if ctx.cancel.is_cancelled() {
            return EntryOutcome::Halted;
        }

        if retry.attempt > ctx.options.max_retries {
            match escalate(ctx, &driver, state, &mut retry).await {
                EscalationOutcome::RetryBudgetReset => continue,
                EscalationOutcome::TerminalFailure => {
                    fail_terminally(ctx, state, text, &retry.last_error);
                    return EntryOutcome::Resolved;
                }
                EscalationOutcome::Halted => return EntryOutcome::Halted,
            }
        }

        if retry.attempt > 0 {
            emit_log(
                &ctx.events,
                Severity::Warn,
                format!(
                    "Retry {}/{} for prompt [{prefix}] in {}s...",
                    retry.attempt, ctx.options.max_retries, ctx.options.retry_delay_secs
                ),
            );
            let delay = Duration::from_secs(ctx.options.retry_delay_secs);
            if !run_countdown(&ctx.events, &ctx.cancel, CountdownStyle::Retry, delay).await {
                return EntryOutcome::Halted;
            }
        }

        let baseline = match ctx.surface.completed_turns().await {
            Ok(count) => count,
            Err(e) => {
                retry.last_error = e.to_string();
                emit_log(
                    &ctx.events,
                    Severity::Warn,
                    format!("Could not observe the surface: {e}"),
                );
                retry.attempt += 1;
                continue;
            }
        };

        if let Err(e) = driver.submit(text).await {
            retry.last_error = e.to_string();
            emit_log(&ctx.events, Severity::Warn, format!("Submission failed: {e}"));
            retry.attempt += 1;
            continue;
        }

        let outcome = driver.await_outcome(baseline).await;
        if ctx.cancel.is_cancelled() {
            return EntryOutcome::Halted;
        }

        match outcome {
            GenerationOutcome::Success { image_url } => {
                emit_log(
                    &ctx.events,
                    Severity::Success,
                    format!("Image [{prefix}] of project [{folder}] generated. Requesting download..."),
                );
                spawn_download(ctx, image_url, artifacts::image_filename(folder, prefix));
                return EntryOutcome::Resolved;
            }

            GenerationOutcome::RateLimitedDuration { wait, .. } => {
                emit_log(
                    &ctx.events,
                    Severity::Warn,
                    format!(
                        "Rate limit text detected! Waiting for {} min pause (includes 5m buffer)...",
                        wait.as_secs() / 60
                    ),
                );
                if !run_countdown(&ctx.events, &ctx.cancel, CountdownStyle::LimitPause, wait).await
                {
                    return EntryOutcome::Halted;
                }
                // Resubmit without touching the attempt counter
            }

            GenerationOutcome::RateLimitedAbsolute { time_of_day } => {
                let wait = ctx
                    .parser
                    .absolute_wait(&time_of_day, chrono::Local::now().naive_local());
                emit_log(
                    &ctx.events,
                    Severity::Warn,
                    format!(
                        "Absolute rate limit reached! Waiting until ~10 minutes after {time_of_day} ({} min pause)...",
                        wait.as_secs() / 60
                    ),
                );
                if !run_countdown(&ctx.events, &ctx.cancel, CountdownStyle::LimitPause, wait).await
                {
                    return EntryOutcome::Halted;
                }
            }

            GenerationOutcome::Error { message } => {
                retry.last_error = message;
                retry.attempt += 1;
                emit_log(
                    &ctx.events,
                    Severity::Warn,
                    format!(
                        "Generation failed on attempt {}: {}",
                        retry.attempt, retry.last_error
                    ),
                );
            }
        }
    }
}

/// What the escalation probe decided
enum EscalationOutcome {
    /// The surface stated a cooldown; it was waited out and the retry budget
    /// is fresh again
    RetryBudgetReset,
    /// No usable wait time; the entry fails for good
    TerminalFailure,
    Halted,
}

/// Ask the surface itself whether the repeated failures are a usage limit.
///
/// The probe instructs the surface to answer `DD:HH:MM` or `NO`; anything
/// else (including a probe that itself fails to submit) means the failures
/// are real and the entry is done.
async fn escalate(
    ctx: &RunContext,
    driver: &Driver<'_>,
    state: &RunState,
    retry: &mut RetryContext,
) -> EscalationOutcome {
    emit_log(
        &ctx.events,
        Severity::Warn,
        format!(
            "All {} retries exhausted for prompt [{}]. Asking the surface about its limit...",
            ctx.options.max_retries, state.current_prefix
        ),
    );

    let baseline = match ctx.surface.completed_turns().await {
        Ok(count) => count,
        Err(e) => {
            retry.last_error = e.to_string();
            return EscalationOutcome::TerminalFailure;
        }
    };
    if let Err(e) = driver.submit(&ctx.options.probe_prompt).await {
        retry.last_error = e.to_string();
        return EscalationOutcome::TerminalFailure;
    }

    let outcome = driver.await_outcome(baseline).await;
    if ctx.cancel.is_cancelled() {
        return EscalationOutcome::Halted;
    }

    // The probe's answer is plain text, so it reaches us classified as an
    // error or as a relative limit whose raw text we kept
    let reply = match outcome {
        GenerationOutcome::Error { message } => message,
        GenerationOutcome::RateLimitedDuration { text, .. } => text,
        GenerationOutcome::Success { .. } | GenerationOutcome::RateLimitedAbsolute { .. } => {
            emit_log(
                &ctx.events,
                Severity::Error,
                "Probe reply carried no parsable text.",
            );
            return EscalationOutcome::TerminalFailure;
        }
    };

    match ctx.parser.probe_reply(&reply) {
        ProbeReply::Wait(wait) => {
            emit_log(
                &ctx.events,
                Severity::Warn,
                format!(
                    "Surface reported a cooldown. Waiting for {} min pause (includes 5m buffer)...",
                    wait.as_secs() / 60
                ),
            );
            if !run_countdown(&ctx.events, &ctx.cancel, CountdownStyle::LimitPause, wait).await {
                return EscalationOutcome::Halted;
            }
            retry.attempt = 0;
            EscalationOutcome::RetryBudgetReset
        }
        ProbeReply::NotLimited => {
            emit_log(
                &ctx.events,
                Severity::Error,
                "Surface reports no usage limit; the failures are permanent.",
            );
            EscalationOutcome::TerminalFailure
        }
        ProbeReply::Unrecognized => {
            emit_log(
                &ctx.events,
                Severity::Error,
                "Probe reply did not contain a usable wait time.",
            );
            EscalationOutcome::TerminalFailure
        }
    }
}

/// Emit the terminal-failure artifacts into the entry's output slot
fn fail_terminally(ctx: &RunContext, state: &RunState, text: &str, last_error: &str) {
    let prefix = state.current_prefix;
    let folder = &state.current_folder;

    emit_log(
        &ctx.events,
        Severity::Error,
        format!("Prompt [{prefix}] of project [{folder}] failed permanently: {last_error}"),
    );

    spawn_download(
        ctx,
        artifacts::error_card_data_url(prefix, folder, text, last_error),
        artifacts::error_card_filename(folder, prefix),
    );
    spawn_download(
        ctx,
        artifacts::error_log_data_url(prefix, folder, text, last_error),
        artifacts::error_log_filename(folder, prefix),
    );
}

/// Fire-and-forget download request; the outcome comes back as an event
fn spawn_download(ctx: &RunContext, url: String, filename: String) {
    let downloads = ctx.downloads.clone();
    let events = ctx.events.clone();

    tokio::spawn(async move {
        match downloads
            .request(DownloadRequest {
                url,
                relative_filename: filename.clone(),
            })
            .await
        {
            Ok(()) => {
                events.send(RunEvent::DownloadFinished { filename }).ok();
            }
            Err(e) => {
                tracing::warn!(filename, error = %e, "download request failed");
                events
                    .send(RunEvent::DownloadFailed {
                        filename,
                        error: e.to_string(),
                    })
                    .ok();
            }
        }
    });
}
