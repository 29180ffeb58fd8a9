//! Shared test helpers: a scripted surface and a recording download handler.

use crate::download::{DownloadHandler, DownloadRequest};
use crate::error::{DownloadError, SurfaceError};
use crate::surface::{ChatSurface, ChoiceAction, TurnSnapshot};
use crate::types::RunEvent;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// One scripted prompt/response exchange.
///
/// After a submission consumes the exchange, `latest_turn` serves `frames`
/// in order, repeating the last one forever. The turn counter advances on
/// submission unless `completes_turn` is false (for banner-before-any-turn
/// scenarios).
#[derive(Clone)]
pub(crate) struct Exchange {
    pub frames: Vec<TurnSnapshot>,
    pub completes_turn: bool,
}

impl Exchange {
    pub fn new(frames: Vec<TurnSnapshot>) -> Self {
        Self {
            frames,
            completes_turn: true,
        }
    }

    /// An exchange that immediately completes with a generated image
    pub fn image(url: &str) -> Self {
        Self::new(vec![complete_frame_with_image(url)])
    }

    /// An exchange that immediately completes with text only
    pub fn text(text: &str) -> Self {
        Self::new(vec![complete_text_frame(text)])
    }
}

struct MockSurfaceState {
    exchanges: VecDeque<Exchange>,
    current: Option<Exchange>,
    frame_index: usize,
    turns: usize,
    submissions: Vec<String>,
    banner_dismissals: usize,
    choices: Vec<ChoiceAction>,
    failing_submissions: usize,
}

/// Scripted [`ChatSurface`]: each submission consumes the next exchange.
///
/// With no exchange left, a submission fails like a missing input control.
pub(crate) struct MockSurface {
    state: Mutex<MockSurfaceState>,
}

impl MockSurface {
    pub fn new(exchanges: Vec<Exchange>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockSurfaceState {
                exchanges: exchanges.into(),
                current: None,
                frame_index: 0,
                turns: 0,
                submissions: Vec::new(),
                banner_dismissals: 0,
                choices: Vec::new(),
                failing_submissions: 0,
            }),
        })
    }

    /// Make the next `count` submissions fail pre-flight
    pub fn fail_next_submissions(&self, count: usize) {
        self.state.lock().unwrap().failing_submissions = count;
    }

    /// Prompt texts submitted so far, in order
    pub fn submissions(&self) -> Vec<String> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn banner_dismissals(&self) -> usize {
        self.state.lock().unwrap().banner_dismissals
    }

    /// Choice-control actions taken so far
    pub fn choices(&self) -> Vec<ChoiceAction> {
        self.state.lock().unwrap().choices.clone()
    }
}

#[async_trait]
impl ChatSurface for MockSurface {
    async fn submit_text(&self, text: &str) -> Result<(), SurfaceError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(SurfaceError::InputUnavailable {
                reason: "send button disabled".to_string(),
            });
        }

        let Some(exchange) = state.exchanges.pop_front() else {
            return Err(SurfaceError::InputUnavailable {
                reason: "no scripted exchange left".to_string(),
            });
        };
        state.submissions.push(text.to_string());
        if exchange.completes_turn {
            state.turns += 1;
        }
        state.current = Some(exchange);
        state.frame_index = 0;
        Ok(())
    }

    async fn completed_turns(&self) -> Result<usize, SurfaceError> {
        Ok(self.state.lock().unwrap().turns)
    }

    async fn latest_turn(&self) -> Result<TurnSnapshot, SurfaceError> {
        let mut state = self.state.lock().unwrap();
        let index = state.frame_index;
        let Some(exchange) = state.current.as_ref() else {
            return Ok(TurnSnapshot::default());
        };

        let frame = exchange
            .frames
            .get(index)
            .or_else(|| exchange.frames.last())
            .cloned()
            .unwrap_or_default();
        if index + 1 < exchange.frames.len() {
            state.frame_index = index + 1;
        }
        Ok(frame)
    }

    async fn dismiss_rate_limit_banner(&self) {
        let mut state = self.state.lock().unwrap();
        state.banner_dismissals += 1;
        // The banner goes away on dismissal, like the real control
        if let Some(exchange) = state.current.as_mut() {
            for frame in &mut exchange.frames {
                frame.rate_limit_banner = None;
            }
        }
    }

    async fn resolve_choice(&self, action: ChoiceAction) -> Result<(), SurfaceError> {
        let mut state = self.state.lock().unwrap();
        state.choices.push(action);
        // The control disappears once acted on
        if let Some(exchange) = state.current.as_mut() {
            for frame in &mut exchange.frames {
                frame.choice_prompt = None;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// A turn that is still streaming
pub(crate) fn generating_frame() -> TurnSnapshot {
    TurnSnapshot {
        complete_signal: false,
        stop_signal: true,
        ..TurnSnapshot::default()
    }
}

/// A completed turn carrying one full-size generated image
pub(crate) fn complete_frame_with_image(url: &str) -> TurnSnapshot {
    TurnSnapshot {
        complete_signal: true,
        stop_signal: false,
        images: vec![crate::surface::ImageElement {
            url: url.to_string(),
            description: "Generated image".to_string(),
            width: 1024,
            blurred: false,
            opacity: Some(1.0),
        }],
        text_content: "Here is your image.".to_string(),
        ..TurnSnapshot::default()
    }
}

/// A completed turn carrying only text
pub(crate) fn complete_text_frame(text: &str) -> TurnSnapshot {
    TurnSnapshot {
        complete_signal: true,
        stop_signal: false,
        text_content: text.to_string(),
        ..TurnSnapshot::default()
    }
}

/// Records every download request; optionally fails them all
pub(crate) struct RecordingDownloads {
    requests: Mutex<Vec<DownloadRequest>>,
    fail: bool,
}

impl RecordingDownloads {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Relative filenames requested so far, in order
    pub fn filenames(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.relative_filename)
            .collect()
    }
}

#[async_trait]
impl DownloadHandler for RecordingDownloads {
    async fn request(&self, request: DownloadRequest) -> Result<(), DownloadError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(DownloadError::InvalidUrl {
                reason: "recording handler set to fail".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Collect events from a receiver into a shared vec on a background task.
///
/// Draining as the run emits keeps long countdowns from lagging the
/// subscriber past the channel capacity.
pub(crate) fn collect_events(
    mut rx: broadcast::Receiver<RunEvent>,
) -> Arc<Mutex<Vec<RunEvent>>> {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            sink.lock().unwrap().push(event);
        }
    });
    collected
}

/// Wait (in test time) until the runner reports the run over
pub(crate) async fn wait_for_run_end(runner: &crate::runner::PromptRunner) {
    while runner.is_running().await {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    // One more wakeup so event collectors drain the final RunEnded
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
}
