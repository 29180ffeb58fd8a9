//! Scripted surface and event helpers for running the public API end to end

use async_trait::async_trait;
use imagegen_dl::{
    ChatSurface, ChoiceAction, ImageElement, RunEvent, SurfaceError, TurnSnapshot,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// What the scripted surface answers to one submission
#[derive(Clone)]
pub enum Reply {
    /// A completed turn carrying a generated image at this URL
    Image(String),
    /// A completed turn carrying only this text
    Text(String),
    /// A turn that never completes (for stop/timeout scenarios)
    Pending,
}

struct ScriptedState {
    replies: VecDeque<Reply>,
    current: Option<Reply>,
    turns: usize,
    submissions: Vec<String>,
}

/// Public-API [`ChatSurface`] that answers each submission from a script.
///
/// Turns complete immediately; the driver's stabilization window is the only
/// wait between submission and resolution.
pub struct ScriptedSurface {
    state: Mutex<ScriptedState>,
}

impl ScriptedSurface {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptedState {
                replies: replies.into(),
                current: None,
                turns: 0,
                submissions: Vec::new(),
            }),
        })
    }

    pub fn submissions(&self) -> Vec<String> {
        self.state.lock().unwrap().submissions.clone()
    }
}

#[async_trait]
impl ChatSurface for ScriptedSurface {
    async fn submit_text(&self, text: &str) -> Result<(), SurfaceError> {
        let mut state = self.state.lock().unwrap();
        let Some(reply) = state.replies.pop_front() else {
            return Err(SurfaceError::InputUnavailable {
                reason: "no scripted reply left".to_string(),
            });
        };
        state.submissions.push(text.to_string());
        state.turns += 1;
        state.current = Some(reply);
        Ok(())
    }

    async fn completed_turns(&self) -> Result<usize, SurfaceError> {
        Ok(self.state.lock().unwrap().turns)
    }

    async fn latest_turn(&self) -> Result<TurnSnapshot, SurfaceError> {
        let state = self.state.lock().unwrap();
        let snapshot = match state.current.as_ref() {
            None => TurnSnapshot::default(),
            Some(Reply::Pending) => TurnSnapshot {
                stop_signal: true,
                ..TurnSnapshot::default()
            },
            Some(Reply::Text(text)) => TurnSnapshot {
                complete_signal: true,
                text_content: text.clone(),
                ..TurnSnapshot::default()
            },
            Some(Reply::Image(url)) => TurnSnapshot {
                complete_signal: true,
                text_content: "Here is your image.".to_string(),
                images: vec![ImageElement {
                    url: url.clone(),
                    description: "Generated image".to_string(),
                    width: 1024,
                    blurred: false,
                    opacity: Some(1.0),
                }],
                ..TurnSnapshot::default()
            },
        };
        Ok(snapshot)
    }

    async fn dismiss_rate_limit_banner(&self) {}

    async fn resolve_choice(&self, _action: ChoiceAction) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Drain events until `RunEnded` arrives, returning everything seen.
///
/// Panics if the run does not end within `limit`.
pub async fn events_until_run_end(
    mut rx: broadcast::Receiver<RunEvent>,
    limit: Duration,
) -> Vec<RunEvent> {
    let mut events = Vec::new();
    let collect = async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let ended = matches!(event, RunEvent::RunEnded { .. });
                    events.push(event);
                    if ended {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    tokio::time::timeout(limit, collect)
        .await
        .expect("run did not end within the time limit");
    events
}

/// The `completed` flag of the final `RunEnded` event
pub fn run_completed(events: &[RunEvent]) -> Option<bool> {
    events.iter().rev().find_map(|event| match event {
        RunEvent::RunEnded { completed } => Some(*completed),
        _ => None,
    })
}
