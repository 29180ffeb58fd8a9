use crate::config::RunOptions;
use crate::runner::PromptRunner;
use crate::runner::test_helpers::{
    Exchange, MockSurface, RecordingDownloads, collect_events, wait_for_run_end,
};
use crate::types::RunEvent;
use std::sync::Arc;


/// Runner over a scripted surface and a recording download handler
fn create_test_runner(
    exchanges: Vec<Exchange>,
) -> (PromptRunner, Arc<MockSurface>, Arc<RecordingDownloads>) {
    let surface = MockSurface::new(exchanges);
    let downloads = RecordingDownloads::new();
    let runner = PromptRunner::new(surface.clone(), downloads.clone());
    (runner, surface, downloads)
}

/// Options tuned for fast virtual-clock tests
fn fast_options(script: &str) -> RunOptions {
    let mut options = RunOptions::new(script);
    options.inter_prompt_delay_secs = 1;
    options.retry_delay_secs = 1;
    options
}

fn run_ended_completed(events: &[RunEvent]) -> Option<bool> {
    events.iter().rev().find_map(|event| match event {
        RunEvent::RunEnded { completed } => Some(*completed),
        _ => None,
    })
}
