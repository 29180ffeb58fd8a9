//! Run configuration for imagegen-dl

use serde::{Deserialize, Serialize};

/// Escalation probe sent after all retries for a queue entry fail.
///
/// Asks the surface itself whether the failure is a usage limit, in a format
/// the reply parser understands. Overridable per run via
/// [`RunOptions::probe_prompt`].
pub const DEFAULT_PROBE_PROMPT: &str = "How much time for the next image generation? \
     Please tell me in the format DD:HH:MM. If it's not a time limitation, please say 'NO'";

/// Options for a single automation run
///
/// Only `script` is required; every other field has a default chosen for
/// unattended overnight runs. Serializable so a host can persist and replay
/// run settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunOptions {
    /// Prompt script text: one prompt per line, blank lines ignored, with
    /// optional `#####` config directive lines between prompts
    pub script: String,

    /// 1-based ordinal of the first prompt to submit; earlier prompts are
    /// skipped but their config directives still apply (default: 1)
    #[serde(default = "default_start_index")]
    pub start_index: usize,

    /// Suffix appended to a prompt when the same text was already submitted
    /// during this run, so the surface treats it as a fresh request
    /// (default: empty)
    #[serde(default)]
    pub continuation_suffix: String,

    /// Pause between consecutive prompts, in seconds (default: 5)
    #[serde(default = "default_inter_prompt_delay")]
    pub inter_prompt_delay_secs: u64,

    /// Retries per prompt before the escalation probe (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before each retry of a failed prompt, in seconds (default: 150)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Text of the escalation probe (default: [`DEFAULT_PROBE_PROMPT`])
    #[serde(default = "default_probe_prompt")]
    pub probe_prompt: String,
}

impl RunOptions {
    /// Options for running `script` with every other setting at its default
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            start_index: default_start_index(),
            continuation_suffix: String::new(),
            inter_prompt_delay_secs: default_inter_prompt_delay(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            probe_prompt: default_probe_prompt(),
        }
    }
}

// Default value functions
fn default_start_index() -> usize {
    1
}

fn default_inter_prompt_delay() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    150
}

fn default_probe_prompt() -> String {
    DEFAULT_PROBE_PROMPT.to_string()
}
