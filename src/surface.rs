//! Traits and types for the chat surface seam
//!
//! [`ChatSurface`] abstracts the interactive conversation UI that a run
//! drives: a browser adapter in production, a scripted mock in tests. The
//! run loop only ever observes the surface through [`TurnSnapshot`] values,
//! so the generation state machine stays independent of any concrete DOM.

use crate::error::SurfaceError;
use async_trait::async_trait;

/// Point-in-time view of the newest response turn and page-level notices
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct TurnSnapshot {
    /// A finish affordance (copy control) is present on the turn
    pub complete_signal: bool,
    /// A stop-generation control is still active
    pub stop_signal: bool,
    /// Images currently rendered in the turn, in document order
    pub images: Vec<ImageElement>,
    /// Full visible text of the turn
    pub text_content: String,
    /// Text of a dismissible rate-limit banner, when one is visible
    pub rate_limit_banner: Option<String>,
    /// An unresolved image-choice control, when one is visible
    pub choice_prompt: Option<ChoicePrompt>,
}

/// One image element visible in a turn
#[derive(Debug, Clone, PartialEq)]
pub struct ImageElement {
    /// Source URL
    pub url: String,
    /// Accessible description (alt text)
    pub description: String,
    /// Rendered width in pixels
    pub width: u32,
    /// Whether a blur or placeholder treatment covers the image
    pub blurred: bool,
    /// Rendered opacity, when the surface reports one
    pub opacity: Option<f64>,
}

/// A choice control asking the user to pick between candidate images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChoicePrompt {
    /// Number of selectable options
    pub option_count: usize,
    /// Whether a skip control is present
    pub has_skip: bool,
}

/// How to resolve a visible [`ChoicePrompt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceAction {
    /// Select the option at this 0-based index
    Pick(usize),
    /// Use the skip control
    Skip,
}

/// Adapter over one interactive conversation surface.
///
/// Implementations are expected to be cheap to poll: [`latest_turn`] runs
/// once a second for up to twenty minutes per prompt. All methods take
/// `&self`; an adapter that needs interior state manages its own locking.
///
/// [`latest_turn`]: Self::latest_turn
#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Type `text` into the input surface and confirm the submission.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::InputUnavailable`] when the input element or
    /// its confirmation control cannot be located or is disabled. This is a
    /// local, pre-flight failure; it never represents a timeout.
    async fn submit_text(&self, text: &str) -> Result<(), SurfaceError>;

    /// Count of completed response turns in the conversation
    async fn completed_turns(&self) -> Result<usize, SurfaceError>;

    /// Snapshot the newest turn plus page-level notices.
    ///
    /// Must succeed (with an empty snapshot) even before any turn exists,
    /// so a rate-limit banner that pre-empts the first response is still
    /// observable.
    async fn latest_turn(&self) -> Result<TurnSnapshot, SurfaceError>;

    /// Dismiss a visible rate-limit banner; no-op when none is showing
    async fn dismiss_rate_limit_banner(&self);

    /// Resolve a visible image-choice control
    async fn resolve_choice(&self, action: ChoiceAction) -> Result<(), SurfaceError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
