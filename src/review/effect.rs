//! Effects (side effects as data).
//!
//! Transitions return effects instead of performing I/O. The engine's
//! interpreter executes them against the transport, the transform
//! pipeline, and the asset store. This keeps the transition function
//! pure and testable without mocking HTTP.

use std::fmt;

/// All effects a transition can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Re-render the review message (current image + status line).
    Render(RenderRequest),

    /// Acknowledge the actor. Every control action that leaves the
    /// displayed image unchanged still produces one of these.
    Notify(Notice),

    /// Run the strengthened transform against `images[index].source_bytes`.
    /// The interpreter feeds the result back as a `ReprocessCompleted` /
    /// `ReprocessFailed` event.
    Reprocess { index: usize },

    /// The session just became complete; run the finalize decision tree.
    Finalize,

    /// Remove the session from the store and retire its rendered message.
    Retire,
}

/// Outbound render request, the contract with the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub title: String,
    /// One glyph per image: current / approved / rejected / pending.
    pub status_line: String,
    /// Zero-based index of the displayed image.
    pub image_index: usize,
    pub image_count: usize,
    /// PNG bytes of the displayed image (watermarked variant).
    pub image_bytes: Vec<u8>,
}

impl RenderRequest {
    /// "Image 2 of 5" line shown under the title.
    pub fn position_line(&self) -> String {
        format!("Image {} of {}", self.image_index + 1, self.image_count)
    }
}

/// User-facing acknowledgement for an action, including every refusal
/// in the error taxonomy that leaves session state unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    AlreadyAtFirst,
    AlreadyAtLast,
    Approved { index: usize },
    AlreadyApproved { index: usize },
    Rejected { index: usize, feedback: Option<String> },
    AlreadyRejected { index: usize },
    FeedbackRecorded { index: usize },
    Reprocessing { index: usize },
    ReprocessFailed { index: usize, error: String },
    WrongStatus { action: &'static str, index: usize },
    SessionBusy,
    SessionNotFound,
    Cancelled,
    RenderDegraded,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyAtFirst => write!(f, "Already at the first image."),
            Self::AlreadyAtLast => write!(f, "Already at the last image."),
            Self::Approved { index } => write!(f, "Image {} marked as PASSED.", index + 1),
            Self::AlreadyApproved { index } => {
                write!(f, "Image {} is already marked as passed.", index + 1)
            }
            Self::Rejected { index, feedback } => match feedback {
                Some(text) => write!(
                    f,
                    "Image {} marked as NOT PASSED.\nFeedback: {}",
                    index + 1,
                    text
                ),
                None => write!(
                    f,
                    "Image {} marked as NOT PASSED.\nFeedback: None provided",
                    index + 1
                ),
            },
            Self::AlreadyRejected { index } => {
                write!(f, "Image {} is already marked as not passed.", index + 1)
            }
            Self::FeedbackRecorded { index } => {
                write!(f, "Feedback recorded for image {}.", index + 1)
            }
            Self::Reprocessing { index } => {
                write!(f, "Retouching image {} again...", index + 1)
            }
            Self::ReprocessFailed { index, error } => {
                write!(f, "❌ Error retouching image {}: {}", index + 1, error)
            }
            Self::WrongStatus { action, index } => write!(
                f,
                "Cannot {} image {}: wrong status for that action.",
                action,
                index + 1
            ),
            Self::SessionBusy => write!(f, "This review is busy handling another action; try again."),
            Self::SessionNotFound => write!(f, "No active review found for that message."),
            Self::Cancelled => write!(f, "QC process cancelled."),
            Self::RenderDegraded => {
                write!(f, "The action was applied but the preview could not be updated.")
            }
        }
    }
}
