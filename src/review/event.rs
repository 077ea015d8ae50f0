//! Events that drive session transitions.
//!
//! Control events come from the transport (one button press or modal
//! submit each); result events are produced by the interpreter after an
//! effect has run against the transform pipeline. Both feed the same
//! pure transition function.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewEvent {
    // =========================================================================
    // Control events (inbound from the transport)
    // =========================================================================
    /// Move to the previous image.
    Previous,

    /// Move to the next image.
    Next,

    /// Approve the image at the cursor.
    Approve,

    /// Reject the image at the cursor, optionally with feedback text.
    Reject { feedback: Option<String> },

    /// Attach (or replace) feedback for an already-rejected index.
    /// Used when the transport collects the text in a second round trip.
    AttachFeedback { index: usize, text: String },

    /// Reprocess a rejected image from its original bytes.
    RetouchAgain { index: usize },

    /// Retire the session without finalizing.
    Cancel,

    // =========================================================================
    // Transform results (produced by the interpreter)
    // =========================================================================
    /// Reprocessing finished; both variants are fresh PNG bytes.
    ReprocessCompleted {
        index: usize,
        processed_no_watermark: Vec<u8>,
        processed_final: Vec<u8>,
    },

    /// Reprocessing failed; the image keeps its prior state.
    ReprocessFailed { index: usize, error: String },
}

impl ReviewEvent {
    /// Short form for logging. Avoids dumping image bytes into logs.
    pub fn log_summary(&self) -> String {
        match self {
            Self::Previous => "Previous".to_string(),
            Self::Next => "Next".to_string(),
            Self::Approve => "Approve".to_string(),
            Self::Reject { feedback } => {
                format!("Reject {{ feedback: {} }}", feedback.is_some())
            }
            Self::AttachFeedback { index, text } => {
                format!("AttachFeedback {{ index: {}, len: {} }}", index, text.len())
            }
            Self::RetouchAgain { index } => format!("RetouchAgain {{ index: {} }}", index),
            Self::Cancel => "Cancel".to_string(),
            Self::ReprocessCompleted { index, processed_final, .. } => format!(
                "ReprocessCompleted {{ index: {}, bytes: {} }}",
                index,
                processed_final.len()
            ),
            Self::ReprocessFailed { index, error } => {
                format!("ReprocessFailed {{ index: {}, error: {} }}", index, error)
            }
        }
    }
}
