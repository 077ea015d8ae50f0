//! Session types for the QC review state machine.
//!
//! A `ReviewSession` tracks one submitted batch of images through the
//! accept/reject review loop. Per-image state is deliberately small:
//! the original bytes (so a reject can reprocess from scratch), the two
//! processed variants, and a three-valued status.

use std::fmt;

use uuid::Uuid;

/// Newtype for the opaque key the transport uses to address a session.
///
/// Provisional keys are UUIDs minted at creation time; once the
/// interactive review message is published, the session is rekeyed to
/// the transport's message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(pub String);

impl SessionKey {
    /// Mints a fresh provisional key.
    pub fn provisional() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Newtype for the channel/thread the batch was submitted in.
/// Reports and channel-level notices are addressed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelContext(pub String);

impl fmt::Display for ChannelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelContext {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of the user who submitted the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmitterId(pub u64);

/// Per-image review status.
///
/// Transitions: `Pending -> Approved`, `Pending -> Rejected`,
/// `Rejected -> Pending` (retouch-again). There is no direct
/// `Rejected -> Approved` edge; a rejected image must be reprocessed
/// back to `Pending` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    Pending,
    Approved,
    Rejected,
}

impl ImageStatus {
    /// Returns true for `Approved` or `Rejected`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Status glyph used in the review status line.
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Pending => "⬜",
            Self::Approved => "✅",
            Self::Rejected => "❌",
        }
    }
}

/// One image of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Original submitted bytes, retained so a reject can trigger
    /// reprocessing from the source.
    pub source_bytes: Vec<u8>,
    /// Retouch output, PNG-encoded, without watermark.
    pub processed_no_watermark: Vec<u8>,
    /// Watermark output applied to the retouched image. Identical to
    /// `processed_no_watermark` when watermarking is disabled.
    pub processed_final: Vec<u8>,
    pub status: ImageStatus,
}

impl ImageRecord {
    pub fn new(source_bytes: Vec<u8>, processed_no_watermark: Vec<u8>, processed_final: Vec<u8>) -> Self {
        Self {
            source_bytes,
            processed_no_watermark,
            processed_final,
            status: ImageStatus::Pending,
        }
    }
}

/// In-memory record of one batch under review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSession {
    pub batch_label: String,
    pub submitter: SubmitterId,
    pub channel: ChannelContext,
    /// Ordered, index-addressable; length fixed at creation. Images
    /// that failed processing never get a record.
    pub images: Vec<ImageRecord>,
    /// Currently displayed image. Invariant: `0 <= cursor < images.len()`.
    pub cursor: usize,
    /// Per-index free-text feedback; only meaningful for rejected images.
    pub feedback: Vec<Option<String>>,
}

impl ReviewSession {
    pub fn new(
        batch_label: impl Into<String>,
        submitter: SubmitterId,
        channel: ChannelContext,
        images: Vec<ImageRecord>,
    ) -> Self {
        let feedback = vec![None; images.len()];
        Self {
            batch_label: batch_label.into(),
            submitter,
            channel,
            images,
            cursor: 0,
            feedback,
        }
    }

    /// Generates a fallback batch label when the submission carried none.
    pub fn generated_label() -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("batch-{}", &id[..8])
    }

    /// A session is complete iff every image status is terminal.
    pub fn is_complete(&self) -> bool {
        self.images.iter().all(|r| r.status.is_terminal())
    }

    /// A session is fully approved iff every image status is `Approved`.
    pub fn all_approved(&self) -> bool {
        self.images
            .iter()
            .all(|r| r.status == ImageStatus::Approved)
    }

    /// Index of the last image.
    pub fn last_index(&self) -> usize {
        self.images.len().saturating_sub(1)
    }

    /// Indices currently approved, in order.
    pub fn approved_indices(&self) -> Vec<usize> {
        self.images
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ImageStatus::Approved)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices currently rejected, in order.
    pub fn rejected_indices(&self) -> Vec<usize> {
        self.images
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ImageStatus::Rejected)
            .map(|(i, _)| i)
            .collect()
    }

    /// One marker per image; the cursor position shows the current-image
    /// glyph regardless of its status.
    pub fn status_line(&self) -> String {
        self.images
            .iter()
            .enumerate()
            .map(|(i, r)| if i == self.cursor { "🔍" } else { r.status.glyph() })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: ImageStatus) -> ImageRecord {
        ImageRecord {
            source_bytes: vec![1],
            processed_no_watermark: vec![2],
            processed_final: vec![3],
            status,
        }
    }

    fn session(statuses: &[ImageStatus]) -> ReviewSession {
        ReviewSession::new(
            "supply42",
            SubmitterId(7),
            ChannelContext::from("chan"),
            statuses.iter().map(|s| record(*s)).collect(),
        )
    }

    #[test]
    fn test_new_session_starts_pending_at_first_image() {
        let s = session(&[ImageStatus::Pending, ImageStatus::Pending]);
        assert_eq!(s.cursor, 0);
        assert!(!s.is_complete());
        assert!(s.feedback.iter().all(Option::is_none));
    }

    #[test]
    fn test_complete_iff_no_pending() {
        let s = session(&[ImageStatus::Approved, ImageStatus::Rejected]);
        assert!(s.is_complete());
        assert!(!s.all_approved());

        let s = session(&[ImageStatus::Approved, ImageStatus::Pending]);
        assert!(!s.is_complete());
    }

    #[test]
    fn test_all_approved() {
        let s = session(&[ImageStatus::Approved, ImageStatus::Approved]);
        assert!(s.is_complete());
        assert!(s.all_approved());
    }

    #[test]
    fn test_status_line_marks_cursor() {
        let mut s = session(&[
            ImageStatus::Approved,
            ImageStatus::Pending,
            ImageStatus::Rejected,
        ]);
        s.cursor = 1;
        assert_eq!(s.status_line(), "✅ 🔍 ❌");
        s.cursor = 0;
        assert_eq!(s.status_line(), "🔍 ⬜ ❌");
    }

    #[test]
    fn test_partition_by_status() {
        let s = session(&[
            ImageStatus::Approved,
            ImageStatus::Rejected,
            ImageStatus::Approved,
        ]);
        assert_eq!(s.approved_indices(), vec![0, 2]);
        assert_eq!(s.rejected_indices(), vec![1]);
    }

    #[test]
    fn test_generated_label_shape() {
        let label = ReviewSession::generated_label();
        assert!(label.starts_with("batch-"));
        assert_eq!(label.len(), "batch-".len() + 8);
    }

    #[test]
    fn test_provisional_keys_are_unique() {
        assert_ne!(SessionKey::provisional(), SessionKey::provisional());
    }
}
