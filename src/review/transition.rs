//! Pure transition function for the review state machine.
//!
//! Takes the session and one event, mutates the session, and returns
//! the effects to execute. No I/O happens here; the engine's
//! interpreter runs the effects and feeds transform results back in as
//! further events.

use super::effect::{Effect, Notice, RenderRequest};
use super::event::ReviewEvent;
use super::session::{ImageStatus, ReviewSession};

/// Builds the render request for the session's current image.
pub fn render_request(session: &ReviewSession) -> RenderRequest {
    RenderRequest {
        title: format!("QC Review - Supply ID: {}", session.batch_label),
        status_line: session.status_line(),
        image_index: session.cursor,
        image_count: session.images.len(),
        image_bytes: session.images[session.cursor].processed_final.clone(),
    }
}

/// Applies one event to the session and returns the effects to run.
pub fn apply(session: &mut ReviewSession, event: ReviewEvent) -> Vec<Effect> {
    match event {
        // =====================================================================
        // Navigation
        // =====================================================================
        ReviewEvent::Previous => {
            if session.cursor == 0 {
                vec![Effect::Notify(Notice::AlreadyAtFirst)]
            } else {
                session.cursor -= 1;
                vec![Effect::Render(render_request(session))]
            }
        }

        ReviewEvent::Next => {
            if session.cursor >= session.last_index() {
                vec![Effect::Notify(Notice::AlreadyAtLast)]
            } else {
                session.cursor += 1;
                vec![Effect::Render(render_request(session))]
            }
        }

        // =====================================================================
        // Decisions
        // =====================================================================
        ReviewEvent::Approve => {
            let index = session.cursor;
            match session.images[index].status {
                // Idempotent: no duplicate side effects, status unchanged.
                ImageStatus::Approved => vec![Effect::Notify(Notice::AlreadyApproved { index })],
                // A rejected image must pass through Pending (retouch-again)
                // before it can be approved.
                ImageStatus::Rejected => vec![Effect::Notify(Notice::WrongStatus {
                    action: "approve",
                    index,
                })],
                ImageStatus::Pending => {
                    session.images[index].status = ImageStatus::Approved;
                    let effects = vec![Effect::Notify(Notice::Approved { index })];
                    after_decision(session, effects)
                }
            }
        }

        ReviewEvent::Reject { feedback } => {
            let index = session.cursor;
            match session.images[index].status {
                ImageStatus::Rejected => vec![Effect::Notify(Notice::AlreadyRejected { index })],
                ImageStatus::Approved => vec![Effect::Notify(Notice::WrongStatus {
                    action: "reject",
                    index,
                })],
                ImageStatus::Pending => {
                    session.images[index].status = ImageStatus::Rejected;
                    session.feedback[index] = feedback.clone();
                    let effects = vec![Effect::Notify(Notice::Rejected { index, feedback })];
                    after_decision(session, effects)
                }
            }
        }

        ReviewEvent::AttachFeedback { index, text } => {
            if index >= session.images.len()
                || session.images[index].status != ImageStatus::Rejected
            {
                return vec![Effect::Notify(Notice::WrongStatus {
                    action: "attach feedback to",
                    index,
                })];
            }
            session.feedback[index] = Some(text);
            vec![Effect::Notify(Notice::FeedbackRecorded { index })]
        }

        // =====================================================================
        // Retry / cancel
        // =====================================================================
        ReviewEvent::RetouchAgain { index } => {
            if index >= session.images.len()
                || session.images[index].status != ImageStatus::Rejected
            {
                return vec![Effect::Notify(Notice::WrongStatus {
                    action: "retouch",
                    index,
                })];
            }
            vec![
                Effect::Notify(Notice::Reprocessing { index }),
                Effect::Reprocess { index },
            ]
        }

        ReviewEvent::Cancel => vec![Effect::Notify(Notice::Cancelled), Effect::Retire],

        // =====================================================================
        // Transform results
        // =====================================================================
        ReviewEvent::ReprocessCompleted {
            index,
            processed_no_watermark,
            processed_final,
        } => {
            // Stale result: the index is no longer rejected (e.g. feedback
            // round trips raced a second retouch request). Discard.
            if index >= session.images.len()
                || session.images[index].status != ImageStatus::Rejected
            {
                return vec![];
            }
            let record = &mut session.images[index];
            record.processed_no_watermark = processed_no_watermark;
            record.processed_final = processed_final;
            record.status = ImageStatus::Pending;
            session.feedback[index] = None;
            session.cursor = index;
            vec![Effect::Render(render_request(session))]
        }

        ReviewEvent::ReprocessFailed { index, error } => {
            // Prior state is preserved; the image stays Rejected.
            vec![Effect::Notify(Notice::ReprocessFailed { index, error })]
        }
    }
}

/// Shared tail of approve/reject: advance, re-render, or finalize.
///
/// A decision always flips a Pending status to a terminal one, so the
/// session was incomplete before it. If it is complete now, this is the
/// completion edge and finalize fires exactly once, regardless of where
/// the cursor sits.
fn after_decision(session: &mut ReviewSession, mut effects: Vec<Effect>) -> Vec<Effect> {
    if session.is_complete() {
        effects.push(Effect::Finalize);
        return effects;
    }
    if session.cursor < session.last_index() {
        session.cursor += 1;
    }
    effects.push(Effect::Render(render_request(session)));
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::session::{ChannelContext, ImageRecord, SubmitterId};

    fn session(n: usize) -> ReviewSession {
        let images = (0..n)
            .map(|i| ImageRecord::new(vec![i as u8], vec![10 + i as u8], vec![20 + i as u8]))
            .collect();
        ReviewSession::new("supply1", SubmitterId(1), ChannelContext::from("chan"), images)
    }

    fn statuses(session: &ReviewSession) -> Vec<ImageStatus> {
        session.images.iter().map(|r| r.status).collect()
    }

    #[test]
    fn test_previous_at_first_is_boundary_notice() {
        let mut s = session(3);
        let effects = apply(&mut s, ReviewEvent::Previous);
        assert_eq!(effects, vec![Effect::Notify(Notice::AlreadyAtFirst)]);
        assert_eq!(s.cursor, 0);
    }

    #[test]
    fn test_next_at_last_is_boundary_notice() {
        let mut s = session(2);
        s.cursor = 1;
        let effects = apply(&mut s, ReviewEvent::Next);
        assert_eq!(effects, vec![Effect::Notify(Notice::AlreadyAtLast)]);
        assert_eq!(s.cursor, 1);
    }

    #[test]
    fn test_navigation_rerenders() {
        let mut s = session(3);
        let effects = apply(&mut s, ReviewEvent::Next);
        assert_eq!(s.cursor, 1);
        assert!(matches!(&effects[0], Effect::Render(req) if req.image_index == 1));

        let effects = apply(&mut s, ReviewEvent::Previous);
        assert_eq!(s.cursor, 0);
        assert!(matches!(&effects[0], Effect::Render(req) if req.image_index == 0));
    }

    #[test]
    fn test_cursor_stays_in_bounds_after_every_event() {
        let mut s = session(3);
        let events = [
            ReviewEvent::Previous,
            ReviewEvent::Approve,
            ReviewEvent::Next,
            ReviewEvent::Next,
            ReviewEvent::Next,
            ReviewEvent::Reject { feedback: None },
            ReviewEvent::Previous,
        ];
        for event in events {
            apply(&mut s, event);
            assert!(s.cursor < s.images.len());
        }
    }

    #[test]
    fn test_approve_advances_cursor() {
        let mut s = session(3);
        let effects = apply(&mut s, ReviewEvent::Approve);
        assert_eq!(s.images[0].status, ImageStatus::Approved);
        assert_eq!(s.cursor, 1);
        assert!(effects.contains(&Effect::Notify(Notice::Approved { index: 0 })));
        assert!(effects.iter().any(|e| matches!(e, Effect::Render(_))));
    }

    #[test]
    fn test_approve_is_idempotent() {
        let mut s = session(2);
        apply(&mut s, ReviewEvent::Approve);
        s.cursor = 0;
        let effects = apply(&mut s, ReviewEvent::Approve);
        assert_eq!(effects, vec![Effect::Notify(Notice::AlreadyApproved { index: 0 })]);
        assert_eq!(s.images[0].status, ImageStatus::Approved);
        assert_eq!(s.cursor, 0);
    }

    #[test]
    fn test_approve_rejected_image_is_wrong_status() {
        let mut s = session(2);
        apply(&mut s, ReviewEvent::Reject { feedback: None });
        s.cursor = 0;
        let effects = apply(&mut s, ReviewEvent::Approve);
        assert_eq!(
            effects,
            vec![Effect::Notify(Notice::WrongStatus { action: "approve", index: 0 })]
        );
        assert_eq!(s.images[0].status, ImageStatus::Rejected);
    }

    #[test]
    fn test_reject_records_feedback() {
        let mut s = session(2);
        let effects = apply(
            &mut s,
            ReviewEvent::Reject {
                feedback: Some("blurry".to_string()),
            },
        );
        assert_eq!(s.images[0].status, ImageStatus::Rejected);
        assert_eq!(s.feedback[0].as_deref(), Some("blurry"));
        assert!(effects.contains(&Effect::Notify(Notice::Rejected {
            index: 0,
            feedback: Some("blurry".to_string()),
        })));
    }

    #[test]
    fn test_reject_is_idempotent() {
        let mut s = session(2);
        apply(&mut s, ReviewEvent::Reject { feedback: None });
        s.cursor = 0;
        let effects = apply(
            &mut s,
            ReviewEvent::Reject {
                feedback: Some("late feedback".to_string()),
            },
        );
        assert_eq!(effects, vec![Effect::Notify(Notice::AlreadyRejected { index: 0 })]);
        // The late feedback is not applied to an already-rejected image.
        assert_eq!(s.feedback[0], None);
    }

    #[test]
    fn test_decision_at_last_index_rerenders_when_incomplete() {
        let mut s = session(3);
        s.cursor = 2;
        let effects = apply(&mut s, ReviewEvent::Approve);
        // Images 0 and 1 are still pending, so no finalize; the cursor
        // stays at the last index so the actor can navigate back.
        assert_eq!(s.cursor, 2);
        assert!(!effects.contains(&Effect::Finalize));
        assert!(effects.iter().any(|e| matches!(e, Effect::Render(_))));
    }

    #[test]
    fn test_completion_edge_emits_finalize_once() {
        let mut s = session(2);
        let effects = apply(&mut s, ReviewEvent::Approve);
        assert!(!effects.contains(&Effect::Finalize));
        let effects = apply(&mut s, ReviewEvent::Approve);
        assert!(effects.contains(&Effect::Finalize));
        assert_eq!(effects.iter().filter(|e| **e == Effect::Finalize).count(), 1);
    }

    #[test]
    fn test_completion_detected_off_last_index() {
        // Approve 2, reject 1 (last), then go back and approve 1's
        // remaining pending sibling: completion must fire even though the
        // cursor is not at the last index.
        let mut s = session(3);
        apply(&mut s, ReviewEvent::Approve); // index 0, cursor -> 1
        apply(&mut s, ReviewEvent::Next); // skip index 1, cursor -> 2
        apply(&mut s, ReviewEvent::Reject { feedback: None }); // index 2, still incomplete
        s.cursor = 1;
        let effects = apply(&mut s, ReviewEvent::Approve);
        assert!(s.is_complete());
        assert!(effects.contains(&Effect::Finalize));
    }

    #[test]
    fn test_retouch_again_on_rejected_requests_reprocess() {
        let mut s = session(2);
        apply(&mut s, ReviewEvent::Reject { feedback: Some("dark".into()) });
        let effects = apply(&mut s, ReviewEvent::RetouchAgain { index: 0 });
        assert_eq!(
            effects,
            vec![
                Effect::Notify(Notice::Reprocessing { index: 0 }),
                Effect::Reprocess { index: 0 },
            ]
        );
        // Status only flips back to Pending once the transform result lands.
        assert_eq!(s.images[0].status, ImageStatus::Rejected);
    }

    #[test]
    fn test_retouch_again_on_approved_is_wrong_status() {
        let mut s = session(2);
        apply(&mut s, ReviewEvent::Approve);
        let effects = apply(&mut s, ReviewEvent::RetouchAgain { index: 0 });
        assert_eq!(
            effects,
            vec![Effect::Notify(Notice::WrongStatus { action: "retouch", index: 0 })]
        );
        assert_eq!(statuses(&s), vec![ImageStatus::Approved, ImageStatus::Pending]);
    }

    #[test]
    fn test_retouch_again_out_of_range_is_wrong_status() {
        let mut s = session(1);
        let effects = apply(&mut s, ReviewEvent::RetouchAgain { index: 5 });
        assert!(matches!(
            effects[0],
            Effect::Notify(Notice::WrongStatus { index: 5, .. })
        ));
    }

    #[test]
    fn test_reprocess_completed_resets_to_pending_and_clears_feedback() {
        let mut s = session(3);
        s.cursor = 1;
        apply(&mut s, ReviewEvent::Reject { feedback: Some("noisy".into()) });
        s.cursor = 2;
        let effects = apply(
            &mut s,
            ReviewEvent::ReprocessCompleted {
                index: 1,
                processed_no_watermark: vec![77],
                processed_final: vec![88],
            },
        );
        assert_eq!(s.images[1].status, ImageStatus::Pending);
        assert_eq!(s.images[1].processed_no_watermark, vec![77]);
        assert_eq!(s.images[1].processed_final, vec![88]);
        assert_eq!(s.feedback[1], None);
        assert_eq!(s.cursor, 1);
        assert!(matches!(&effects[0], Effect::Render(req) if req.image_index == 1));
    }

    #[test]
    fn test_stale_reprocess_result_is_discarded() {
        let mut s = session(2);
        // Index 0 is still pending; a transform result for it is stale.
        let effects = apply(
            &mut s,
            ReviewEvent::ReprocessCompleted {
                index: 0,
                processed_no_watermark: vec![1],
                processed_final: vec![2],
            },
        );
        assert!(effects.is_empty());
        assert_eq!(s.images[0].processed_final, vec![20]);
    }

    #[test]
    fn test_reprocess_failed_preserves_prior_state() {
        let mut s = session(2);
        apply(&mut s, ReviewEvent::Reject { feedback: Some("grainy".into()) });
        let effects = apply(
            &mut s,
            ReviewEvent::ReprocessFailed {
                index: 0,
                error: "decode error".to_string(),
            },
        );
        assert_eq!(s.images[0].status, ImageStatus::Rejected);
        assert_eq!(s.feedback[0].as_deref(), Some("grainy"));
        assert!(matches!(
            &effects[0],
            Effect::Notify(Notice::ReprocessFailed { index: 0, .. })
        ));
    }

    #[test]
    fn test_attach_feedback_to_rejected_index() {
        let mut s = session(2);
        apply(&mut s, ReviewEvent::Reject { feedback: None });
        let effects = apply(
            &mut s,
            ReviewEvent::AttachFeedback {
                index: 0,
                text: "color cast".to_string(),
            },
        );
        assert_eq!(s.feedback[0].as_deref(), Some("color cast"));
        assert_eq!(effects, vec![Effect::Notify(Notice::FeedbackRecorded { index: 0 })]);
    }

    #[test]
    fn test_attach_feedback_to_pending_index_is_wrong_status() {
        let mut s = session(2);
        let effects = apply(
            &mut s,
            ReviewEvent::AttachFeedback {
                index: 1,
                text: "oops".to_string(),
            },
        );
        assert!(matches!(
            effects[0],
            Effect::Notify(Notice::WrongStatus { index: 1, .. })
        ));
        assert_eq!(s.feedback[1], None);
    }

    #[test]
    fn test_cancel_retires_unconditionally() {
        let mut s = session(3);
        apply(&mut s, ReviewEvent::Approve);
        let effects = apply(&mut s, ReviewEvent::Cancel);
        assert_eq!(effects, vec![Effect::Notify(Notice::Cancelled), Effect::Retire]);
    }

    #[test]
    fn test_render_request_contents() {
        let mut s = session(2);
        apply(&mut s, ReviewEvent::Approve);
        let req = render_request(&s);
        assert_eq!(req.title, "QC Review - Supply ID: supply1");
        assert_eq!(req.status_line, "✅ 🔍");
        assert_eq!(req.image_index, 1);
        assert_eq!(req.image_count, 2);
        assert_eq!(req.image_bytes, vec![21]);
    }
}
