//! Inbound event transport.
//!
//! A relay in front of the chat platform delivers submissions and
//! control actions as signed JSON POSTs to `/events`. Every request
//! body is verified against an HMAC-SHA256 signature header before it
//! reaches a handler; processing happens on a background task so the
//! relay gets a fast acknowledgement.

use axum::body::Body;
use axum::extract::{Json, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::review::{Attachment, ChannelContext, ReviewEvent, SessionKey, Submission, SubmitterId};
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-signature-256";

/// Base64-encoded image batches get large.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundEvent {
    Submission(SubmissionPayload),
    Control(ControlPayload),
}

#[derive(Debug, Deserialize)]
struct SubmissionPayload {
    channel: String,
    submitter: u64,
    #[serde(default)]
    batch_label: Option<String>,
    /// One entry per attachment; non-image mime types are filtered by
    /// the engine.
    images: Vec<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentPayload {
    filename: String,
    mime_type: String,
    /// Base64-encoded contents.
    bytes: String,
}

#[derive(Debug, Deserialize)]
struct ControlPayload {
    session: String,
    #[serde(flatten)]
    action: ControlAction,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlAction {
    Previous,
    Next,
    Approve,
    Reject {
        #[serde(default)]
        feedback: Option<String>,
    },
    AttachFeedback {
        index: usize,
        text: String,
    },
    RetouchAgain {
        index: usize,
    },
    Cancel,
}

fn control_event(action: ControlAction) -> ReviewEvent {
    match action {
        ControlAction::Previous => ReviewEvent::Previous,
        ControlAction::Next => ReviewEvent::Next,
        ControlAction::Approve => ReviewEvent::Approve,
        ControlAction::Reject { feedback } => ReviewEvent::Reject { feedback },
        ControlAction::AttachFeedback { index, text } => {
            ReviewEvent::AttachFeedback { index, text }
        }
        ControlAction::RetouchAgain { index } => ReviewEvent::RetouchAgain { index },
        ControlAction::Cancel => ReviewEvent::Cancel,
    }
}

/// Checks a `sha256=<hex>` signature header against the raw body.
fn signature_valid(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // verify_slice is constant time.
    mac.verify_slice(&expected).is_ok()
}

async fn verify_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let header = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let valid = header
        .map(|h| signature_valid(&state.webhook_secret, &bytes, h))
        .unwrap_or(false);
    if !valid {
        warn!("rejected event with missing or invalid signature");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn health(State(state): State<AppState>) -> String {
    format!("ok, {} active sessions", state.engine.session_count().await)
}

async fn events(State(state): State<AppState>, Json(event): Json<InboundEvent>) -> StatusCode {
    match event {
        InboundEvent::Submission(payload) => {
            if let Some(restriction) = &state.channel_restriction {
                if payload.channel != *restriction {
                    debug!("ignoring submission from channel {}", payload.channel);
                    return StatusCode::NO_CONTENT;
                }
            }

            let mut attachments = Vec::with_capacity(payload.images.len());
            for entry in payload.images {
                match base64::engine::general_purpose::STANDARD.decode(&entry.bytes) {
                    Ok(bytes) => attachments.push(Attachment {
                        filename: entry.filename,
                        mime_type: entry.mime_type,
                        bytes,
                    }),
                    Err(e) => {
                        warn!("dropping attachment {}: invalid base64: {}", entry.filename, e)
                    }
                }
            }

            let submission = Submission {
                channel: ChannelContext(payload.channel),
                submitter: SubmitterId(payload.submitter),
                batch_label: payload.batch_label,
                attachments,
            };
            info!(
                "submission received: {} attachment(s) in {}",
                submission.attachments.len(),
                submission.channel
            );

            let engine = state.engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.submit(submission).await {
                    warn!("submission not accepted: {:#}", e);
                }
            });
            StatusCode::ACCEPTED
        }

        InboundEvent::Control(payload) => {
            let key = SessionKey::from(payload.session);
            let event = control_event(payload.action);
            let engine = state.engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.handle_control(&key, event).await {
                    warn!("control event on {} failed: {:#}", key, e);
                }
            });
            StatusCode::ACCEPTED
        }
    }
}

/// Builds the HTTP surface: `/health` open, `/events` signed.
pub fn router(state: AppState) -> Router {
    let signed = Router::new()
        .route("/events", post(events))
        .layer(middleware::from_fn_with_state(state.clone(), verify_signature));

    Router::new()
        .route("/health", get(health))
        .merge(signed)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"type":"control"}"#;
        let header = sign("secret", body);
        assert!(signature_valid("secret", body, &header));
    }

    #[test]
    fn test_signature_rejects_wrong_secret_and_body() {
        let body = b"payload";
        let header = sign("secret", body);
        assert!(!signature_valid("other", body, &header));
        assert!(!signature_valid("secret", b"tampered", &header));
    }

    #[test]
    fn test_signature_rejects_malformed_header() {
        assert!(!signature_valid("secret", b"x", "md5=abcd"));
        assert!(!signature_valid("secret", b"x", "sha256=nothex"));
        assert!(!signature_valid("secret", b"x", ""));
    }

    #[test]
    fn test_submission_payload_parses() {
        let json = r#"{
            "type": "submission",
            "channel": "chan1",
            "submitter": 42,
            "batch_label": "supply7",
            "images": [
                {"filename": "a.png", "mimeType": "image/png", "bytes": "aGVsbG8="},
                {"filename": "b.pdf", "mimeType": "application/pdf", "bytes": "aGVsbG8="}
            ]
        }"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        let InboundEvent::Submission(payload) = event else {
            panic!("expected submission");
        };
        assert_eq!(payload.channel, "chan1");
        assert_eq!(payload.submitter, 42);
        assert_eq!(payload.batch_label.as_deref(), Some("supply7"));
        assert_eq!(payload.images.len(), 2);
        assert_eq!(payload.images[0].filename, "a.png");
        assert_eq!(payload.images[0].mime_type, "image/png");
        assert_eq!(payload.images[0].bytes, "aGVsbG8=");
        assert_eq!(payload.images[1].mime_type, "application/pdf");
    }

    #[test]
    fn test_submission_label_is_optional() {
        let json = r#"{"type":"submission","channel":"c","submitter":1,"images":[]}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        let InboundEvent::Submission(payload) = event else {
            panic!("expected submission");
        };
        assert!(payload.batch_label.is_none());
    }

    #[test]
    fn test_control_actions_map_to_events() {
        let cases = [
            (r#"{"action":"previous"}"#, ReviewEvent::Previous),
            (r#"{"action":"next"}"#, ReviewEvent::Next),
            (r#"{"action":"approve"}"#, ReviewEvent::Approve),
            (r#"{"action":"reject"}"#, ReviewEvent::Reject { feedback: None }),
            (
                r#"{"action":"reject","feedback":"blurry"}"#,
                ReviewEvent::Reject { feedback: Some("blurry".to_string()) },
            ),
            (
                r#"{"action":"attach_feedback","index":2,"text":"cast"}"#,
                ReviewEvent::AttachFeedback { index: 2, text: "cast".to_string() },
            ),
            (
                r#"{"action":"retouch_again","index":1}"#,
                ReviewEvent::RetouchAgain { index: 1 },
            ),
            (r#"{"action":"cancel"}"#, ReviewEvent::Cancel),
        ];
        for (json, expected) in cases {
            let action: ControlAction = serde_json::from_str(json).unwrap();
            assert_eq!(control_event(action), expected);
        }
    }

    #[test]
    fn test_control_payload_carries_session_key() {
        let json = r#"{"type":"control","session":"chan:msg7","action":"approve"}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        let InboundEvent::Control(payload) = event else {
            panic!("expected control");
        };
        assert_eq!(payload.session, "chan:msg7");
        assert_eq!(payload.action, ControlAction::Approve);
    }
}
