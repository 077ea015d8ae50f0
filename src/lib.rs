//! Chat-driven image retouching bot with an interactive QC review
//! workflow.
//!
//! Submitted image batches are retouched and watermarked, then walked
//! through a per-image pass/fail review driven by chat controls. Fully
//! reviewed batches are routed to the asset store (or a local archive)
//! and reported back to the channel.

pub mod chat;
pub mod config;
pub mod drive;
pub mod retouch;
pub mod review;
pub mod transport;

use std::sync::Arc;

use review::ReviewEngine;

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReviewEngine>,
    pub webhook_secret: Arc<str>,
    pub channel_restriction: Option<String>,
}
