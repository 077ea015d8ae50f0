//! Review engine: session creation, control dispatch, and the effect
//! interpreter.
//!
//! The engine owns the session store and the real collaborators (the
//! outbound transport, the transform pipeline, the asset store). All
//! state decisions are delegated to the pure transition function; the
//! engine only executes the effects it returns and feeds transform
//! results back in.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::drive::{AssetStore, ContainerId, LocalArchive};
use crate::retouch::RetouchPipeline;

use super::effect::{Effect, Notice, RenderRequest};
use super::event::ReviewEvent;
use super::finalize::{self, FinalReport};
use super::session::{ChannelContext, ImageRecord, ReviewSession, SessionKey, SubmitterId};
use super::store::SessionStore;
use super::transition;

/// Outbound side of the chat platform, as the engine sees it.
///
/// Keys returned by `announce_processing` / `publish_review` address a
/// rendered message; the published review key doubles as the session
/// key. All methods are fallible; the engine treats render and notify
/// failures as degraded output, never as state rollback.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts the "processing" placeholder. Returns its message key.
    async fn announce_processing(
        &self,
        channel: &ChannelContext,
        image_count: usize,
    ) -> Result<SessionKey>;

    /// Publishes the interactive review message, replacing the
    /// placeholder when one exists. Returns the published message key.
    async fn publish_review(
        &self,
        channel: &ChannelContext,
        placeholder: Option<&SessionKey>,
        request: &RenderRequest,
    ) -> Result<SessionKey>;

    /// Re-renders an already-published review message in place.
    async fn render(&self, key: &SessionKey, request: &RenderRequest) -> Result<()>;

    /// Acknowledges the actor with a short notice.
    async fn notify(&self, key: &SessionKey, notice: &Notice) -> Result<()>;

    /// Posts free text to a channel.
    async fn announce(&self, channel: &ChannelContext, text: &str) -> Result<()>;

    /// Posts the finalize report to a channel.
    async fn report(&self, channel: &ChannelContext, report: &FinalReport) -> Result<()>;

    /// Strips the interactive controls from a retired review message.
    async fn retire_render(&self, key: &SessionKey) -> Result<()>;
}

/// One inbound attachment, already base64-decoded by the transport.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Only image-typed attachments enter the transform pass.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// A submitted batch, already decoded from the wire.
#[derive(Debug, Clone)]
pub struct Submission {
    pub channel: ChannelContext,
    pub submitter: SubmitterId,
    pub batch_label: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Session creation refusals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateSessionError {
    NoImageAttachments,
    NoProcessableImages,
}

impl fmt::Display for CreateSessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoImageAttachments => {
                write!(f, "no image attachments found in the submission")
            }
            Self::NoProcessableImages => {
                write!(f, "none of the attached images could be processed")
            }
        }
    }
}

impl std::error::Error for CreateSessionError {}

pub struct ReviewEngine {
    sessions: SessionStore,
    transport: Arc<dyn Transport>,
    pipeline: Arc<RetouchPipeline>,
    asset_store: Option<Arc<dyn AssetStore>>,
    store_parent: Option<ContainerId>,
    archive: LocalArchive,
}

impl ReviewEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        pipeline: RetouchPipeline,
        asset_store: Option<Arc<dyn AssetStore>>,
        store_parent: Option<ContainerId>,
        archive: LocalArchive,
    ) -> Self {
        Self {
            sessions: SessionStore::new(),
            transport,
            pipeline: Arc::new(pipeline),
            asset_store,
            store_parent,
            archive,
        }
    }

    /// Number of live sessions, for the health endpoint.
    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Handles a new batch submission end to end: placeholder, transform
    /// pass with drop policy, initial review render, rekey to the
    /// published message. Returns the key the review is reachable under.
    pub async fn submit(&self, submission: Submission) -> Result<SessionKey> {
        let channel = submission.channel.clone();

        let (eligible, skipped): (Vec<Attachment>, Vec<Attachment>) = submission
            .attachments
            .into_iter()
            .partition(Attachment::is_image);
        for attachment in &skipped {
            debug!(
                "skipping non-image attachment {} ({})",
                attachment.filename, attachment.mime_type
            );
        }
        if eligible.is_empty() {
            self.announce_best_effort(
                &channel,
                "❌ No image attachments found. Please attach images to your submission.",
            )
            .await;
            return Err(CreateSessionError::NoImageAttachments.into());
        }

        let image_count = eligible.len();
        let placeholder = match self
            .transport
            .announce_processing(&channel, image_count)
            .await
        {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("failed to post processing placeholder: {:#}", e);
                None
            }
        };

        // Drop policy: each image transforms independently; failures are
        // logged and the image gets no record.
        let mut records = Vec::with_capacity(image_count);
        for attachment in eligible {
            match self.transform(attachment.bytes.clone(), false).await {
                Ok(processed) => records.push(ImageRecord::new(
                    attachment.bytes,
                    processed.no_watermark,
                    processed.finalized,
                )),
                Err(e) => {
                    warn!("dropping {} from submission: {:#}", attachment.filename, e)
                }
            }
        }

        if records.is_empty() {
            self.announce_best_effort(
                &channel,
                "❌ Failed to process any of the attached images.",
            )
            .await;
            if let Some(key) = &placeholder {
                if let Err(e) = self.transport.retire_render(key).await {
                    warn!("failed to retire placeholder {}: {:#}", key, e);
                }
            }
            return Err(CreateSessionError::NoProcessableImages.into());
        }

        let label = submission
            .batch_label
            .unwrap_or_else(ReviewSession::generated_label);
        let kept = records.len();
        let session = ReviewSession::new(label.clone(), submission.submitter, channel.clone(), records);
        let request = transition::render_request(&session);

        let provisional = SessionKey::provisional();
        self.sessions.insert(provisional.clone(), session).await;

        let published = match self
            .transport
            .publish_review(&channel, placeholder.as_ref(), &request)
            .await
            .context("failed to publish the review message")
        {
            Ok(key) => key,
            Err(e) => {
                self.sessions.remove(&provisional).await;
                self.announce_best_effort(
                    &channel,
                    "❌ Failed to start the QC review for this submission.",
                )
                .await;
                return Err(e);
            }
        };

        self.sessions.rekey(&provisional, published.clone()).await;
        info!(
            "review session {} started for batch {} ({} of {} images kept)",
            published, label, kept, image_count
        );
        Ok(published)
    }

    /// Dispatches one control event against a live session. Unknown keys
    /// and busy sessions are acknowledged without touching state.
    pub async fn handle_control(&self, key: &SessionKey, event: ReviewEvent) -> Result<()> {
        info!("control event on {}: {}", key, event.log_summary());

        let Some(handle) = self.sessions.get(key).await else {
            self.notify_best_effort(key, &Notice::SessionNotFound).await;
            return Ok(());
        };

        // Per-session serialization: a second action while one is in
        // flight is refused, not queued against stale state.
        let Ok(mut session) = handle.try_lock() else {
            self.notify_best_effort(key, &Notice::SessionBusy).await;
            return Ok(());
        };

        let effects = transition::apply(&mut session, event);
        self.run_effects(key, &mut session, effects).await;
        Ok(())
    }

    /// Executes effects in order. `Reprocess` feeds its result back
    /// through the transition function and appends the follow-up effects.
    async fn run_effects(
        &self,
        key: &SessionKey,
        session: &mut ReviewSession,
        effects: Vec<Effect>,
    ) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Render(request) => {
                    if let Err(e) = self.transport.render(key, &request).await {
                        warn!("render for {} failed: {:#}", key, e);
                        self.notify_best_effort(key, &Notice::RenderDegraded).await;
                    }
                }

                Effect::Notify(notice) => {
                    self.notify_best_effort(key, &notice).await;
                }

                Effect::Reprocess { index } => {
                    let source = session.images[index].source_bytes.clone();
                    let event = match self.transform(source, true).await {
                        Ok(processed) => ReviewEvent::ReprocessCompleted {
                            index,
                            processed_no_watermark: processed.no_watermark,
                            processed_final: processed.finalized,
                        },
                        Err(e) => ReviewEvent::ReprocessFailed {
                            index,
                            error: e.to_string(),
                        },
                    };
                    queue.extend(transition::apply(session, event));
                }

                Effect::Finalize => {
                    let report = finalize::run(
                        session,
                        self.asset_store.as_deref(),
                        self.store_parent.as_ref(),
                        &self.archive,
                    )
                    .await;
                    info!(
                        "finalized batch {}: {} approved, {} rejected, retires: {}",
                        report.batch_label,
                        report.approved_count,
                        report.rejected_count,
                        report.session_retires()
                    );
                    if let Err(e) = self.transport.report(&session.channel, &report).await {
                        warn!("failed to post report for {}: {:#}", report.batch_label, e);
                    }
                    if report.session_retires() {
                        queue.push_back(Effect::Retire);
                    }
                }

                Effect::Retire => {
                    self.sessions.remove(key).await;
                    if let Err(e) = self.transport.retire_render(key).await {
                        warn!("failed to retire render for {}: {:#}", key, e);
                    }
                    info!("session {} retired", key);
                }
            }
        }
    }

    /// Runs one transform off the async runtime. `strengthened` selects
    /// the retouch-again variant.
    async fn transform(
        &self,
        source: Vec<u8>,
        strengthened: bool,
    ) -> Result<crate::retouch::ProcessedImage> {
        let pipeline = self.pipeline.clone();
        tokio::task::spawn_blocking(move || {
            if strengthened {
                pipeline.reprocess(&source)
            } else {
                pipeline.process(&source)
            }
        })
        .await
        .context("transform task panicked")?
    }

    async fn notify_best_effort(&self, key: &SessionKey, notice: &Notice) {
        if let Err(e) = self.transport.notify(key, notice).await {
            warn!("failed to notify on {}: {:#}", key, e);
        }
    }

    async fn announce_best_effort(&self, channel: &ChannelContext, text: &str) {
        if let Err(e) = self.transport.announce(channel, text).await {
            warn!("failed to announce in {}: {:#}", channel, e);
        }
    }
}
