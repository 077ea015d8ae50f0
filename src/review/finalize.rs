//! Finalize decision tree.
//!
//! Runs once per completion event: partitions images by outcome, routes
//! approved images to the asset store (or the local archive when no
//! store is configured), and builds the final report. Individual upload
//! failures never abort the pass; container-creation failure is a
//! terminal-but-retained outcome.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::drive::{ArchiveEntry, AssetStore, ContainerId, LocalArchive};

use super::session::ReviewSession;

/// Where the approved images ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Remote container; `link` is shareable.
    Store { link: String },
    /// Local fallback directory.
    Local { path: PathBuf },
}

/// Outcome of one finalize pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalReport {
    pub batch_label: String,
    pub approved_count: usize,
    pub rejected_count: usize,
    /// `None` when nothing was approved, or when the store failed
    /// before a destination existed.
    pub destination: Option<Destination>,
    /// Filenames that reached the primary (watermarked) destination.
    pub uploaded: Vec<String>,
    /// Container-creation failure, if any.
    pub store_error: Option<String>,
    /// Per-index feedback for rejected images (zero-based indices).
    pub rejected_feedback: Vec<(usize, Option<String>)>,
}

impl FinalReport {
    /// The session retires iff every image was approved and the pass
    /// produced a durable destination.
    pub fn session_retires(&self) -> bool {
        self.rejected_count == 0 && self.destination.is_some()
    }

    /// User-facing summary, sectioned like the review channel expects.
    pub fn summary(&self) -> String {
        let mut sections = Vec::new();

        if self.approved_count > 0 {
            match (&self.destination, &self.store_error) {
                (Some(Destination::Store { link }), _) => {
                    if self.uploaded.is_empty() {
                        sections.push(format!(
                            "⚠️ QC Complete for Supply ID: {}, but no images were uploaded successfully.",
                            self.batch_label
                        ));
                    } else {
                        sections.push(format!(
                            "✅ QC Complete for Supply ID: {}\n📁 Folder Link: {}\nBoth watermarked and non-watermarked versions are available in separate subfolders.",
                            self.batch_label, link
                        ));
                    }
                }
                (Some(Destination::Local { path }), _) => {
                    sections.push(format!(
                        "✅ QC Complete for Supply ID: {}\n{} images passed QC.\n⚠️ The asset store is not available, so {} images were saved locally in folder: {}\nBoth watermarked and non-watermarked versions are available in separate subfolders.",
                        self.batch_label,
                        self.approved_count,
                        self.uploaded.len(),
                        path.display()
                    ));
                }
                (None, Some(err)) => {
                    sections.push(format!(
                        "❌ QC Complete for Supply ID: {}, but failed to create storage folders: {}",
                        self.batch_label, err
                    ));
                }
                (None, None) => {}
            }
        }

        if self.rejected_count > 0 {
            let failed_nums = self
                .rejected_feedback
                .iter()
                .map(|(i, _)| (i + 1).to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let mut section = format!(
                "⚠️ QC Status for Supply ID: {}\nResults: {} passed, {} failed.\nFailed images: {}",
                self.batch_label, self.approved_count, self.rejected_count, failed_nums
            );
            for (index, feedback) in &self.rejected_feedback {
                if let Some(text) = feedback {
                    section.push_str(&format!("\n  Image {}: {}", index + 1, text));
                }
            }
            section.push_str("\nUse the 'Retouch Again' button on the failed images to retry.");
            sections.push(section);
        }

        sections.join("\n\n")
    }
}

/// Runs the finalize decision tree against a completed session.
pub async fn run(
    session: &ReviewSession,
    store: Option<&dyn AssetStore>,
    store_parent: Option<&ContainerId>,
    archive: &LocalArchive,
) -> FinalReport {
    let approved = session.approved_indices();
    let rejected = session.rejected_indices();
    let rejected_feedback = rejected
        .iter()
        .map(|&i| (i, session.feedback[i].clone()))
        .collect();

    let mut report = FinalReport {
        batch_label: session.batch_label.clone(),
        approved_count: approved.len(),
        rejected_count: rejected.len(),
        destination: None,
        uploaded: Vec::new(),
        store_error: None,
        rejected_feedback,
    };

    // Consistent policy: a batch with zero approvals makes no store calls.
    if approved.is_empty() {
        info!("finalize for {}: nothing approved, skipping store", session.batch_label);
        return report;
    }

    match store {
        Some(store) => route_to_store(session, store, store_parent, &approved, &mut report).await,
        None => route_to_archive(session, archive, &approved, &mut report),
    }

    report
}

async fn route_to_store(
    session: &ReviewSession,
    store: &dyn AssetStore,
    parent: Option<&ContainerId>,
    approved: &[usize],
    report: &mut FinalReport,
) {
    let main_name = format!("Approved_{}", session.batch_label);
    let main = match store.create_container(&main_name, parent).await {
        Ok(container) => container,
        Err(e) => {
            error!("finalize for {}: container creation failed: {:#}", session.batch_label, e);
            report.store_error = Some(e.to_string());
            return;
        }
    };

    let watermarked = match store.create_container("Watermarked", Some(&main.id)).await {
        Ok(container) => container,
        Err(e) => {
            error!("finalize for {}: subcontainer creation failed: {:#}", session.batch_label, e);
            report.store_error = Some(e.to_string());
            return;
        }
    };
    let no_watermark = match store.create_container("No_Watermark", Some(&main.id)).await {
        Ok(container) => container,
        Err(e) => {
            error!("finalize for {}: subcontainer creation failed: {:#}", session.batch_label, e);
            report.store_error = Some(e.to_string());
            return;
        }
    };

    for &index in approved {
        let record = &session.images[index];
        let filename = upload_filename(index);

        match store
            .upload(&record.processed_final, &filename, &watermarked.id)
            .await
        {
            Ok(_) => report.uploaded.push(filename.clone()),
            Err(e) => {
                warn!("finalize for {}: upload of {} failed: {:#}", session.batch_label, filename, e);
                continue;
            }
        }

        // The sibling variant is best-effort; its failure does not
        // remove the image from the success list.
        if let Err(e) = store
            .upload(&record.processed_no_watermark, &filename, &no_watermark.id)
            .await
        {
            warn!(
                "finalize for {}: no-watermark upload of {} failed: {:#}",
                session.batch_label, filename, e
            );
        }
    }

    report.destination = Some(Destination::Store { link: main.link });
}

fn route_to_archive(
    session: &ReviewSession,
    archive: &LocalArchive,
    approved: &[usize],
    report: &mut FinalReport,
) {
    let entries: Vec<ArchiveEntry> = approved
        .iter()
        .map(|&index| {
            let record = &session.images[index];
            ArchiveEntry {
                filename: upload_filename(index),
                watermarked: record.processed_final.clone(),
                no_watermark: record.processed_no_watermark.clone(),
            }
        })
        .collect();

    match archive.save_batch(&session.batch_label, &entries) {
        Ok((path, saved)) => {
            report.uploaded = saved;
            report.destination = Some(Destination::Local { path });
        }
        Err(e) => {
            error!("finalize for {}: local archive failed: {:#}", session.batch_label, e);
            report.store_error = Some(e.to_string());
        }
    }
}

fn upload_filename(index: usize) -> String {
    format!("processed_image_{}.png", index + 1)
}
