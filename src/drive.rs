//! Asset store boundary: remote folder/upload client and the local
//! fallback archive.
//!
//! The engine only depends on the `AssetStore` trait; `DriveClient`
//! implements it against the Drive v3 REST surface (folder creation,
//! binary upload, public-read grant). Credential acquisition is out of
//! scope: the client accepts a ready bearer token.

use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Newtype for a destination container (folder) identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A created container plus its shareable link.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: ContainerId,
    pub link: String,
}

/// Newtype for an uploaded asset identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetId(pub String);

/// Remote storage operations the finalize pass needs. Each call fails
/// or succeeds independently; the caller decides what a failure means.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn create_container(&self, name: &str, parent: Option<&ContainerId>) -> Result<Container>;

    async fn upload(&self, bytes: &[u8], name: &str, container: &ContainerId) -> Result<AssetId>;
}

// =============================================================================
// Drive REST client
// =============================================================================

#[derive(Clone)]
pub struct DriveClient {
    client: reqwest::Client,
    access_token: String,
}

#[derive(Debug, Serialize)]
struct FolderMetadata<'a> {
    name: &'a str,
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct DriveFileResponse {
    id: String,
    #[serde(rename = "webViewLink")]
    web_view_link: Option<String>,
}

#[derive(Debug, Serialize)]
struct PermissionRequest<'a> {
    #[serde(rename = "type")]
    grantee_type: &'a str,
    role: &'a str,
}

impl DriveClient {
    pub fn new(access_token: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("retoucher/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");
        Self { client, access_token }
    }

    /// Grants anyone-with-the-link read access.
    async fn grant_public_read(&self, file_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/files/{}/permissions", DRIVE_API, file_id))
            .bearer_auth(&self.access_token)
            .json(&PermissionRequest { grantee_type: "anyone", role: "reader" })
            .send()
            .await
            .context("failed to send permission request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Drive permissions API error: {} - {}", status, body));
        }
        Ok(())
    }
}

/// Builds a `multipart/related` body (metadata JSON + binary part),
/// which is what the Drive upload endpoint expects.
fn multipart_related(boundary: &str, metadata: &str, mime: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: {mime}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl AssetStore for DriveClient {
    async fn create_container(&self, name: &str, parent: Option<&ContainerId>) -> Result<Container> {
        let metadata = FolderMetadata {
            name,
            mime_type: FOLDER_MIME,
            parents: parent.map(|p| vec![p.0.clone()]),
        };

        let response = self
            .client
            .post(format!("{}/files?fields=id,webViewLink", DRIVE_API))
            .bearer_auth(&self.access_token)
            .json(&metadata)
            .send()
            .await
            .context("failed to send folder creation request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Drive files API error: {} - {}", status, body));
        }

        let folder: DriveFileResponse = response
            .json()
            .await
            .context("failed to parse folder creation response")?;

        self.grant_public_read(&folder.id).await?;

        Ok(Container {
            link: folder.web_view_link.unwrap_or_default(),
            id: ContainerId(folder.id),
        })
    }

    async fn upload(&self, bytes: &[u8], name: &str, container: &ContainerId) -> Result<AssetId> {
        let metadata = serde_json::to_string(&FileMetadata {
            name,
            parents: Some(vec![container.0.clone()]),
        })
        .context("failed to serialize upload metadata")?;

        let boundary = format!("retoucher-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &metadata, "image/png", bytes);

        let response = self
            .client
            .post(format!("{}/files?uploadType=multipart&fields=id", DRIVE_UPLOAD_API))
            .bearer_auth(&self.access_token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .context("failed to send upload request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Drive upload API error: {} - {}", status, body));
        }

        let file: DriveFileResponse = response
            .json()
            .await
            .context("failed to parse upload response")?;

        self.grant_public_read(&file.id).await?;

        Ok(AssetId(file.id))
    }
}

// =============================================================================
// Local fallback
// =============================================================================

/// One approved image heading for persistence.
pub struct ArchiveEntry {
    pub filename: String,
    pub watermarked: Vec<u8>,
    pub no_watermark: Vec<u8>,
}

/// Filesystem fallback used when no store credential is configured or
/// the store is unreachable. Mirrors the remote layout:
/// `approved_images_<label>/{watermarked,no_watermark}/`.
pub struct LocalArchive {
    root: PathBuf,
}

impl LocalArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes every entry, skipping individual failures. Returns the
    /// batch directory and the filenames fully written.
    pub fn save_batch(
        &self,
        batch_label: &str,
        entries: &[ArchiveEntry],
    ) -> Result<(PathBuf, Vec<String>)> {
        let batch_dir = self.root.join(format!("approved_images_{}", sanitize_label(batch_label)));
        let watermarked_dir = batch_dir.join("watermarked");
        let no_watermark_dir = batch_dir.join("no_watermark");
        std::fs::create_dir_all(&watermarked_dir)
            .with_context(|| format!("failed to create {}", watermarked_dir.display()))?;
        std::fs::create_dir_all(&no_watermark_dir)
            .with_context(|| format!("failed to create {}", no_watermark_dir.display()))?;

        let mut saved = Vec::new();
        for entry in entries {
            let result = std::fs::write(watermarked_dir.join(&entry.filename), &entry.watermarked)
                .and_then(|_| {
                    std::fs::write(no_watermark_dir.join(&entry.filename), &entry.no_watermark)
                });
            match result {
                Ok(()) => saved.push(entry.filename.clone()),
                Err(e) => warn!("failed to archive {}: {}", entry.filename, e),
            }
        }
        Ok((batch_dir, saved))
    }
}

/// Batch labels are free-form text; keep them filesystem-safe.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
