//! Runtime configuration, read from the environment at startup.

use std::path::PathBuf;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Credential for the outbound chat REST API.
    pub chat_bot_token: String,
    /// HMAC secret for inbound event signatures.
    pub event_webhook_secret: String,
    /// When set, submissions from other channels are ignored.
    pub channel_id: Option<String>,
    /// Asset-store bearer token. Absent means local-archive fallback.
    pub drive_access_token: Option<String>,
    /// Parent container for approved-batch folders.
    pub drive_parent_folder_id: Option<String>,
    /// Watermark asset path. Absent disables watermarking.
    pub watermark_path: Option<PathBuf>,
    /// Root directory for the local-archive fallback.
    pub archive_dir: PathBuf,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |name: &str| get(name).filter(|v| !v.is_empty());
        let required = |name: &str| {
            optional(name).with_context(|| format!("{name} environment variable not set"))
        };

        let port = match optional("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {raw}"))?,
            None => 3000,
        };

        Ok(Self {
            chat_bot_token: required("CHAT_BOT_TOKEN")?,
            event_webhook_secret: required("EVENT_WEBHOOK_SECRET")?,
            channel_id: optional("CHANNEL_ID"),
            drive_access_token: optional("DRIVE_ACCESS_TOKEN"),
            drive_parent_folder_id: optional("DRIVE_PARENT_FOLDER_ID"),
            watermark_path: optional("WATERMARK_PATH").map(PathBuf::from),
            archive_dir: optional("ARCHIVE_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            port,
        })
    }
}
