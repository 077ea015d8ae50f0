use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use retoucher::chat::ChatClient;
use retoucher::config::Config;
use retoucher::drive::{AssetStore, ContainerId, DriveClient, LocalArchive};
use retoucher::retouch::RetouchPipeline;
use retoucher::review::ReviewEngine;
use retoucher::{transport, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pipeline = RetouchPipeline::load(config.watermark_path.as_deref());
    if config.watermark_path.is_none() {
        info!("WATERMARK_PATH not set; watermarking disabled");
    }

    let asset_store: Option<Arc<dyn AssetStore>> = match &config.drive_access_token {
        Some(token) => Some(Arc::new(DriveClient::new(token.clone()))),
        None => {
            warn!("DRIVE_ACCESS_TOKEN not set; approved batches will be archived locally");
            None
        }
    };
    let store_parent = config.drive_parent_folder_id.clone().map(ContainerId);

    let engine = Arc::new(ReviewEngine::new(
        Arc::new(ChatClient::new(config.chat_bot_token.clone())),
        pipeline,
        asset_store,
        store_parent,
        LocalArchive::new(config.archive_dir.clone()),
    ));

    let state = AppState {
        engine,
        webhook_secret: Arc::from(config.event_webhook_secret.as_str()),
        channel_restriction: config.channel_id.clone(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, transport::router(state)).await?;
    Ok(())
}
