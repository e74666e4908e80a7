use anyhow::{bail, Result};
use std::sync::Arc;
use webcast_podcaster::http::{build_client, build_transfer_client};
use webcast_podcaster::storage::SpacesStore;
use webcast_podcaster::{ChannelInfo, Config, FfmpegTranscoder, HttpMediaTransfer, MediaTransfer, OutputFeedStore};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("webcast_podcaster=info,preflight=info")
        .init();

    info!("🔍 Checking transcoder availability...");
    let config = Config::load()?;
    let transcoder = FfmpegTranscoder::new(config.transcoder.clone());
    match transcoder.check_availability().await {
        Ok(banner) => info!("✅ {}", banner),
        Err(e) => {
            error!("❌ {}", e);
            info!("💡 Install ffmpeg (which ships ffprobe) or set transcoder.ffmpeg_path");
            bail!("transcoder check failed: {}", e);
        }
    }

    info!("⚙️  Validating configuration...");
    if let Err(e) = config.validate() {
        error!("❌ {}", e);
        bail!("configuration is invalid: {}", e);
    }
    info!("{}", config.summary());

    info!("📰 Checking podcast feed...");
    let store = SpacesStore::new(&config.storage, build_transfer_client(&config.http)?)?;
    let transfer: Arc<dyn MediaTransfer> = Arc::new(HttpMediaTransfer::new(
        build_client(&config.http)?,
        build_transfer_client(&config.http)?,
        store,
    ));
    let feed_store = OutputFeedStore::new(
        transfer,
        &config.podcast.feed_key,
        &config.scratch.dir,
        ChannelInfo::from(&config.podcast),
    );

    match feed_store.load().await {
        Ok(feed) => {
            info!("   - {}", feed_store.feed_url());
            info!("   - {} episodes", feed.len());
            info!(
                "   - latest activity: {}",
                feed.latest_activity_id().unwrap_or("none")
            );
        }
        Err(e) => {
            error!("❌ {}", e);
            bail!("podcast feed check failed: {}", e);
        }
    }

    if config.transcription.enabled {
        info!("🎤 Transcription enabled");
    } else {
        info!("🎤 Transcription disabled (set IBM_API_KEY and IBM_API_URL to enable)");
    }

    info!("🎉 All pipeline components ready!");
    Ok(())
}
