use anyhow::{Context, Result};
use clap::Command;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use webcast_podcaster::{Config, PipelineOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    Command::new("webcast-podcaster")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Publishes new council webcasts as podcast episodes")
        .get_matches();

    let config = Config::load().context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("webcast_podcaster={},warn", config.logging.level))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 Webcast Podcaster starting...");
    config.validate().context("Invalid configuration")?;
    info!("{}", config.summary());

    let pipeline = PipelineOrchestrator::from_config(config)?;

    match pipeline.run().await {
        Ok(summary) => {
            info!("✅ Published: {}", summary.published.len());
            for id in &summary.published {
                info!("   - {}", id);
            }
            if !summary.skipped.is_empty() {
                info!("⏭️  Skipped (not available): {}", summary.skipped.join(", "));
            }
            if !summary.transcripts.is_empty() {
                info!("📝 Transcripts: {}", summary.transcripts.join(", "));
            }
            match &summary.stopped_at {
                Some(id) => info!("🛑 Stopped at already published episode {}", id),
                None => info!("📭 Reached the end of the source feed"),
            }
            Ok(())
        }
        Err(e) => {
            error!("❌ Run aborted: {}", e);
            Err(e).context("Ingestion run failed")
        }
    }
}
