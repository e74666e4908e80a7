use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::audio::{FfmpegTranscoder, Transcoder};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::feed::{is_newer_than, ChannelInfo, Episode, OutputFeed, OutputFeedStore};
use crate::http;
use crate::media::{self, redirect_url, AvailabilityPolicy, MarkerAvailability, ResolvedMedia, ResolvedVideo};
use crate::progress::{LogReporter, SharedProgressReporter};
use crate::source::{RssSourceReader, SourceFeed, SourceItem};
use crate::state::{ItemOutcome, ItemProgress, ItemStage, RunSummary};
use crate::storage::SpacesStore;
use crate::transcription::{create_speech_client, SpeechToText, Transcriber};
use crate::transfer::{HttpMediaTransfer, MediaTransfer};

/// Drives source items through resolve, fetch, transcode, publish, register,
/// cleanup and (optionally) transcribe, one item at a time
pub struct PipelineOrchestrator {
    config: Config,
    source: Arc<dyn SourceFeed>,
    transfer: Arc<dyn MediaTransfer>,
    transcoder: Arc<dyn Transcoder>,
    availability: Arc<dyn AvailabilityPolicy>,
    transcriber: Option<Transcriber>,
    feed_store: OutputFeedStore,
    progress: SharedProgressReporter,
}

impl PipelineOrchestrator {
    /// Wire the production collaborators from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        info!("🔧 Initializing pipeline");

        let client = http::build_client(&config.http)?;
        let transfer_client = http::build_transfer_client(&config.http)?;
        let store = SpacesStore::new(&config.storage, transfer_client.clone())?;

        let transfer: Arc<dyn MediaTransfer> =
            Arc::new(HttpMediaTransfer::new(client.clone(), transfer_client, store));
        let source = Arc::new(RssSourceReader::new(client));
        let transcoder = Arc::new(FfmpegTranscoder::new(config.transcoder.clone()));

        let speech = if config.transcription.enabled {
            info!("🎤 Transcription enabled");
            Some(create_speech_client(&config.transcription)?)
        } else {
            None
        };

        Ok(Self::new(config, source, transfer, transcoder, speech))
    }

    pub fn new(
        config: Config,
        source: Arc<dyn SourceFeed>,
        transfer: Arc<dyn MediaTransfer>,
        transcoder: Arc<dyn Transcoder>,
        speech: Option<Arc<dyn SpeechToText>>,
    ) -> Self {
        let feed_store = OutputFeedStore::new(
            transfer.clone(),
            &config.podcast.feed_key,
            &config.scratch.dir,
            ChannelInfo::from(&config.podcast),
        );
        let transcriber = speech.map(|client| {
            Transcriber::new(client, transfer.clone(), &config.transcription.content_type)
        });
        let availability = Arc::new(MarkerAvailability::new(&config.source.unavailable_marker));

        Self {
            config,
            source,
            transfer,
            transcoder,
            availability,
            transcriber,
            feed_store,
            progress: Arc::new(LogReporter::new()),
        }
    }

    pub fn with_availability(mut self, policy: Arc<dyn AvailabilityPolicy>) -> Self {
        self.availability = policy;
        self
    }

    pub fn with_progress(mut self, reporter: SharedProgressReporter) -> Self {
        self.progress = reporter;
        self
    }

    pub fn feed_store(&self) -> &OutputFeedStore {
        &self.feed_store
    }

    /// Publish every new, available item until the first one already in the feed.
    ///
    /// The first stage failure aborts the run.
    pub async fn run(&self) -> Result<RunSummary> {
        let start_time = Instant::now();
        let scratch_dir = &self.config.scratch.dir;

        tokio::fs::create_dir_all(scratch_dir).await.map_err(|e| {
            PipelineError::Config(format!("Cannot create scratch dir {}: {}", scratch_dir.display(), e))
        })?;
        if self.config.scratch.sweep_on_start {
            media::sweep_scratch(scratch_dir)?;
        }

        info!("🚀 Starting ingestion run");
        let items = self
            .source
            .fetch_source_items(&self.config.source.feed_url)
            .await?;
        let mut feed = self.feed_store.load().await?;

        // episodes registered during the run never move the baseline
        let baseline = feed.latest_activity_id().map(str::to_string);

        let mut summary = RunSummary::default();
        for item in &items {
            let Some(activity_id) = item.activity_id() else {
                warn!("⚠️  No activity id in link {:?}, skipping '{}'", item.link, item.title);
                continue;
            };

            let outcome = self
                .process_item(item, &activity_id, baseline.as_deref(), &mut feed)
                .await?;
            let stop = matches!(outcome, ItemOutcome::Stopped { .. });
            summary.record(outcome);
            if stop {
                break;
            }
        }

        info!(
            "🎉 Run finished in {:.1}s: {} published, {} skipped",
            start_time.elapsed().as_secs_f64(),
            summary.published.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    async fn process_item(
        &self,
        item: &SourceItem,
        activity_id: &str,
        baseline: Option<&str>,
        feed: &mut OutputFeed,
    ) -> Result<ItemOutcome> {
        let mut progress = ItemProgress::new(activity_id);
        let reporter = self.progress.as_ref();
        debug!("Discovered {} '{}'", activity_id, item.title);

        let redirect = redirect_url(&self.config.source.redirect_url_template, activity_id);
        let resolved = self
            .transfer
            .resolve_redirect(&redirect)
            .await
            .map_err(|e| e.at_stage(activity_id, progress.pending()))?;
        progress.advance(ItemStage::Resolved);

        let video = ResolvedVideo::classify(resolved, self.availability.as_ref());
        if let ResolvedVideo::Unavailable { resolved_url } = video {
            info!("⏭️  {} is not available ({}), skipping", activity_id, resolved_url);
            return Ok(ItemOutcome::Skipped {
                activity_id: activity_id.to_string(),
                resolved_url,
            });
        }

        if !is_newer_than(activity_id, baseline) {
            info!("🛑 {} is already in the podcast feed, stopping", activity_id);
            return Ok(ItemOutcome::Stopped {
                activity_id: activity_id.to_string(),
            });
        }

        info!("🆕 New episode {}: {}", activity_id, item.title);
        let media = ResolvedMedia::new(
            activity_id,
            video,
            &self.config.scratch.dir,
            Utc::now().timestamp_millis(),
            &self.config.source.video_extension,
            &self.config.transcoder.audio_extension,
        );

        self.transfer
            .download(media.video.url(), &media.local_video_path, reporter)
            .await
            .map_err(|e| e.at_stage(activity_id, progress.pending()))?;
        progress.advance(ItemStage::Fetched);

        self.transcoder
            .convert(&media.local_video_path, &media.local_audio_path, reporter)
            .await
            .map_err(|e| e.at_stage(activity_id, progress.pending()))?;
        progress.advance(ItemStage::Transcoded);

        let audio_key = media.audio_key();
        self.transfer
            .upload(&media.local_audio_path, &audio_key, reporter)
            .await
            .map_err(|e| e.at_stage(activity_id, progress.pending()))?;
        progress.advance(ItemStage::Published);

        let episode = Episode::from_source(item, activity_id);
        self.feed_store
            .append(feed, episode, &media.local_audio_path, reporter)
            .await
            .map_err(|e| e.at_stage(activity_id, progress.pending()))?;
        progress.advance(ItemStage::Registered);

        remove_scratch_file(&media.local_video_path).await;
        progress.advance(ItemStage::CleanedUp);

        let transcript_id = match &self.transcriber {
            Some(transcriber) => {
                let id = transcriber
                    .transcribe(&media.local_audio_path, reporter)
                    .await
                    .map_err(|e| e.at_stage(activity_id, progress.pending()))?;
                progress.advance(ItemStage::Transcribed);

                for ext in ["json", "txt"] {
                    remove_scratch_file(&media.local_audio_path.with_extension(ext)).await;
                }
                Some(id)
            }
            None => None,
        };
        remove_scratch_file(&media.local_audio_path).await;

        info!(
            "✅ Episode {} published in {:.1}s",
            activity_id,
            progress.total_time().as_secs_f64()
        );
        Ok(ItemOutcome::Completed {
            activity_id: activity_id.to_string(),
            audio_key,
            transcript_id,
        })
    }
}

async fn remove_scratch_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
