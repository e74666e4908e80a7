use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{parse_feed, to_xml, ChannelInfo, Enclosure, Episode, OutputFeed};
use crate::error::{PipelineError, Result};
use crate::progress::ProgressReporter;
use crate::transfer::{content_type_for, MediaTransfer};

/// Owns the read / serialize / write lifecycle of the podcast feed document
pub struct OutputFeedStore {
    transfer: Arc<dyn MediaTransfer>,
    feed_key: String,
    scratch_dir: PathBuf,
    defaults: ChannelInfo,
}

impl OutputFeedStore {
    /// `defaults.feed_url` is replaced by the public URL of `feed_key`
    pub fn new(
        transfer: Arc<dyn MediaTransfer>,
        feed_key: &str,
        scratch_dir: &Path,
        mut defaults: ChannelInfo,
    ) -> Self {
        defaults.feed_url = transfer.public_url(feed_key);
        Self {
            transfer,
            feed_key: feed_key.to_string(),
            scratch_dir: scratch_dir.to_path_buf(),
            defaults,
        }
    }

    /// Public URL of the feed document
    pub fn feed_url(&self) -> &str {
        &self.defaults.feed_url
    }

    /// Fetch and parse the feed; a missing document is an empty feed
    pub async fn load(&self) -> Result<OutputFeed> {
        let feed_url = self.feed_url();
        info!("📥 Loading podcast feed: {}", feed_url);

        let document = self
            .transfer
            .fetch_document(feed_url)
            .await
            .map_err(|e| PipelineError::FeedUnavailable(format!("{}: {}", feed_url, e.root())))?;

        let feed = match document {
            Some(content) => parse_feed(&content, &self.defaults)?,
            None => {
                info!("🆕 No podcast feed at {}, starting a new one", feed_url);
                OutputFeed::new(self.defaults.clone(), Vec::new())
            }
        };

        info!(
            "📋 Podcast feed has {} episodes, latest: {}",
            feed.len(),
            feed.latest_activity_id().unwrap_or("none")
        );
        Ok(feed)
    }

    /// Attach the published audio to `episode`, register it and republish the feed.
    ///
    /// The in-memory feed keeps the episode even when writing fails.
    pub async fn append(
        &self,
        feed: &mut OutputFeed,
        mut episode: Episode,
        local_audio: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let audio_key = local_audio
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PipelineError::FeedWrite(format!("Invalid audio file name: {}", local_audio.display()))
            })?;

        let size_bytes = tokio::fs::metadata(local_audio)
            .await
            .map_err(|e| PipelineError::FeedWrite(format!("{}: {}", local_audio.display(), e)))?
            .len();

        episode.enclosure = Some(Enclosure {
            url: self.transfer.public_url(audio_key),
            size_bytes,
            mime_type: content_type_for(local_audio).to_string(),
        });
        debug!("Registering episode {} ({} bytes)", episode.guid, size_bytes);
        feed.register(episode);

        let document = to_xml(feed)?;
        let file_name = self.feed_key.rsplit('/').next().unwrap_or(&self.feed_key);
        let local_feed = self.scratch_dir.join(file_name);
        tokio::fs::write(&local_feed, document)
            .await
            .map_err(|e| PipelineError::FeedWrite(format!("{}: {}", local_feed.display(), e)))?;

        self.transfer
            .upload(&local_feed, &self.feed_key, progress)
            .await
            .map_err(|e| PipelineError::FeedWrite(e.root().to_string()))?;

        if let Err(e) = tokio::fs::remove_file(&local_feed).await {
            warn!("Failed to remove {}: {}", local_feed.display(), e);
        }

        info!("📰 Podcast feed updated: {} episodes", feed.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::tests::{channel, episode};
    use crate::progress::NoopReporter;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryBucket {
        objects: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl MediaTransfer for MemoryBucket {
        async fn download(&self, _: &str, _: &Path, _: &dyn ProgressReporter) -> Result<u64> {
            unreachable!("the feed store never downloads media")
        }

        async fn upload(&self, local_path: &Path, remote_key: &str, _: &dyn ProgressReporter) -> Result<()> {
            let body = std::fs::read_to_string(local_path).unwrap();
            self.objects.lock().unwrap().insert(remote_key.to_string(), body);
            Ok(())
        }

        async fn resolve_redirect(&self, url: &str) -> Result<String> {
            Ok(url.to_string())
        }

        async fn fetch_document(&self, url: &str) -> Result<Option<String>> {
            let key = url.trim_start_matches("https://bucket.example/");
            Ok(self.objects.lock().unwrap().get(key).cloned())
        }

        fn public_url(&self, remote_key: &str) -> String {
            format!("https://bucket.example/{}", remote_key)
        }
    }

    fn store(bucket: Arc<MemoryBucket>, scratch: &TempDir) -> OutputFeedStore {
        OutputFeedStore::new(bucket, "feed.xml", scratch.path(), channel())
    }

    #[test]
    fn test_missing_feed_loads_empty() {
        let scratch = TempDir::new().unwrap();
        let store = store(Arc::default(), &scratch);

        let feed = tokio_test::block_on(store.load()).unwrap();
        assert!(feed.is_empty());
        assert_eq!(feed.channel.title, "Council Meetings");
        assert_eq!(feed.channel.feed_url, "https://bucket.example/feed.xml");
    }

    #[test]
    fn test_error_page_is_not_an_empty_feed() {
        let scratch = TempDir::new().unwrap();
        let bucket = Arc::new(MemoryBucket::default());
        bucket
            .objects
            .lock()
            .unwrap()
            .insert("feed.xml".to_string(), "<Error><Code>AccessDenied</Code></Error>".to_string());

        let result = tokio_test::block_on(store(bucket, &scratch).load());
        assert!(matches!(result, Err(PipelineError::FeedUnavailable(_))));
    }

    #[test]
    fn test_append_publishes_feed_with_enclosure() {
        let scratch = TempDir::new().unwrap();
        let bucket = Arc::new(MemoryBucket::default());
        let store = store(bucket.clone(), &scratch);

        let audio = scratch.path().join("1616096362038_548471.mp3");
        std::fs::write(&audio, vec![0u8; 1234]).unwrap();

        let mut feed = OutputFeed::new(channel(), vec![episode("https://x/548470")]);
        tokio_test::block_on(store.append(
            &mut feed,
            episode("https://x/548471"),
            &audio,
            &NoopReporter,
        ))
        .unwrap();

        assert_eq!(feed.latest_activity_id(), Some("548471"));
        let enclosure = feed.items()[0].enclosure.clone().unwrap();
        assert_eq!(enclosure.url, "https://bucket.example/1616096362038_548471.mp3");
        assert_eq!(enclosure.size_bytes, 1234);

        let reloaded = tokio_test::block_on(store.load()).unwrap();
        assert_eq!(reloaded.items(), feed.items());
        assert!(!scratch.path().join("feed.xml").exists());
    }
}
