use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PipelineError, Result};

/// Placeholder substituted into the redirect template
pub const ACTIVITY_ID_PLACEHOLDER: &str = "{activity_id}";

/// Configuration for the webcast podcaster
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Upstream webcast feed settings
    pub source: SourceConfig,

    /// Object storage (S3-compatible) settings
    pub storage: StorageConfig,

    /// Output podcast feed settings
    pub podcast: PodcastConfig,

    /// ffmpeg settings
    pub transcoder: TranscoderConfig,

    /// Speech-to-text settings
    pub transcription: TranscriptionConfig,

    /// HTTP client settings
    pub http: HttpConfig,

    /// Local scratch directory settings
    pub scratch: ScratchConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// RSS/Atom feed listing recent webcasts, newest first
    pub feed_url: String,

    /// Stable "latest video" link, `{activity_id}` is substituted
    pub redirect_url_template: String,

    /// Substring of a resolved URL that marks a withdrawn recording
    pub unavailable_marker: String,

    /// Extension used for downloaded video files
    pub video_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Endpoint host, e.g. `ams3.digitaloceanspaces.com`
    pub endpoint: String,

    /// Bucket (space) name
    pub bucket: String,

    /// Signing region
    pub region: String,

    pub access_key: String,

    pub secret_key: String,

    /// Lifetime of presigned upload URLs (seconds)
    pub presign_expiry_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PodcastConfig {
    /// Object key of the podcast feed document
    pub feed_key: String,

    /// Channel title used when the feed does not exist yet
    pub title: String,

    pub description: String,

    /// Website the podcast belongs to
    pub site_url: String,

    pub author: String,

    pub language: String,

    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub ffmpeg_path: String,

    pub ffprobe_path: String,

    /// Audio encoder passed to `-acodec`
    pub audio_codec: String,

    /// Audio bitrate passed to `-b:a`
    pub audio_bitrate: String,

    /// Extension of the produced audio files
    pub audio_extension: String,

    /// Hard limit for one conversion (seconds)
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Run the transcription stage after publishing
    pub enabled: bool,

    /// Speech service API key
    pub api_key: Option<String>,

    /// Speech service instance URL
    pub service_url: Option<String>,

    /// Content type sent with the audio
    pub content_type: String,

    /// Recognition model, service default when unset
    pub model: Option<String>,

    /// Timeout for the recognize call (seconds)
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,

    /// Request timeout for feed and redirect requests (seconds)
    pub timeout_seconds: u64,

    /// Request timeout for media downloads and uploads (seconds)
    pub transfer_timeout_seconds: u64,

    pub connect_timeout_seconds: u64,

    pub max_redirects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Directory for in-flight video, audio and transcript files
    pub dir: PathBuf,

    /// Remove leftovers of an aborted run before starting
    pub sweep_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this crate when `RUST_LOG` is not set
    pub level: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            feed_url: "https://dublincity.public-i.tv/core/data/7844".to_string(),
            redirect_url_template:
                "https://dublincity.public-i.tv/core/redirect/download_webcast/{activity_id}/video.mp4"
                    .to_string(),
            unavailable_marker: "not-available".to_string(),
            video_extension: "mp4".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            region: "us-east-1".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            presign_expiry_seconds: 3600,
        }
    }
}

impl Default for PodcastConfig {
    fn default() -> Self {
        Self {
            feed_key: "dcc_audio.xml".to_string(),
            title: "Dublin City Council Meetings".to_string(),
            description: "Audio recordings of Dublin City Council webcasts".to_string(),
            site_url: "https://dublincity.public-i.tv/core/portal/home".to_string(),
            author: "Dublin City Council".to_string(),
            language: "en-ie".to_string(),
            image_url: None,
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            audio_codec: "libmp3lame".to_string(),
            audio_bitrate: "128k".to_string(),
            audio_extension: "mp3".to_string(),
            timeout_seconds: 4 * 3600, // council meetings run long
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            service_url: None,
            content_type: "audio/mp3".to_string(),
            model: None,
            timeout_seconds: 3600,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("webcast-podcaster/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 30,
            transfer_timeout_seconds: 2 * 3600,
            connect_timeout_seconds: 15,
            max_redirects: 10,
        }
    }
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./tmp"),
            sweep_on_start: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the first readable file, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_paths = [
            "webcast-podcaster.toml",
            "config/webcast-podcaster.toml",
            "/etc/webcast-podcaster/config.toml",
        ];

        let mut config = None;
        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                let parsed: Config = toml::from_str(&config_str).map_err(|e| {
                    PipelineError::Config(format!("Failed to parse config file {}: {}", path, e))
                })?;
                tracing::info!("📄 Loaded configuration from: {}", path);
                config = Some(parsed);
                break;
            }
        }

        let mut config = config.unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override settings from environment variables, looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bucket) = non_empty("DO_SPACES_NAME") {
            self.storage.bucket = bucket;
        }
        if let Some(endpoint) = non_empty("DO_SPACES_ENDPOINT") {
            self.storage.endpoint = endpoint;
        }
        if let Some(key) = non_empty("DO_SPACES_KEY") {
            self.storage.access_key = key;
        }
        if let Some(secret) = non_empty("DO_SPACES_SECRET") {
            self.storage.secret_key = secret;
        }
        if let Some(region) = non_empty("DO_SPACES_REGION") {
            self.storage.region = region;
        }

        let api_key = non_empty("IBM_API_KEY");
        let service_url = non_empty("IBM_API_URL");
        if api_key.is_some() && service_url.is_some() {
            self.transcription.enabled = true;
        }
        if let Some(key) = api_key {
            self.transcription.api_key = Some(key);
        }
        if let Some(url) = service_url {
            self.transcription.service_url = Some(url);
        }

        if let Some(feed_url) = non_empty("PODCASTER_SOURCE_FEED_URL") {
            self.source.feed_url = feed_url;
        }
        if let Some(feed_key) = non_empty("PODCASTER_FEED_KEY") {
            self.podcast.feed_key = feed_key;
        }
        if let Some(dir) = non_empty("PODCASTER_SCRATCH_DIR") {
            self.scratch.dir = PathBuf::from(dir);
        }
        if let Some(level) = non_empty("PODCASTER_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, config_str)
            .map_err(|e| PipelineError::Config(format!("Failed to write {}: {}", path, e)))?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let storage = &self.storage;
        if storage.endpoint.is_empty() || storage.bucket.is_empty() {
            return Err(PipelineError::Config(
                "storage endpoint and bucket are required (DO_SPACES_ENDPOINT, DO_SPACES_NAME)"
                    .to_string(),
            ));
        }
        if storage.access_key.is_empty() || storage.secret_key.is_empty() {
            return Err(PipelineError::Config(
                "storage credentials are required (DO_SPACES_KEY, DO_SPACES_SECRET)".to_string(),
            ));
        }

        if !self
            .source
            .redirect_url_template
            .contains(ACTIVITY_ID_PLACEHOLDER)
        {
            return Err(PipelineError::Config(format!(
                "redirect_url_template must contain {}",
                ACTIVITY_ID_PLACEHOLDER
            )));
        }
        if self.source.unavailable_marker.is_empty() {
            return Err(PipelineError::Config(
                "unavailable_marker must not be empty".to_string(),
            ));
        }
        if self.podcast.feed_key.is_empty() {
            return Err(PipelineError::Config("feed_key must not be empty".to_string()));
        }

        if self.transcription.enabled
            && (self.transcription.api_key.is_none() || self.transcription.service_url.is_none())
        {
            return Err(PipelineError::Config(
                "transcription requires api_key and service_url (IBM_API_KEY, IBM_API_URL)"
                    .to_string(),
            ));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Public base URL of the bucket
    pub fn space_url(&self) -> String {
        format!("https://{}.{}", self.storage.bucket, self.storage.endpoint)
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Webcast Podcaster Configuration:\n\
            - Source Feed: {}\n\
            - Space: {}\n\
            - Feed Key: {}\n\
            - Audio: {} @ {}\n\
            - Transcription: {}\n\
            - Scratch Directory: {}",
            self.source.feed_url,
            self.space_url(),
            self.podcast.feed_key,
            self.transcoder.audio_codec,
            self.transcoder.audio_bitrate,
            if self.transcription.enabled { "enabled" } else { "disabled" },
            self.scratch.dir.display(),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_source_feed(mut self, url: &str) -> Self {
        self.config.source.feed_url = url.to_string();
        self
    }

    pub fn with_storage(mut self, endpoint: &str, bucket: &str, access_key: &str, secret_key: &str) -> Self {
        self.config.storage.endpoint = endpoint.to_string();
        self.config.storage.bucket = bucket.to_string();
        self.config.storage.access_key = access_key.to_string();
        self.config.storage.secret_key = secret_key.to_string();
        self
    }

    pub fn with_feed_key(mut self, key: &str) -> Self {
        self.config.podcast.feed_key = key.to_string();
        self
    }

    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.config.scratch.dir = dir;
        self
    }

    pub fn with_transcription(mut self, api_key: &str, service_url: &str) -> Self {
        self.config.transcription.enabled = true;
        self.config.transcription.api_key = Some(api_key.to_string());
        self.config.transcription.service_url = Some(service_url.to_string());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source.unavailable_marker, "not-available");
        assert_eq!(config.podcast.feed_key, "dcc_audio.xml");
        assert_eq!(config.transcoder.audio_extension, "mp3");
        assert!(!config.transcription.enabled);
        assert!(config.source.redirect_url_template.contains(ACTIVITY_ID_PLACEHOLDER));
    }

    #[test]
    fn test_default_requires_storage() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DO_SPACES_NAME", "council"),
            ("DO_SPACES_ENDPOINT", "ams3.digitaloceanspaces.com"),
            ("DO_SPACES_KEY", "key"),
            ("DO_SPACES_SECRET", "secret"),
            ("IBM_API_KEY", "watson-key"),
            ("IBM_API_URL", "https://api.eu-gb.speech-to-text.watson.cloud.ibm.com/instances/1"),
            ("PODCASTER_LOG_LEVEL", " "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.space_url(), "https://council.ams3.digitaloceanspaces.com");
        assert!(config.transcription.enabled);
        assert_eq!(config.transcription.api_key.as_deref(), Some("watson-key"));
        // blank values are ignored
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_storage("ams3.digitaloceanspaces.com", "council", "k", "s")
            .with_feed_key("feed.xml")
            .with_transcription("key", "https://speech.example")
            .build();

        assert_eq!(config.podcast.feed_key, "feed.xml");
        assert!(config.transcription.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_template_without_placeholder() {
        let mut config = ConfigBuilder::new()
            .with_storage("ams3.digitaloceanspaces.com", "council", "k", "s")
            .build();
        config.source.redirect_url_template = "https://example.com/video.mp4".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            endpoint = "ams3.digitaloceanspaces.com"
            bucket = "council"

            [transcoder]
            audio_bitrate = "64k"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.transcoder.audio_bitrate, "64k");
        assert_eq!(config.transcoder.audio_codec, "libmp3lame");
    }
}
