use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::ACTIVITY_ID_PLACEHOLDER;
use crate::error::{PipelineError, Result};

/// Path fragment the webcast host redirects withdrawn recordings to
pub const UNAVAILABLE_MARKER: &str = "not-available";

/// Extensions of the artifacts a run leaves in the scratch directory
const SCRATCH_EXTENSIONS: &[&str] = &["mp4", "mp3", "json", "txt"];

/// Outcome of following the stable "latest video" link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedVideo {
    Available(String),
    Unavailable { resolved_url: String },
}

impl ResolvedVideo {
    pub fn classify(resolved_url: String, policy: &dyn AvailabilityPolicy) -> Self {
        if policy.is_available(&resolved_url) {
            ResolvedVideo::Available(resolved_url)
        } else {
            ResolvedVideo::Unavailable { resolved_url }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ResolvedVideo::Available(_))
    }

    pub fn url(&self) -> &str {
        match self {
            ResolvedVideo::Available(url) => url,
            ResolvedVideo::Unavailable { resolved_url } => resolved_url,
        }
    }
}

/// Media of one item and its scratch files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub activity_id: String,
    pub video: ResolvedVideo,
    pub local_video_path: PathBuf,
    pub local_audio_path: PathBuf,
}

impl ResolvedMedia {
    /// Scratch files are named `{timestamp_ms}_{activity_id}.{ext}`
    pub fn new(
        activity_id: &str,
        video: ResolvedVideo,
        scratch_dir: &Path,
        timestamp_ms: i64,
        video_extension: &str,
        audio_extension: &str,
    ) -> Self {
        let base = media_base_name(timestamp_ms, activity_id);
        Self {
            activity_id: activity_id.to_string(),
            video,
            local_video_path: scratch_dir.join(format!("{}.{}", base, video_extension)),
            local_audio_path: scratch_dir.join(format!("{}.{}", base, audio_extension)),
        }
    }

    /// Object key of the published audio
    pub fn audio_key(&self) -> String {
        self.local_audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub fn media_base_name(timestamp_ms: i64, activity_id: &str) -> String {
    format!("{}_{}", timestamp_ms, activity_id)
}

/// Stable redirect URL for an activity
pub fn redirect_url(template: &str, activity_id: &str) -> String {
    template.replace(ACTIVITY_ID_PLACEHOLDER, activity_id)
}

/// Decides from a resolved URL whether the recording can be fetched
pub trait AvailabilityPolicy: Send + Sync {
    fn is_available(&self, video_url: &str) -> bool;
}

/// Unavailable when the URL contains a marker substring
#[derive(Debug, Clone)]
pub struct MarkerAvailability {
    marker: String,
}

impl MarkerAvailability {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.to_string(),
        }
    }
}

impl Default for MarkerAvailability {
    fn default() -> Self {
        Self::new(UNAVAILABLE_MARKER)
    }
}

impl AvailabilityPolicy for MarkerAvailability {
    fn is_available(&self, video_url: &str) -> bool {
        !video_url.contains(&self.marker)
    }
}

/// False iff `video_url` contains the default marker
pub fn is_available(video_url: &str) -> bool {
    MarkerAvailability::default().is_available(video_url)
}

/// True for `{timestamp_ms}_{activity_id}.{ext}` files with a run artifact extension
pub fn is_scratch_artifact(path: &Path) -> bool {
    let known_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| SCRATCH_EXTENSIONS.contains(&ext));
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();

    known_extension
        && match stem.split_once('_') {
            Some((timestamp, activity_id)) => {
                !timestamp.is_empty()
                    && timestamp.bytes().all(|b| b.is_ascii_digit())
                    && !activity_id.is_empty()
            }
            None => false,
        }
}

/// Remove artifacts left by an aborted run, returning how many were deleted
pub fn sweep_scratch(scratch_dir: &Path) -> Result<usize> {
    if !scratch_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(scratch_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            PipelineError::Config(format!("Cannot read scratch dir {}: {}", scratch_dir.display(), e))
        })?;

        let path = entry.path();
        if !entry.file_type().is_file() || !is_scratch_artifact(path) {
            continue;
        }

        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove leftover {}: {}", path.display(), e),
        }
    }

    if removed > 0 {
        info!("🧹 Removed {} leftover files from {}", removed, scratch_dir.display());
    }
    Ok(removed)
}
