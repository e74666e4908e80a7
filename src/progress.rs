use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Progress notifications emitted by the pipeline stages
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    DownloadStarted { url: String, path: PathBuf },
    DownloadFinished { path: PathBuf, bytes: u64 },
    TranscodeStarted { input: PathBuf, output: PathBuf },
    /// `percent` is `None` when the input duration could not be probed
    TranscodeProgress { percent: Option<f64>, out_time_seconds: f64 },
    TranscodeFinished { output: PathBuf },
    UploadStarted { key: String, bytes: u64 },
    UploadFinished { key: String },
}

/// Observer for stage progress, passed explicitly into each stage
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

/// Narrates progress through `tracing`, transcode percentages in 10% steps
#[derive(Debug)]
pub struct LogReporter {
    last_decile: AtomicI64,
}

impl LogReporter {
    pub fn new() -> Self {
        Self {
            last_decile: AtomicI64::new(-1),
        }
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for LogReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::DownloadStarted { url, path } => {
                info!("⬇️  Downloading {} -> {}", url, path.display());
            }
            ProgressEvent::DownloadFinished { path, bytes } => {
                info!(
                    "✅ Downloaded {} ({:.1} MB)",
                    path.display(),
                    bytes as f64 / 1_000_000.0
                );
            }
            ProgressEvent::TranscodeStarted { input, output } => {
                self.last_decile.store(-1, Ordering::Relaxed);
                info!("🎵 Converting {} -> {}", input.display(), output.display());
            }
            ProgressEvent::TranscodeProgress {
                percent: Some(percent),
                ..
            } => {
                let decile = (percent / 10.0).floor() as i64;
                if self.last_decile.swap(decile, Ordering::Relaxed) != decile {
                    info!("🔄 Processing: {:.0}% done", percent);
                } else {
                    debug!("Processing: {:.2}% done", percent);
                }
            }
            ProgressEvent::TranscodeProgress {
                percent: None,
                out_time_seconds,
            } => {
                debug!("Processing: {:.1}s of audio written", out_time_seconds);
            }
            ProgressEvent::TranscodeFinished { output } => {
                info!("✅ Conversion ended: {}", output.display());
            }
            ProgressEvent::UploadStarted { key, bytes } => {
                info!("⬆️  Uploading {} ({:.1} MB)", key, bytes as f64 / 1_000_000.0);
            }
            ProgressEvent::UploadFinished { key } => {
                info!("☁️  Uploaded successfully: {}", key);
            }
        }
    }
}
