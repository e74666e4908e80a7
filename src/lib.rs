//! Webcast Podcaster
//!
//! Turns newly published council meeting webcasts into podcast episodes:
//! downloads the recording, extracts an mp3, publishes it to an S3-compatible
//! bucket and appends it to the podcast feed, optionally with a transcript.

pub mod audio;
pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod state;
pub mod storage;
pub mod transcription;
pub mod transfer;

// Re-export main types for easy access
pub use crate::audio::{FfmpegTranscoder, Transcoder};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{PipelineError, Result};
pub use crate::feed::{is_new, ChannelInfo, Enclosure, Episode, OutputFeed, OutputFeedStore};
pub use crate::media::{is_available, AvailabilityPolicy, MarkerAvailability, ResolvedMedia, ResolvedVideo};
pub use crate::pipeline::PipelineOrchestrator;
pub use crate::progress::{LogReporter, NoopReporter, ProgressEvent, ProgressReporter};
pub use crate::source::{RssSourceReader, SourceFeed, SourceItem};
pub use crate::state::{ItemOutcome, ItemProgress, ItemStage, RunSummary};
pub use crate::transcription::{stitch_transcript, SpeechRecognitionResults, SpeechToText, Transcriber};
pub use crate::transfer::{HttpMediaTransfer, MediaTransfer};
