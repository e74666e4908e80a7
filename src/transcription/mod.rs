//! Optional speech-to-text stage
//!
//! The structured recognition result is kept verbatim next to a plain-text
//! transcript; both are published alongside the audio.

pub mod watson;

pub use watson::WatsonSpeechClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::TranscriptionConfig;
use crate::error::{PipelineError, Result};
use crate::progress::ProgressReporter;
use crate::transfer::MediaTransfer;

/// Top-level recognition response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechRecognitionResults {
    #[serde(default)]
    pub results: Vec<SpeechRecognitionResult>,

    /// Fields this crate does not interpret, kept for the persisted copy
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One recognized segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechRecognitionResult {
    #[serde(default)]
    pub alternatives: Vec<SpeechRecognitionAlternative>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechRecognitionAlternative {
    pub transcript: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Speech recognition service
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn recognize(&self, audio: Vec<u8>, content_type: &str) -> Result<SpeechRecognitionResults>;
}

/// Create the configured speech client
pub fn create_speech_client(config: &TranscriptionConfig) -> Result<Arc<dyn SpeechToText>> {
    Ok(Arc::new(WatsonSpeechClient::new(config)?))
}

/// First alternative of every segment, in order, with no separator
pub fn stitch_transcript(results: &SpeechRecognitionResults) -> String {
    results
        .results
        .iter()
        .filter_map(|r| r.alternatives.first())
        .map(|a| a.transcript.as_str())
        .collect()
}

/// Turns a published audio file into uploaded `.json` and `.txt` transcripts
pub struct Transcriber {
    client: Arc<dyn SpeechToText>,
    transfer: Arc<dyn MediaTransfer>,
    content_type: String,
}

impl Transcriber {
    pub fn new(client: Arc<dyn SpeechToText>, transfer: Arc<dyn MediaTransfer>, content_type: &str) -> Self {
        Self {
            client,
            transfer,
            content_type: content_type.to_string(),
        }
    }

    /// Transcribe `audio_path`, returning the transcript id (the audio base name)
    pub async fn transcribe(&self, audio_path: &Path, progress: &dyn ProgressReporter) -> Result<String> {
        let base = audio_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                PipelineError::Transcription(format!("Invalid audio file name: {}", audio_path.display()))
            })?
            .to_string();

        info!("📝 Beginning transcription of {}", audio_path.display());

        let audio = tokio::fs::read(audio_path)
            .await
            .map_err(|e| PipelineError::Transcription(format!("{}: {}", audio_path.display(), e)))?;
        let results = self.client.recognize(audio, &self.content_type).await?;

        let json_path = audio_path.with_file_name(format!("{}.json", base));
        let text_path = audio_path.with_file_name(format!("{}.txt", base));

        let json = serde_json::to_string_pretty(&results)
            .map_err(|e| PipelineError::Transcription(format!("Failed to serialize results: {}", e)))?;
        write_artifact(&json_path, json).await?;

        let transcript = stitch_transcript(&results);
        write_artifact(&text_path, transcript).await?;
        info!("✅ Transcription finished: {} segments", results.results.len());

        for path in [&json_path, &text_path] {
            let key = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.transfer.upload(path, &key, progress).await?;
        }

        Ok(base)
    }
}

async fn write_artifact(path: &Path, content: String) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| PipelineError::Transcription(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stitch_joins_first_alternatives() {
        let results: SpeechRecognitionResults = serde_json::from_str(
            r#"{
                "result_index": 0,
                "results": [
                    {"final": true, "alternatives": [{"transcript": "a ", "confidence": 0.91}, {"transcript": "x"}]},
                    {"final": true, "alternatives": [{"transcript": "b"}]},
                    {"final": true, "alternatives": []}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(stitch_transcript(&results), "a b");
    }

    #[test]
    fn test_unknown_fields_survive() {
        let raw = r#"{"result_index":0,"results":[{"final":true,"alternatives":[{"transcript":"hello ","timestamps":[["hello",0.1,0.5]]}]}]}"#;
        let results: SpeechRecognitionResults = serde_json::from_str(raw).unwrap();

        let value = serde_json::to_value(&results).unwrap();
        assert_eq!(value["result_index"], 0);
        assert_eq!(value["results"][0]["final"], true);
        assert_eq!(value["results"][0]["alternatives"][0]["timestamps"][0][0], "hello");
    }

    #[test]
    fn test_empty_results() {
        let results: SpeechRecognitionResults = serde_json::from_str("{}").unwrap();
        assert_eq!(stitch_transcript(&results), "");
    }
}
