use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

use super::{SpeechRecognitionResults, SpeechToText};
use crate::config::TranscriptionConfig;
use crate::error::{PipelineError, Result};

/// IBM Watson Speech to Text, synchronous `recognize` endpoint
pub struct WatsonSpeechClient {
    api_key: String,
    service_url: String,
    model: Option<String>,
    client: reqwest::Client,
}

impl WatsonSpeechClient {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| PipelineError::Config("Speech API key not configured".to_string()))?;
        let service_url = config
            .service_url
            .clone()
            .ok_or_else(|| PipelineError::Config("Speech service URL not configured".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create speech client: {}", e)))?;

        Ok(Self {
            api_key,
            service_url,
            model: config.model.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/recognize", self.service_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechToText for WatsonSpeechClient {
    async fn recognize(&self, audio: Vec<u8>, content_type: &str) -> Result<SpeechRecognitionResults> {
        let endpoint = self.endpoint();
        debug!("Sending {} bytes to {}", audio.len(), endpoint);

        let mut request = self
            .client
            .post(&endpoint)
            .basic_auth("apikey", Some(&self.api_key))
            .header(CONTENT_TYPE, content_type)
            .body(audio);
        if let Some(model) = &self.model {
            request = request.query(&[("model", model)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Transcription(format!("Speech request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transcription(format!(
                "Speech API error {}: {}",
                status, text
            )));
        }

        response
            .json::<SpeechRecognitionResults>()
            .await
            .map_err(|e| PipelineError::Transcription(format!("Unreadable speech response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_service_url() {
        let config = TranscriptionConfig {
            enabled: true,
            api_key: Some("key".to_string()),
            service_url: Some(
                "https://api.eu-gb.speech-to-text.watson.cloud.ibm.com/instances/abc/".to_string(),
            ),
            ..TranscriptionConfig::default()
        };

        let client = WatsonSpeechClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://api.eu-gb.speech-to-text.watson.cloud.ibm.com/instances/abc/v1/recognize"
        );
    }

    #[test]
    fn test_requires_credentials() {
        let config = TranscriptionConfig::default();
        assert!(matches!(
            WatsonSpeechClient::new(&config),
            Err(PipelineError::Config(_))
        ));
    }
}
