use reqwest::Client;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::error::{PipelineError, Result};

/// Client for feed and redirect requests
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    build(config, config.timeout_seconds)
}

/// Client for media transfers, which need a much longer timeout
pub fn build_transfer_client(config: &HttpConfig) -> Result<Client> {
    build(config, config.transfer_timeout_seconds)
}

fn build(config: &HttpConfig, timeout_seconds: u64) -> Result<Client> {
    Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(timeout_seconds))
        .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
        .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))
}
