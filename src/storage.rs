use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::StorageConfig;
use crate::error::{PipelineError, Result};

const ACL_HEADER: &str = "x-amz-acl";
const PUBLIC_READ: &str = "public-read";

/// S3-compatible bucket (DigitalOcean Spaces) written through presigned URLs
pub struct SpacesStore {
    bucket: Bucket,
    credentials: Credentials,
    presign_expiry: Duration,
    public_base: String,
    client: Client,
}

impl SpacesStore {
    pub fn new(config: &StorageConfig, client: Client) -> Result<Self> {
        let endpoint = endpoint_url(&config.endpoint)?;
        let host = endpoint
            .host_str()
            .ok_or_else(|| PipelineError::Config(format!("storage endpoint has no host: {}", endpoint)))?
            .to_string();

        let bucket = Bucket::new(
            endpoint,
            UrlStyle::VirtualHost,
            config.bucket.clone(),
            config.region.clone(),
        )
        .map_err(|e| PipelineError::Config(format!("Invalid bucket configuration: {}", e)))?;

        Ok(Self {
            bucket,
            credentials: Credentials::new(config.access_key.clone(), config.secret_key.clone()),
            presign_expiry: Duration::from_secs(config.presign_expiry_seconds),
            public_base: format!("https://{}.{}", config.bucket, host),
            client,
        })
    }

    /// Public URL of an object written with `public-read`
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key.trim_start_matches('/'))
    }

    /// Presigned PUT URL; the request must carry `x-amz-acl: public-read`
    pub fn presign_put(&self, key: &str) -> Url {
        let mut action = self.bucket.put_object(Some(&self.credentials), key);
        action.headers_mut().insert(ACL_HEADER, PUBLIC_READ);
        action.sign(self.presign_expiry)
    }

    /// Write `body` under `key`, world-readable
    pub async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.presign_put(key);
        debug!("PUT {} ({} bytes, {})", key, body.len(), content_type);

        let response = self
            .client
            .put(url)
            .header(ACL_HEADER, PUBLIC_READ)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::Transfer(format!("Upload of {} failed: {}", key, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transfer(format!(
                "Upload of {} rejected with {}: {}",
                key, status, text
            )));
        }

        Ok(())
    }
}

/// Accepts a bare host as well as a full URL
fn endpoint_url(endpoint: &str) -> Result<Url> {
    let raw = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    };

    Url::parse(&raw)
        .map_err(|e| PipelineError::Config(format!("Invalid storage endpoint {}: {}", endpoint, e)))
}
