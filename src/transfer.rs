use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::storage::SpacesStore;

/// Moves media between the network, the scratch directory and the bucket
#[async_trait]
pub trait MediaTransfer: Send + Sync {
    /// Stream `remote_url` to `local_path`, returning the bytes written
    async fn download(
        &self,
        remote_url: &str,
        local_path: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<u64>;

    /// Publish a local file under `remote_key` with public read access
    async fn upload(
        &self,
        local_path: &Path,
        remote_key: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<()>;

    /// Follow redirects and return the terminal URL
    async fn resolve_redirect(&self, url: &str) -> Result<String>;

    /// Body of a text document, `None` when it does not exist
    async fn fetch_document(&self, url: &str) -> Result<Option<String>>;

    fn public_url(&self, remote_key: &str) -> String;
}

/// Content type for an uploaded file, by extension
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("xml") => "application/rss+xml",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// reqwest for the web, Spaces for the bucket
pub struct HttpMediaTransfer {
    client: Client,
    transfer_client: Client,
    store: SpacesStore,
}

impl HttpMediaTransfer {
    pub fn new(client: Client, transfer_client: Client, store: SpacesStore) -> Self {
        Self {
            client,
            transfer_client,
            store,
        }
    }
}

fn transfer_err(context: &str, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Transfer(format!("{}: {}", context, e))
}

#[async_trait]
impl MediaTransfer for HttpMediaTransfer {
    async fn download(
        &self,
        remote_url: &str,
        local_path: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<u64> {
        progress.report(ProgressEvent::DownloadStarted {
            url: remote_url.to_string(),
            path: local_path.to_path_buf(),
        });

        let response = self
            .transfer_client
            .get(remote_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| transfer_err(remote_url, e))?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| transfer_err(&parent.display().to_string(), e))?;
        }

        let path_label = local_path.display().to_string();
        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| transfer_err(&path_label, e))?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transfer_err(remote_url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| transfer_err(&path_label, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| transfer_err(&path_label, e))?;

        progress.report(ProgressEvent::DownloadFinished {
            path: local_path.to_path_buf(),
            bytes: written,
        });
        Ok(written)
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_key: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| transfer_err(&local_path.display().to_string(), e))?;

        progress.report(ProgressEvent::UploadStarted {
            key: remote_key.to_string(),
            bytes: body.len() as u64,
        });

        self.store
            .put_object(remote_key, body, content_type_for(local_path))
            .await?;

        progress.report(ProgressEvent::UploadFinished {
            key: remote_key.to_string(),
        });
        Ok(())
    }

    async fn resolve_redirect(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transfer_err(url, e))?;

        // body is never read; the response is dropped with the connection
        let resolved = response.url().to_string();
        debug!("{} resolved to {} ({})", url, resolved, response.status());
        Ok(resolved)
    }

    async fn fetch_document(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transfer_err(url, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .map_err(|e| transfer_err(url, e))?;
        let body = response.text().await.map_err(|e| transfer_err(url, e))?;
        Ok(Some(body))
    }

    fn public_url(&self, remote_key: &str) -> String {
        self.store.public_url(remote_key)
    }
}
