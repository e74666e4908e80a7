use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// One candidate recording from the upstream webcast feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    pub title: String,
    /// Detail page URL, its final path segment is the activity id
    pub link: String,
    pub content: String,
    pub guid: String,
    pub publish_date: Option<DateTime<Utc>>,
}

impl SourceItem {
    /// Activity id derived from the detail page link
    pub fn activity_id(&self) -> Option<String> {
        activity_id_from_link(&self.link)
    }
}

/// `link` up to its query or fragment
pub fn without_query(link: &str) -> &str {
    link.split(['?', '#']).next().unwrap_or_default()
}

/// Last non-empty path segment of `link`, ignoring query and fragment
pub fn activity_id_from_link(link: &str) -> Option<String> {
    let path = match url::Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => without_query(link).to_string(),
    };

    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.to_string())
}

/// Reads the upstream feed of webcast recordings
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Items newest first, as published upstream
    async fn fetch_source_items(&self, feed_url: &str) -> Result<Vec<SourceItem>>;
}

/// RSS/Atom source reader over HTTP
pub struct RssSourceReader {
    client: Client,
}

impl RssSourceReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFeed for RssSourceReader {
    async fn fetch_source_items(&self, feed_url: &str) -> Result<Vec<SourceItem>> {
        info!("📡 Fetching source feed: {}", feed_url);

        let response = self
            .client
            .get(feed_url)
            .send()
            .await
            .map_err(|e| PipelineError::FeedUnavailable(format!("{}: {}", feed_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::FeedUnavailable(format!(
                "{}: HTTP {}",
                feed_url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::FeedUnavailable(format!("{}: {}", feed_url, e)))?;

        let items = parse_source_items(&body)?;
        info!("📋 Source feed lists {} recordings", items.len());
        Ok(items)
    }
}

/// Parse an RSS or Atom document into source items, preserving order
pub fn parse_source_items(content: &[u8]) -> Result<Vec<SourceItem>> {
    debug!("Parsing source feed ({} bytes)", content.len());

    let feed = parser::parse(content)
        .map_err(|e| PipelineError::FeedUnavailable(format!("Failed to parse feed: {}", e)))?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let summary = entry.summary.map(|s| s.content);
            let content = entry
                .content
                .and_then(|c| c.body)
                .or(summary)
                .unwrap_or_default();

            SourceItem {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                content,
                guid: entry.id,
                publish_date: entry.published.or(entry.updated),
            }
        })
        .collect();

    Ok(items)
}
