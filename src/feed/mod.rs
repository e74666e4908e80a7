//! Podcast output feed
//!
//! The feed document is the only durable state of the pipeline: the guid of
//! its newest episode decides where the next run stops.

pub mod store;
pub mod xml;

pub use store::OutputFeedStore;
pub use xml::{parse_feed, to_xml};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PodcastConfig;
use crate::source::{without_query, SourceItem};

/// Channel-level metadata of the podcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub title: String,
    pub description: String,
    pub site_url: String,
    /// Public URL of the feed document itself
    pub feed_url: String,
    pub author: String,
    pub language: String,
    pub image_url: Option<String>,
}

impl From<&PodcastConfig> for ChannelInfo {
    /// Metadata for a brand-new feed; `feed_url` is filled in by the store
    fn from(config: &PodcastConfig) -> Self {
        Self {
            title: config.title.clone(),
            description: config.description.clone(),
            site_url: config.site_url.clone(),
            feed_url: String::new(),
            author: config.author.clone(),
            language: config.language.clone(),
            image_url: config.image_url.clone(),
        }
    }
}

/// Downloadable audio of an episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// One published podcast episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    pub link: String,
    pub content: String,
    /// Ends with the activity id after its last `/`
    pub guid: String,
    pub publish_date: Option<DateTime<Utc>>,
    /// Set when the episode is appended to the feed
    pub enclosure: Option<Enclosure>,
    pub explicit: bool,
    pub summary: String,
}

impl Episode {
    /// Build the episode for a source item, keeping the activity id as guid suffix
    pub fn from_source(item: &SourceItem, activity_id: &str) -> Self {
        let guid = if guid_suffix(&item.guid) == activity_id {
            without_query(&item.guid)
        } else {
            without_query(&item.link)
        };

        Self {
            title: item.title.clone(),
            link: item.link.clone(),
            content: item.content.clone(),
            guid: guid.to_string(),
            publish_date: item.publish_date,
            enclosure: None,
            explicit: false,
            summary: item.content.clone(),
        }
    }

    /// Activity id carried in the guid
    pub fn activity_id(&self) -> &str {
        guid_suffix(&self.guid)
    }
}

/// Ordered episodes, newest first, plus channel metadata
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFeed {
    pub channel: ChannelInfo,
    items: Vec<Episode>,
    /// Episodes registered since the feed was loaded
    registered: usize,
}

impl OutputFeed {
    pub fn new(channel: ChannelInfo, items: Vec<Episode>) -> Self {
        Self {
            channel,
            items,
            registered: 0,
        }
    }

    pub fn items(&self) -> &[Episode] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Most recently published episode
    pub fn latest(&self) -> Option<&Episode> {
        self.items.first()
    }

    /// Activity id of the most recently published episode
    pub fn latest_activity_id(&self) -> Option<&str> {
        self.latest().map(Episode::activity_id)
    }

    /// Number of episodes registered since load
    pub fn registered(&self) -> usize {
        self.registered
    }

    /// Insert an episode published in this run.
    ///
    /// Items are processed newest first, so each one goes right after the
    /// ones registered before it and ahead of everything loaded.
    pub fn register(&mut self, episode: Episode) {
        self.items.insert(self.registered, episode);
        self.registered += 1;
    }
}

/// Final `/`-delimited segment of a guid, ignoring query, fragment and a trailing slash
pub fn guid_suffix(guid: &str) -> &str {
    without_query(guid)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// False when `activity_id` is the newest episode in `feed`
pub fn is_new(activity_id: &str, feed: &OutputFeed) -> bool {
    is_newer_than(activity_id, feed.latest_activity_id())
}

/// Novelty check against a remembered latest activity id
pub fn is_newer_than(activity_id: &str, latest_activity_id: Option<&str>) -> bool {
    match latest_activity_id {
        None => true,
        Some(latest) => latest != activity_id,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn channel() -> ChannelInfo {
        ChannelInfo {
            title: "Council Meetings".to_string(),
            description: "Audio".to_string(),
            site_url: "https://council.example".to_string(),
            feed_url: "https://bucket.example/feed.xml".to_string(),
            author: "Council".to_string(),
            language: "en-ie".to_string(),
            image_url: None,
        }
    }

    pub(crate) fn episode(guid: &str) -> Episode {
        Episode {
            title: format!("Meeting {}", guid_suffix(guid)),
            link: guid.to_string(),
            content: "Agenda".to_string(),
            guid: guid.to_string(),
            publish_date: None,
            enclosure: None,
            explicit: false,
            summary: "Agenda".to_string(),
        }
    }

    #[test]
    fn test_is_new_against_latest_guid() {
        let feed = OutputFeed::new(channel(), vec![episode("https://x/548470")]);

        assert!(!is_new("548470", &feed));
        assert!(is_new("548999", &feed));
    }

    #[test]
    fn test_is_new_on_empty_feed() {
        let feed = OutputFeed::new(channel(), Vec::new());
        assert!(is_new("548470", &feed));
        assert!(is_new("", &feed));
    }

    #[test]
    fn test_is_new_only_checks_first_item() {
        let feed = OutputFeed::new(
            channel(),
            vec![episode("https://x/548471"), episode("https://x/548470")],
        );
        assert!(is_new("548470", &feed));
    }

    #[test]
    fn test_guid_suffix() {
        assert_eq!(guid_suffix("https://x/548470"), "548470");
        assert_eq!(guid_suffix("https://x/548470/"), "548470");
        assert_eq!(guid_suffix("548470"), "548470");
        assert_eq!(guid_suffix("https://x/548470?from=rss"), "548470");
        assert_eq!(guid_suffix("https://x/548470/#player"), "548470");
        assert_eq!(guid_suffix(""), "");
    }

    #[test]
    fn test_register_keeps_run_order_ahead_of_loaded() {
        let mut feed = OutputFeed::new(channel(), vec![episode("https://x/1")]);
        feed.register(episode("https://x/3"));
        feed.register(episode("https://x/2"));

        let ids: Vec<&str> = feed.items().iter().map(Episode::activity_id).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
        assert_eq!(feed.latest_activity_id(), Some("3"));
        assert_eq!(feed.registered(), 2);
    }

    #[test]
    fn test_episode_guid_falls_back_to_link() {
        let item = SourceItem {
            title: "Finance".to_string(),
            link: "https://x/webcast_interactive/548470".to_string(),
            content: "Budget".to_string(),
            guid: "urn:uuid:9f1c".to_string(),
            publish_date: None,
        };

        let episode = Episode::from_source(&item, "548470");
        assert_eq!(episode.guid, item.link);
        assert_eq!(episode.activity_id(), "548470");
        assert_eq!(episode.summary, "Budget");
        assert!(!episode.explicit);
        assert!(episode.enclosure.is_none());
    }

    #[test]
    fn test_episode_guid_matches_activity_id_with_query() {
        let link = "https://x/webcast_interactive/548471?from=rss";
        let item = SourceItem {
            title: "Finance".to_string(),
            link: link.to_string(),
            content: "Budget".to_string(),
            guid: "urn:uuid:9f1c".to_string(),
            publish_date: None,
        };

        let activity_id = item.activity_id().unwrap();
        let episode = Episode::from_source(&item, &activity_id);
        assert_eq!(episode.guid, "https://x/webcast_interactive/548471");

        let feed = OutputFeed::new(channel(), vec![episode]);
        assert!(!is_new(&activity_id, &feed));
    }
}
