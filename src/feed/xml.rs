use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fmt::Display;

use super::{ChannelInfo, Enclosure, Episode, OutputFeed};
use crate::error::{PipelineError, Result};

const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";
const GENERATOR: &str = concat!("webcast-podcaster ", env!("CARGO_PKG_VERSION"));

/// Channel fields as found in the document
#[derive(Debug, Default)]
struct ChannelDraft {
    seen: bool,
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    language: Option<String>,
    author: Option<String>,
    image_url: Option<String>,
    self_url: Option<String>,
}

/// Item fields as found in the document
#[derive(Debug, Default)]
struct ItemDraft {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    encoded: Option<String>,
    guid: Option<String>,
    pub_date: Option<String>,
    enclosure: Option<Enclosure>,
    explicit: Option<String>,
    summary: Option<String>,
}

impl ChannelDraft {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "title" => self.title = Some(value),
            "link" => self.link = Some(value),
            "description" => self.description = Some(value),
            "language" => self.language = Some(value),
            "itunes:author" => self.author = Some(value),
            _ => {}
        }
    }

    fn finish(self, defaults: &ChannelInfo) -> ChannelInfo {
        ChannelInfo {
            title: self.title.unwrap_or_else(|| defaults.title.clone()),
            description: self.description.unwrap_or_else(|| defaults.description.clone()),
            site_url: self.link.unwrap_or_else(|| defaults.site_url.clone()),
            feed_url: self.self_url.unwrap_or_else(|| defaults.feed_url.clone()),
            author: self.author.unwrap_or_else(|| defaults.author.clone()),
            language: self.language.unwrap_or_else(|| defaults.language.clone()),
            image_url: self.image_url.or_else(|| defaults.image_url.clone()),
        }
    }
}

impl ItemDraft {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "title" => self.title = Some(value),
            "link" => self.link = Some(value),
            "description" => self.description = Some(value),
            "content:encoded" => self.encoded = Some(value),
            "guid" => self.guid = Some(value),
            "pubDate" => self.pub_date = Some(value),
            "itunes:explicit" => self.explicit = Some(value),
            "itunes:summary" => self.summary = Some(value),
            _ => {}
        }
    }

    fn finish(self) -> Episode {
        let description = self.description.unwrap_or_default();
        let link = self.link.unwrap_or_default();

        Episode {
            title: self.title.unwrap_or_default(),
            content: self.encoded.unwrap_or_else(|| description.clone()),
            guid: self.guid.unwrap_or_else(|| link.clone()),
            link,
            publish_date: self.pub_date.as_deref().and_then(parse_date),
            enclosure: self.enclosure,
            explicit: self.explicit.as_deref().map(parse_explicit).unwrap_or(false),
            summary: self.summary.unwrap_or(description),
        }
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .or_else(|_| DateTime::parse_from_rfc3339(value.trim()))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn parse_explicit(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "explicit"
    )
}

fn read_err<E: Display>(e: E) -> PipelineError {
    PipelineError::FeedUnavailable(format!("Failed to parse output feed: {}", e))
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    match e.try_get_attribute(name).map_err(read_err)? {
        Some(attr) => Ok(Some(attr.unescape_value().map_err(read_err)?.into_owned())),
        None => Ok(None),
    }
}

/// Elements whose payload lives in attributes
fn read_attributes(
    name: &str,
    e: &BytesStart<'_>,
    channel: &mut ChannelDraft,
    item: Option<&mut ItemDraft>,
) -> Result<()> {
    match (name, item) {
        ("enclosure", Some(item)) => {
            if let Some(url) = attribute(e, "url")? {
                item.enclosure = Some(Enclosure {
                    url,
                    size_bytes: attribute(e, "length")?
                        .and_then(|l| l.trim().parse().ok())
                        .unwrap_or(0),
                    mime_type: attribute(e, "type")?.unwrap_or_else(|| "audio/mpeg".to_string()),
                });
            }
        }
        ("itunes:image", None) => {
            if let Some(href) = attribute(e, "href")? {
                channel.image_url = Some(href);
            }
        }
        ("atom:link", None) => {
            if attribute(e, "rel")?.as_deref() == Some("self") {
                channel.self_url = attribute(e, "href")?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parse the podcast feed document.
///
/// An empty document is an empty feed; anything non-empty must contain an
/// RSS channel. Missing channel fields are taken from `defaults`.
pub fn parse_feed(content: &str, defaults: &ChannelInfo) -> Result<OutputFeed> {
    if content.trim().is_empty() {
        return Ok(OutputFeed::new(defaults.clone(), Vec::new()));
    }

    let mut reader = Reader::from_str(content);

    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut channel = ChannelDraft::default();
    let mut item: Option<ItemDraft> = None;
    let mut items = Vec::new();

    loop {
        match reader.read_event().map_err(read_err)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                text.clear();
                match name.as_str() {
                    "channel" => channel.seen = true,
                    "item" => item = Some(ItemDraft::default()),
                    _ => read_attributes(&name, &e, &mut channel, item.as_mut())?,
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                read_attributes(&name, &e, &mut channel, item.as_mut())?;
            }
            Event::Text(e) => {
                let chunk = e.unescape().map_err(read_err)?;
                // indentation between elements
                if !chunk.trim().is_empty() {
                    text.push_str(&chunk);
                }
            }
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                let parent = stack.last().map(String::as_str).unwrap_or_default();
                let value = std::mem::take(&mut text);

                if name == "item" {
                    if let Some(draft) = item.take() {
                        items.push(draft.finish());
                    }
                } else if parent == "item" {
                    if let Some(draft) = item.as_mut() {
                        draft.set(&name, value);
                    }
                } else if parent == "channel" {
                    channel.set(&name, value);
                } else if parent == "image" && name == "url" && channel.image_url.is_none() {
                    channel.image_url = Some(value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !channel.seen {
        return Err(PipelineError::FeedUnavailable(
            "Output feed document has no RSS channel".to_string(),
        ));
    }

    Ok(OutputFeed::new(channel.finish(defaults), items))
}

fn write_err<E: Display>(e: E) -> PipelineError {
    PipelineError::FeedWrite(format!("Failed to serialize feed: {}", e))
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(write_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_err)?;
    Ok(())
}

fn write_item(writer: &mut Writer<Vec<u8>>, episode: &Episode) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new("item")))
        .map_err(write_err)?;

    text_element(writer, "title", &episode.title)?;
    text_element(writer, "description", &episode.content)?;
    text_element(writer, "link", &episode.link)?;

    let mut guid = BytesStart::new("guid");
    guid.push_attribute(("isPermaLink", "false"));
    writer.write_event(Event::Start(guid)).map_err(write_err)?;
    writer
        .write_event(Event::Text(BytesText::new(&episode.guid)))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("guid")))
        .map_err(write_err)?;

    if let Some(date) = episode.publish_date {
        text_element(writer, "pubDate", &date.to_rfc2822())?;
    }

    if let Some(enclosure) = &episode.enclosure {
        let length = enclosure.size_bytes.to_string();
        let mut element = BytesStart::new("enclosure");
        element.push_attribute(("url", enclosure.url.as_str()));
        element.push_attribute(("length", length.as_str()));
        element.push_attribute(("type", enclosure.mime_type.as_str()));
        writer.write_event(Event::Empty(element)).map_err(write_err)?;
    }

    text_element(
        writer,
        "itunes:explicit",
        if episode.explicit { "true" } else { "false" },
    )?;
    text_element(writer, "itunes:summary", &episode.summary)?;

    writer
        .write_event(Event::End(BytesEnd::new("item")))
        .map_err(write_err)?;
    Ok(())
}

/// Serialize the feed as tab-indented RSS 2.0 with the iTunes namespace
pub fn to_xml(feed: &OutputFeed) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
    let channel = &feed.channel;

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_err)?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:itunes", ITUNES_NS));
    rss.push_attribute(("xmlns:atom", ATOM_NS));
    rss.push_attribute(("xmlns:content", CONTENT_NS));
    writer.write_event(Event::Start(rss)).map_err(write_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("channel")))
        .map_err(write_err)?;

    text_element(&mut writer, "title", &channel.title)?;
    text_element(&mut writer, "description", &channel.description)?;
    text_element(&mut writer, "link", &channel.site_url)?;
    text_element(&mut writer, "generator", GENERATOR)?;
    text_element(&mut writer, "lastBuildDate", &Utc::now().to_rfc2822())?;
    text_element(&mut writer, "language", &channel.language)?;

    let mut self_link = BytesStart::new("atom:link");
    self_link.push_attribute(("href", channel.feed_url.as_str()));
    self_link.push_attribute(("rel", "self"));
    self_link.push_attribute(("type", "application/rss+xml"));
    writer.write_event(Event::Empty(self_link)).map_err(write_err)?;

    text_element(&mut writer, "itunes:author", &channel.author)?;
    text_element(&mut writer, "itunes:summary", &channel.description)?;
    text_element(&mut writer, "itunes:explicit", "false")?;
    if let Some(image_url) = &channel.image_url {
        let mut image = BytesStart::new("itunes:image");
        image.push_attribute(("href", image_url.as_str()));
        writer.write_event(Event::Empty(image)).map_err(write_err)?;
    }

    for episode in feed.items() {
        write_item(&mut writer, episode)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("channel")))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("rss")))
        .map_err(write_err)?;

    String::from_utf8(writer.into_inner()).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::tests::{channel, episode};
    use chrono::TimeZone;

    #[test]
    fn test_parse_existing_podcast_feed() {
        let document = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd" xmlns:atom="http://www.w3.org/2005/Atom" version="2.0">
	<channel>
		<title><![CDATA[DCC Audio]]></title>
		<description><![CDATA[Council meetings]]></description>
		<link>https://dublincity.public-i.tv</link>
		<atom:link href="https://dcc.ams3.digitaloceanspaces.com/dcc_audio.xml" rel="self" type="application/rss+xml"/>
		<item>
			<title><![CDATA[Finance Committee]]></title>
			<description><![CDATA[Budget &amp; review]]></description>
			<link>https://x/webcast_interactive/548470</link>
			<guid isPermaLink="false">https://x/webcast_interactive/548470</guid>
			<pubDate>Fri, 12 Mar 2021 10:00:00 GMT</pubDate>
			<enclosure url="https://dcc.ams3.digitaloceanspaces.com/1616096362038_548470.mp3" length="2048" type="audio/mpeg"/>
			<itunes:explicit>false</itunes:explicit>
			<itunes:summary>Budget review</itunes:summary>
		</item>
	</channel>
</rss>"#;

        let feed = parse_feed(document, &channel()).unwrap();

        assert_eq!(feed.channel.title, "DCC Audio");
        assert_eq!(feed.channel.site_url, "https://dublincity.public-i.tv");
        assert_eq!(
            feed.channel.feed_url,
            "https://dcc.ams3.digitaloceanspaces.com/dcc_audio.xml"
        );
        // missing in the document, taken from defaults
        assert_eq!(feed.channel.author, "Council");

        assert_eq!(feed.len(), 1);
        let item = &feed.items()[0];
        assert_eq!(item.activity_id(), "548470");
        assert_eq!(item.summary, "Budget review");
        assert!(!item.explicit);
        assert_eq!(
            item.publish_date,
            Some(Utc.with_ymd_and_hms(2021, 3, 12, 10, 0, 0).unwrap())
        );
        let enclosure = item.enclosure.as_ref().unwrap();
        assert_eq!(enclosure.size_bytes, 2048);
        assert_eq!(enclosure.mime_type, "audio/mpeg");
    }

    #[test]
    fn test_empty_document_is_empty_feed() {
        let feed = parse_feed("  \n", &channel()).unwrap();
        assert!(feed.is_empty());
        assert_eq!(feed.channel, channel());
    }

    #[test]
    fn test_document_without_channel_is_rejected() {
        let result = parse_feed("<html><body>Access Denied</body></html>", &channel());
        assert!(matches!(result, Err(PipelineError::FeedUnavailable(_))));
    }

    #[test]
    fn test_serialized_feed_reads_back() {
        let mut first = episode("https://x/548471");
        first.title = "Council <Monthly> & Finance".to_string();
        first.publish_date = Some(Utc.with_ymd_and_hms(2021, 3, 15, 18, 15, 0).unwrap());
        first.enclosure = Some(Enclosure {
            url: "https://bucket.example/1_548471.mp3".to_string(),
            size_bytes: 4096,
            mime_type: "audio/mpeg".to_string(),
        });
        let feed = OutputFeed::new(channel(), vec![first.clone(), episode("https://x/548470")]);

        let xml = to_xml(&feed).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("\t<channel>"));
        assert!(xml.contains("&lt;Monthly&gt; &amp; Finance"));

        let parsed = parse_feed(&xml, &channel()).unwrap();
        assert_eq!(parsed.channel, channel());
        assert_eq!(parsed.items(), &[first, episode("https://x/548470")]);
    }

    #[test]
    fn test_text_keeps_its_own_whitespace() {
        let mut spaced = episode("https://x/548472");
        spaced.content = "  Item 1: minutes\n\tItem 2: budget  ".to_string();
        spaced.summary = " Agenda ".to_string();
        let feed = OutputFeed::new(channel(), vec![spaced.clone()]);

        let parsed = parse_feed(&to_xml(&feed).unwrap(), &channel()).unwrap();
        assert_eq!(parsed.items()[0].content, spaced.content);
        assert_eq!(parsed.items()[0].summary, " Agenda ");

        let document = "<rss><channel>\n\t<title><![CDATA[ DCC Audio ]]></title>\n</channel></rss>";
        let parsed = parse_feed(document, &channel()).unwrap();
        assert_eq!(parsed.channel.title, " DCC Audio ");
    }
}
