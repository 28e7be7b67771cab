// src/sources/feed.rs
//! RSS parsing for the feed tier.

use chrono::{DateTime, TimeZone, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::sources::types::FetchError;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    source: Option<String>,
}

/// One `<item>` with its raw (still HTML-bearing) fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

pub fn parse_rss(xml: &str) -> Result<Vec<FeedItem>, FetchError> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss =
        from_str(&xml_clean).map_err(|e| FetchError::ParseError(format!("rss: {e}")))?;

    Ok(rss
        .channel
        .item
        .into_iter()
        .filter_map(|it| {
            let title = it.title?.trim().to_string();
            if title.is_empty() {
                return None;
            }
            Some(FeedItem {
                title,
                link: it.link.map(|l| l.trim().to_string()),
                description: it.description,
                source: it.source,
                published: it.pub_date.as_deref().and_then(parse_rfc2822),
            })
        })
        .collect())
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    Utc.timestamp_opt(dt.unix_timestamp(), 0).single()
}

// Board feeds embed HTML entities that are not valid XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
