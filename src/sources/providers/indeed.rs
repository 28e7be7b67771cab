// src/sources/providers/indeed.rs
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{fetch_listings, search_url, PageRequest};
use crate::sources::feed::{parse_rss, FeedItem};
use crate::sources::html::{CachedCards, CardSpec};
use crate::sources::types::{FetchError, RawPosting, SourceAdapter, SourceId, Tier};
use crate::sources::{clean_text, internship_term, Fetchers, Listing};

static CARDS: CachedCards = CachedCards::new(CardSpec {
    cards: &[
        "div[data-jk]",
        "div.job_seen_beacon",
        "div.jobCard",
        "div[class*='job'][class*='card']",
    ],
    title: &[
        "h2.jobTitle",
        "a.jobTitle",
        "span[id^='jobTitle']",
        "[data-testid*='title']",
        "h2[class*='title']",
        "h2",
        "h3",
    ],
    company: &[
        "span.companyName",
        "[data-testid='company-name']",
        "a.companyName",
        "span[class*='company']",
    ],
    location: &[
        "div.companyLocation",
        "[data-testid='text-location']",
        "[data-testid='job-location']",
        "span.companyLocation",
        "div[class*='location']",
    ],
    description: &[
        "div.job-snippet",
        "div.summary",
        "span.summary",
        "[class*='snippet']",
        "ul[class*='requirement']",
    ],
    link: &["h2 a[href]", "a[href*='/viewjob']", "a[href*='/rc/clk']", "a[href]"],
    key_attr: Some("data-jk"),
});

const WAIT_SELECTOR: &str = "[data-jk], .job_seen_beacon, .jobCard";

/// Indian cities served by in.indeed.com, with the `City, State` form it expects.
const INDIAN_CITIES: &[(&str, &str)] = &[
    ("bangalore", "Bengaluru, Karnataka"),
    ("banglore", "Bengaluru, Karnataka"),
    ("bengaluru", "Bengaluru, Karnataka"),
    ("bangaluru", "Bengaluru, Karnataka"),
    ("mumbai", "Mumbai, Maharashtra"),
    ("delhi", "Delhi, Delhi"),
    ("hyderabad", "Hyderabad, Telangana"),
    ("chennai", "Chennai, Tamil Nadu"),
    ("pune", "Pune, Maharashtra"),
    ("coimbatore", "Coimbatore, Tamil Nadu"),
];

/// Regional host and formatted location for a requested location.
pub fn locale(location: Option<&str>) -> (&'static str, Option<String>) {
    let raw = location.map(str::trim).filter(|l| !l.is_empty());
    let lower = raw.map(str::to_lowercase).unwrap_or_default();
    for (city, formatted) in INDIAN_CITIES {
        if lower.contains(city) {
            return ("in.indeed.com", Some((*formatted).to_string()));
        }
    }
    ("www.indeed.com", raw.map(str::to_string))
}

pub struct IndeedAdapter {
    fx: Fetchers,
}

pub fn build(fx: &Fetchers) -> Arc<dyn SourceAdapter> {
    Arc::new(IndeedAdapter { fx: fx.clone() })
}

impl IndeedAdapter {
    async fn fetch_page(
        &self,
        term: &str,
        location: Option<&str>,
        tier: Tier,
    ) -> Result<Vec<Listing>, FetchError> {
        let (host, loc) = locale(location);
        let base = format!("https://{host}/");
        let mut params = vec![("q", term), ("sort", "date")];
        if let Some(l) = loc.as_deref() {
            params.push(("l", l));
        }
        let url = search_url(&format!("https://{host}/jobs"), &params)?;

        let mut listings = fetch_listings(
            &self.fx,
            tier,
            PageRequest {
                url: &url,
                referer: Some(&base),
                wait_selector: Some(WAIT_SELECTOR),
                cards: &CARDS,
                base_url: &base,
            },
        )
        .await?;

        for l in &mut listings {
            if let Some(jk) = &l.key {
                l.url = Some(format!("https://{host}/viewjob?jk={jk}"));
            }
        }
        Ok(listings)
    }

    async fn fetch_feed(&self, term: &str, location: Option<&str>) -> Result<Vec<Listing>, FetchError> {
        let (host, loc) = locale(location);
        let mut params = vec![("q", term)];
        if let Some(l) = loc.as_deref() {
            params.push(("l", l));
        }
        if host == "www.indeed.com" {
            params.push(("jt", "internship"));
        }
        let url = search_url(&format!("https://{host}/rss"), &params)?;
        let page = self.fx.http.get(&url, None).await?;
        if !page.content_type.is_empty() && !page.content_type.contains("xml") {
            return Err(FetchError::ParseError(format!(
                "expected xml feed, got {}",
                page.content_type
            )));
        }
        Ok(parse_rss(&page.body)?.into_iter().map(feed_listing).collect())
    }
}

/// Feed titles read "Title - Company - Location".
fn feed_listing(item: FeedItem) -> Listing {
    let mut parts = item.title.split(" - ").map(str::trim);
    let title = parts.next().unwrap_or_default().to_string();
    let company = parts.next().map(str::to_string);
    let location = parts.next().map(str::to_string);
    Listing {
        title: clean_text(&title),
        company,
        location,
        description: item.description.as_deref().map(clean_text),
        url: item.link,
        key: None,
    }
}

#[async_trait]
impl SourceAdapter for IndeedAdapter {
    fn id(&self) -> SourceId {
        SourceId::INDEED
    }

    async fn fetch(
        &self,
        term: &str,
        location: Option<&str>,
        limit: usize,
        tier: Tier,
    ) -> Result<Vec<RawPosting>, FetchError> {
        let search = internship_term(term);
        let listings = match tier {
            Tier::StaticFetch | Tier::RenderedFetch => {
                self.fetch_page(&search, location, tier).await?
            }
            Tier::FeedFetch => self.fetch_feed(&search, location).await?,
        };

        let now = Utc::now();
        Ok(listings
            .into_iter()
            .take(limit)
            .map(|l| {
                l.into_posting(SourceId::INDEED, tier, now, location, |_| {
                    format!("Internship opportunity for {term} position")
                })
            })
            .collect())
    }
}
