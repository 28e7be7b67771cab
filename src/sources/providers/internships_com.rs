// src/sources/providers/internships_com.rs
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{fetch_listings, search_url, PageRequest};
use crate::sources::html::{CachedCards, CardSpec};
use crate::sources::types::{FetchError, RawPosting, SourceAdapter, SourceId, Tier};
use crate::sources::Fetchers;

const BASE: &str = "https://www.internships.com/";
const SEARCH: &str = "https://www.internships.com/search";

static CARDS: CachedCards = CachedCards::new(CardSpec {
    cards: &["div.internship", "div[data-internship-id]", "article.internship"],
    title: &["h3.title", "h2", "a.title", "h3"],
    company: &["div.company", "span.company"],
    location: &["div.location", "span.location"],
    description: &[".description", ".summary", "p"],
    link: &["a.title[href]", "a[href]"],
    key_attr: Some("data-internship-id"),
});

pub struct InternshipsComAdapter {
    fx: Fetchers,
}

pub fn build(fx: &Fetchers) -> Arc<dyn SourceAdapter> {
    Arc::new(InternshipsComAdapter { fx: fx.clone() })
}

#[async_trait]
impl SourceAdapter for InternshipsComAdapter {
    fn id(&self) -> SourceId {
        SourceId::INTERNSHIPS_COM
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["internships.com", "internships"]
    }

    fn supports(&self, tier: Tier) -> bool {
        tier != Tier::FeedFetch
    }

    async fn fetch(
        &self,
        term: &str,
        location: Option<&str>,
        limit: usize,
        tier: Tier,
    ) -> Result<Vec<RawPosting>, FetchError> {
        if !self.supports(tier) {
            return Err(FetchError::Unsupported(tier));
        }
        // The board is internship-only; the bare term searches better.
        let url = search_url(SEARCH, &[("q", term.trim())])?;

        let listings = fetch_listings(
            &self.fx,
            tier,
            PageRequest {
                url: &url,
                referer: Some(BASE),
                wait_selector: Some("div.internship, [data-internship-id], article.internship"),
                cards: &CARDS,
                base_url: BASE,
            },
        )
        .await?;

        let now = Utc::now();
        Ok(listings
            .into_iter()
            .take(limit)
            .map(|l| {
                l.into_posting(SourceId::INTERNSHIPS_COM, tier, now, location, |company| {
                    format!("Internship opportunity at {company}")
                })
            })
            .collect())
    }
}
