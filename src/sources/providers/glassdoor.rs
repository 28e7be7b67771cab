// src/sources/providers/glassdoor.rs
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{fetch_listings, search_url, PageRequest};
use crate::sources::html::{CachedCards, CardSpec};
use crate::sources::types::{FetchError, RawPosting, SourceAdapter, SourceId, Tier};
use crate::sources::{internship_term, Fetchers};

const BASE: &str = "https://www.glassdoor.com/";
const SEARCH: &str = "https://www.glassdoor.com/Job/jobs.htm";

static CARDS: CachedCards = CachedCards::new(CardSpec {
    cards: &[
        "li.react-job-listing",
        "div[data-test='job-listing']",
        "li[data-test='job-listing']",
        "li[data-test='jobListing']",
    ],
    title: &["a[data-test='job-link']", "a.jobLink", "a[data-test='job-title']"],
    company: &[
        "span[data-test='employer-name']",
        "div.d-flex",
        "[class*='EmployerProfile']",
    ],
    location: &[
        "span[data-test='job-location']",
        "span.css-1buaf54",
        "[data-test='emp-location']",
    ],
    description: &["[data-test='descSnippet']", "[class*='jobDescription']"],
    link: &["a[data-test='job-link']", "a.jobLink", "a[href]"],
    key_attr: Some("data-id"),
});

const WAIT_SELECTOR: &str = "li.react-job-listing, [data-test='job-listing'], [data-test='jobListing']";

pub struct GlassdoorAdapter {
    fx: Fetchers,
}

pub fn build(fx: &Fetchers) -> Arc<dyn SourceAdapter> {
    Arc::new(GlassdoorAdapter { fx: fx.clone() })
}

#[async_trait]
impl SourceAdapter for GlassdoorAdapter {
    fn id(&self) -> SourceId {
        SourceId::GLASSDOOR
    }

    fn supports(&self, tier: Tier) -> bool {
        matches!(tier, Tier::StaticFetch | Tier::RenderedFetch)
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
        let search = internship_term(term);
        let mut params = vec![("sc.keyword", search.as_str()), ("jobType", "internship")];
        if let Some(l) = location.map(str::trim).filter(|l| !l.is_empty()) {
            params.push(("locKeyword", l));
        }
        let url = search_url(SEARCH, &params)?;

        let listings = fetch_listings(
            &self.fx,
            tier,
            PageRequest {
                url: &url,
                referer: Some(BASE),
                wait_selector: Some(WAIT_SELECTOR),
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
                l.into_posting(SourceId::GLASSDOOR, tier, now, location, |company| {
                    format!("Internship opportunity at {company}")
                })
            })
            .collect())
    }
}
