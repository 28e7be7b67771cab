// src/sources/providers/skill_india.rs
//! Skill India Digital is an Angular app; only a rendered DOM has cards.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{fetch_listings, PageRequest};
use crate::sources::html::{CachedCards, CardSpec};
use crate::sources::types::{FetchError, RawPosting, SourceAdapter, SourceId, Tier};
use crate::sources::Fetchers;

const BASE: &str = "https://www.skillindiadigital.gov.in/";
const LISTING: &str = "https://www.skillindiadigital.gov.in/internship";
const PROVIDER: &str = "Skill India Digital";
const MIN_TITLE_CHARS: usize = 5;
const MAX_DESCRIPTION_CHARS: usize = 500;

static CARDS: CachedCards = CachedCards::new(CardSpec {
    cards: &[
        "mat-card",
        "div[class*='internship-card']",
        "div[class*='card']",
        "article",
    ],
    title: &[
        "mat-card-title",
        "h2",
        "h3",
        "h4",
        "[class*='title']",
        "[class*='heading']",
    ],
    company: &[
        "[class*='provider']",
        "[class*='company']",
        "[class*='organization']",
        "mat-card-subtitle",
    ],
    location: &["[class*='location']", "[class*='place']"],
    description: &[
        "p",
        "[class*='description']",
        "[class*='summary']",
        "mat-card-content",
    ],
    link: &["a[href]"],
    key_attr: None,
});

pub struct SkillIndiaAdapter {
    fx: Fetchers,
}

pub fn build(fx: &Fetchers) -> Arc<dyn SourceAdapter> {
    Arc::new(SkillIndiaAdapter { fx: fx.clone() })
}

#[async_trait]
impl SourceAdapter for SkillIndiaAdapter {
    fn id(&self) -> SourceId {
        SourceId::SKILL_INDIA
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["skillindiadigital", "skill india digital", "skillindia"]
    }

    fn supports(&self, tier: Tier) -> bool {
        tier == Tier::RenderedFetch
    }

    async fn fetch(
        &self,
        _term: &str,
        location: Option<&str>,
        limit: usize,
        tier: Tier,
    ) -> Result<Vec<RawPosting>, FetchError> {
        if !self.supports(tier) {
            return Err(FetchError::Unsupported(tier));
        }
        let listings = fetch_listings(
            &self.fx,
            tier,
            PageRequest {
                url: LISTING,
                referer: None,
                wait_selector: Some("mat-card, .internship-card, [class*='card'], app-root"),
                cards: &CARDS,
                base_url: BASE,
            },
        )
        .await?;

        let fallback_location = location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or("India");
        let now = Utc::now();
        Ok(listings
            .into_iter()
            .filter(|l| l.title.chars().count() >= MIN_TITLE_CHARS)
            .take(limit)
            .map(|mut l| {
                l.company = l.company.or_else(|| Some(PROVIDER.to_string()));
                l.url = l.url.or_else(|| Some(LISTING.to_string()));
                l.description = l
                    .description
                    .map(|d| d.chars().take(MAX_DESCRIPTION_CHARS).collect());
                let title = l.title.clone();
                l.into_posting(SourceId::SKILL_INDIA, tier, now, Some(fallback_location), |_| {
                    format!("Internship opportunity: {title}")
                })
            })
            .collect())
    }
}
