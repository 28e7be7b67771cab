// src/sources/providers/mod.rs
//! Built-in job boards. Each module exposes `build(&Fetchers)`.

pub mod glassdoor;
pub mod indeed;
pub mod internships_com;
pub mod skill_india;

use crate::sources::html::{parse_cards, CachedCards};
use crate::sources::types::{FetchError, Tier};
use crate::sources::{Fetchers, Listing};

/// Where to load a result page from and how to recognize it once loaded.
pub(crate) struct PageRequest<'a> {
    pub url: &'a str,
    pub referer: Option<&'a str>,
    pub wait_selector: Option<&'a str>,
    pub cards: &'a CachedCards,
    pub base_url: &'a str,
}

/// Loads a page through the tier's primitive and extracts its cards.
pub(crate) async fn fetch_listings(
    fx: &Fetchers,
    tier: Tier,
    req: PageRequest<'_>,
) -> Result<Vec<Listing>, FetchError> {
    let body = match tier {
        Tier::StaticFetch => fx.http.get(req.url, req.referer).await?.body,
        Tier::RenderedFetch => fx.renderer.render(req.url, req.wait_selector).await?,
        Tier::FeedFetch => return Err(FetchError::Unsupported(tier)),
    };
    Ok(parse_cards(&body, req.cards.selectors()?, req.base_url))
}

/// Builds a search URL with properly encoded query parameters.
pub(crate) fn search_url(base: &str, params: &[(&str, &str)]) -> Result<String, FetchError> {
    reqwest::Url::parse_with_params(base, params)
        .map(|u| u.to_string())
        .map_err(|e| FetchError::Permanent(format!("bad search url {base}: {e}")))
}
