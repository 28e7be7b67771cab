// src/sources/html.rs
//! Selector-driven job-card extraction shared by the static and rendered tiers.

use once_cell::sync::OnceCell;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::sources::types::FetchError;
use crate::sources::{clean_text, Listing};

/// Ordered CSS selector fallbacks for one board's result page.
/// For `cards` the first selector with any match wins; for fields the first
/// selector yielding non-empty text wins.
#[derive(Debug, Clone, Copy)]
pub struct CardSpec {
    pub cards: &'static [&'static str],
    pub title: &'static [&'static str],
    pub company: &'static [&'static str],
    pub location: &'static [&'static str],
    pub description: &'static [&'static str],
    pub link: &'static [&'static str],
    /// Attribute on the card carrying a stable job key.
    pub key_attr: Option<&'static str>,
}

const MIN_TITLE_CHARS: usize = 3;

/// A board's `CardSpec` with every selector parsed.
pub struct CardSelectors {
    cards: Vec<Selector>,
    title: Vec<Selector>,
    company: Vec<Selector>,
    location: Vec<Selector>,
    description: Vec<Selector>,
    link: Vec<Selector>,
    key_attr: Option<&'static str>,
}

fn compile(list: &[&str]) -> Result<Vec<Selector>, FetchError> {
    list.iter()
        .map(|s| {
            Selector::parse(s).map_err(|e| FetchError::ParseError(format!("selector {s:?}: {e:?}")))
        })
        .collect()
}

impl CardSpec {
    pub fn compile(&self) -> Result<CardSelectors, FetchError> {
        Ok(CardSelectors {
            cards: compile(self.cards)?,
            title: compile(self.title)?,
            company: compile(self.company)?,
            location: compile(self.location)?,
            description: compile(self.description)?,
            link: compile(self.link)?,
            key_attr: self.key_attr,
        })
    }
}

/// A board's card spec, compiled on first use and kept for the process.
pub struct CachedCards {
    spec: CardSpec,
    compiled: OnceCell<CardSelectors>,
}

impl CachedCards {
    pub const fn new(spec: CardSpec) -> Self {
        Self {
            spec,
            compiled: OnceCell::new(),
        }
    }

    pub fn selectors(&self) -> Result<&CardSelectors, FetchError> {
        self.compiled.get_or_try_init(|| self.spec.compile())
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(card: ElementRef<'_>, sels: &[Selector]) -> Option<String> {
    sels.iter()
        .flat_map(|s| card.select(s))
        .map(element_text)
        .find(|t| !t.is_empty())
}

/// Resolves `href` against `base_url`; drops `javascript:` and fragment-only links.
pub fn absolutize(base_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let base = Url::parse(base_url).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Extract job cards from `html`. A page with no recognizable cards yields an
/// empty list; broken selectors already failed in `CardSpec::compile`.
pub fn parse_cards(html: &str, sel: &CardSelectors, base_url: &str) -> Vec<Listing> {
    let doc = Html::parse_document(html);

    let Some(cards) = sel
        .cards
        .iter()
        .map(|s| doc.select(s).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
    else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(cards.len());
    for card in cards {
        let Some(title) = first_text(card, &sel.title) else {
            continue;
        };
        if title.chars().count() < MIN_TITLE_CHARS {
            continue;
        }

        let key = sel
            .key_attr
            .and_then(|a| card.value().attr(a))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let url = sel
            .link
            .iter()
            .flat_map(|s| card.select(s))
            .chain(std::iter::once(card))
            .filter_map(|el| el.value().attr("href"))
            .find_map(|href| absolutize(base_url, href));

        out.push(Listing {
            title,
            company: first_text(card, &sel.company),
            location: first_text(card, &sel.location),
            description: first_text(card, &sel.description),
            url,
            key,
        });
    }
    out
}
