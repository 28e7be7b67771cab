// src/sources/mod.rs
pub mod feed;
pub mod html;
pub mod http;
pub mod providers;
pub mod render;
pub mod types;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::sources::http::HttpFetcher;
use crate::sources::render::PageRenderer;
use crate::sources::types::{RawPosting, SourceAdapter, SourceId, Tier};

pub const DEFAULT_COMPANY: &str = "Company Not Specified";
pub const DEFAULT_LOCATION: &str = "Location Not Specified";

/// Normalize scraped text: decode entities, strip tags, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 2000 chars
    if out.chars().count() > 2000 {
        out = out.chars().take(2000).collect();
    }
    out
}

/// A job card as extracted from a page or feed, before source defaults are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    /// Board-specific job key (e.g. Indeed's `data-jk`).
    pub key: Option<String>,
}

impl Listing {
    pub fn into_posting(
        self,
        source: SourceId,
        tier: Tier,
        fetched_at: DateTime<Utc>,
        fallback_location: Option<&str>,
        fallback_description: impl FnOnce(&str) -> String,
    ) -> RawPosting {
        let company = non_empty(self.company).unwrap_or_else(|| DEFAULT_COMPANY.to_string());
        let location = non_empty(self.location)
            .or_else(|| fallback_location.map(str::to_string).and_then(|l| non_empty(Some(l))))
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        let description =
            non_empty(self.description).unwrap_or_else(|| fallback_description(&company));
        RawPosting {
            title: self.title,
            company,
            location,
            description,
            url: self.url.unwrap_or_default(),
            source,
            fetched_at,
            tier_used: tier,
        }
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Appends " intern" to a search term unless it already targets internships.
pub fn internship_term(term: &str) -> String {
    let t = term.trim();
    if t.to_ascii_lowercase().contains("intern") {
        t.to_string()
    } else {
        format!("{t} intern")
    }
}

/// Shared fetch primitives handed to every adapter.
#[derive(Clone)]
pub struct Fetchers {
    pub http: Arc<HttpFetcher>,
    pub renderer: Arc<dyn PageRenderer>,
}

type AdapterCtor = fn(&Fetchers) -> Arc<dyn SourceAdapter>;

/// Static table of built-in boards. Add a board here and nowhere else.
const BUILTIN: &[AdapterCtor] = &[
    providers::indeed::build,
    providers::glassdoor::build,
    providers::internships_com::build,
    providers::skill_india::build,
];

/// Registered adapters keyed by id.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: BTreeMap<SourceId, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin(fetchers: &Fetchers) -> Self {
        let mut reg = Self::new();
        for ctor in BUILTIN {
            reg.register(ctor(fetchers));
        }
        reg
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn ids(&self) -> Vec<SourceId> {
        self.adapters.keys().copied().collect()
    }

    pub fn get(&self, id: SourceId) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Resolve a request name ("Internships.com", "skill-india", "indeed") to an id.
    pub fn resolve(&self, name: &str) -> Option<SourceId> {
        let wanted = name_key(name);
        self.adapters.values().find_map(|a| {
            let id = a.id();
            let hit = name_key(id.as_str()) == wanted
                || a.aliases().iter().any(|al| name_key(al) == wanted);
            hit.then_some(id)
        })
    }

    /// Adapters for the requested ids; an empty request selects every registered source.
    pub fn select(&self, requested: &BTreeSet<SourceId>) -> Vec<Arc<dyn SourceAdapter>> {
        self.adapters
            .iter()
            .filter(|(id, _)| requested.is_empty() || requested.contains(id))
            .map(|(_, a)| a.clone())
            .collect()
    }
}

fn name_key(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
