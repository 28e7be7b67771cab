// src/relevance.rs
//! Keyword relevance: tokenizer, stem-insensitive term matching, 0..=100 scoring
//! and the total ranking order.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::info;

use crate::dedup::CanonicalPosting;

pub const TITLE_WEIGHT: f32 = 3.0;
pub const BODY_WEIGHT: f32 = 1.0;

pub const ENV_DEV_LOG: &str = "SCOUT_DEV_LOG";

// Dev logging gate: SCOUT_DEV_LOG=1 AND dev env (debug or SHUTTLE_ENV in {local,development,dev})
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var(ENV_DEV_LOG).ok().as_deref() == Some("1");
    if !on {
        return false;
    }
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("SHUTTLE_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

/// Short, stable, non-reversible id for free text that must not hit the logs.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub(crate) fn truncate_vec<T: ToString>(v: &[T], max: usize) -> Vec<String> {
    v.iter().take(max).map(|x| x.to_string()).collect()
}

fn dev_log_score(title: &str, matched: &BTreeSet<String>, weighted: f32, score: f32) {
    if !dev_logging_enabled() {
        return;
    }
    let id = anon_hash(title);
    let matched: Vec<&String> = matched.iter().collect();
    let matched_short = truncate_vec(&matched, 5);
    // Never log raw text. Only hashed id + short lists.
    info!(
        target: "relevance",
        %id, %score, %weighted,
        matched = ?matched_short
    );
}

/// Lower-cased word tokens; Unicode-aware.
pub fn tokenize(input: &str) -> Vec<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"(?u)\b\w+\b").unwrap());
    re.find_iter(input).map(|m| m.as_str().to_lowercase()).collect()
}

const SUFFIXES: &[&str] = &[
    "ships", "ship", "ments", "ment", "ings", "ing", "ers", "er", "ies", "ed", "es", "s",
];

/// Crude suffix stripper; never shortens a word below three characters.
pub fn stem(word: &str) -> &str {
    for suf in SUFFIXES {
        if let Some(base) = word.strip_suffix(suf) {
            if base.chars().count() >= 3 {
                return base;
            }
        }
    }
    word
}

fn word_matches(word: &str, token: &str) -> bool {
    if word == token {
        return true;
    }
    let (ws, ts) = (stem(word), stem(token));
    ws == ts || (ws.chars().count() >= 3 && token.contains(ws))
}

/// Every word of `term` must match some token.
fn term_in(term_words: &[String], tokens: &BTreeSet<String>) -> bool {
    !term_words.is_empty()
        && term_words
            .iter()
            .all(|w| tokens.iter().any(|t| word_matches(w, t)))
}

/// Trimmed, lower-cased, de-duplicated terms in first-seen order.
pub fn scoring_terms<S: AsRef<str>>(terms: &[S]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    terms
        .iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relevance {
    pub score: f32,
    pub matched: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RelevanceScorer {
    pub title_weight: f32,
    pub body_weight: f32,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self {
            title_weight: TITLE_WEIGHT,
            body_weight: BODY_WEIGHT,
        }
    }
}

impl RelevanceScorer {
    /// `score = 100 * min(1, weighted / (title_weight * n))`; a term found in
    /// the title counts `title_weight`, otherwise in the description `body_weight`.
    pub fn score(&self, title: &str, description: &str, terms: &[String]) -> Relevance {
        if terms.is_empty() {
            return Relevance {
                score: 0.0,
                matched: BTreeSet::new(),
            };
        }
        let title_tokens: BTreeSet<String> = tokenize(title).into_iter().collect();
        let body_tokens: BTreeSet<String> = tokenize(description).into_iter().collect();

        let mut weighted = 0.0f32;
        let mut matched = BTreeSet::new();
        for term in terms {
            let words = tokenize(term);
            if term_in(&words, &title_tokens) {
                weighted += self.title_weight;
                matched.insert(term.clone());
            } else if term_in(&words, &body_tokens) {
                weighted += self.body_weight;
                matched.insert(term.clone());
            }
        }

        let max = self.title_weight * terms.len() as f32;
        let score = if max > 0.0 {
            (100.0 * (weighted / max).min(1.0)).clamp(0.0, 100.0)
        } else {
            0.0
        };
        dev_log_score(title, &matched, weighted, score);
        Relevance { score, matched }
    }

    /// Score every posting and sort into the final, total result order.
    pub fn rank(
        &self,
        mut postings: Vec<CanonicalPosting>,
        terms: &[String],
        now: DateTime<Utc>,
    ) -> Vec<CanonicalPosting> {
        for p in &mut postings {
            let r = self.score(&p.posting.title, &p.posting.description, terms);
            p.score = r.score;
            p.matched_keywords = r.matched;
        }
        postings.sort_by(|a, b| result_order(a, b, now));
        postings
    }
}

fn age_days(p: &CanonicalPosting, now: DateTime<Utc>) -> i64 {
    (now.date_naive() - p.posting.fetched_at.date_naive())
        .num_days()
        .max(0)
}

/// Score desc, then fewer days since fetch, then company (case-insensitive), then key.
pub fn result_order(a: &CanonicalPosting, b: &CanonicalPosting, now: DateTime<Utc>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| age_days(a, now).cmp(&age_days(b, now)))
        .then_with(|| {
            a.posting
                .company
                .to_lowercase()
                .cmp(&b.posting.company.to_lowercase())
        })
        .then_with(|| a.canonical_key.cmp(&b.canonical_key))
}
