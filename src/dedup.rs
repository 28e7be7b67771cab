// src/dedup.rs
//! Cross-source merge of raw postings into one canonical posting per key.

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::sources::types::{RawPosting, SourceId};

/// A deduplicated posting. Fields other than `sources` come from the group's representative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalPosting {
    #[serde(flatten)]
    pub posting: RawPosting,
    pub canonical_key: String,
    /// 0..=100, filled in by the scorer.
    pub score: f32,
    pub matched_keywords: BTreeSet<String>,
    pub sources: BTreeSet<SourceId>,
}

/// Lower-case, turn punctuation into spaces, collapse whitespace.
pub fn normalize_key_part(s: &str) -> String {
    static RE_PUNCT: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_PUNCT.get_or_init(|| regex::Regex::new(r"[^\p{L}\p{N}\s]+").unwrap());
    let lowered = s.to_lowercase();
    let spaced = re.replace_all(&lowered, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `company|title|location`, each part normalized.
pub fn canonical_key(p: &RawPosting) -> String {
    format!(
        "{}|{}|{}",
        normalize_key_part(&p.company),
        normalize_key_part(&p.title),
        normalize_key_part(&p.location)
    )
}

fn description_weight(p: &RawPosting) -> usize {
    p.description.trim().chars().count()
}

/// `Less` means `a` is the better representative: lower tier, then longer
/// description, then more recent fetch. Url and source settle exact ties so
/// the choice never depends on input order.
pub fn representative_order(a: &RawPosting, b: &RawPosting) -> Ordering {
    a.tier_used
        .cmp(&b.tier_used)
        .then_with(|| description_weight(b).cmp(&description_weight(a)))
        .then_with(|| b.fetched_at.cmp(&a.fetched_at))
        .then_with(|| a.url.cmp(&b.url))
        .then_with(|| a.source.cmp(&b.source))
}

/// Group by canonical key and keep one representative per group. Output is
/// ordered by key; scores are left at zero.
pub fn deduplicate(raw: Vec<RawPosting>) -> Vec<CanonicalPosting> {
    let mut groups: BTreeMap<String, (RawPosting, BTreeSet<SourceId>)> = BTreeMap::new();

    for p in raw {
        let key = canonical_key(&p);
        match groups.get_mut(&key) {
            Some((best, sources)) => {
                sources.insert(p.source);
                if representative_order(&p, best) == Ordering::Less {
                    *best = p;
                }
            }
            None => {
                let sources = BTreeSet::from([p.source]);
                groups.insert(key, (p, sources));
            }
        }
    }

    groups
        .into_iter()
        .map(|(canonical_key, (posting, sources))| CanonicalPosting {
            posting,
            canonical_key,
            score: 0.0,
            matched_keywords: BTreeSet::new(),
            sources,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::types::Tier;
    use chrono::{TimeZone, Utc};

    fn posting(company: &str, title: &str, desc: &str, source: SourceId, tier: Tier) -> RawPosting {
        RawPosting {
            title: title.into(),
            company: company.into(),
            location: "Remote".into(),
            description: desc.into(),
            url: format!("https://{}.test/{}", source, title.len()),
            source,
            fetched_at: Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap(),
            tier_used: tier,
        }
    }

    #[test]
    fn key_normalization_collapses_punctuation_and_case() {
        assert_eq!(normalize_key_part("  Acme, Inc. "), "acme inc");
        assert_eq!(normalize_key_part("Back-end   Intern!"), "back end intern");
        assert_eq!(normalize_key_part("Zürich"), "zürich");
    }

    #[test]
    fn lower_tier_wins_before_description_length() {
        let a = posting("Acme", "Intern", "short", SourceId::INDEED, Tier::StaticFetch);
        let b = posting("ACME", "intern", "a much longer description", SourceId::GLASSDOOR, Tier::FeedFetch);
        let out = deduplicate(vec![b, a.clone()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].posting, a);
        assert_eq!(
            out[0].sources,
            BTreeSet::from([SourceId::INDEED, SourceId::GLASSDOOR])
        );
    }

    #[test]
    fn newer_fetch_breaks_remaining_ties() {
        let old = posting("Acme", "Intern", "same", SourceId::INDEED, Tier::StaticFetch);
        let mut new = old.clone();
        new.fetched_at = old.fetched_at + chrono::Duration::hours(1);
        new.url = "https://z.test".into();
        let out = deduplicate(vec![old, new.clone()]);
        assert_eq!(out[0].posting, new);
    }

    #[test]
    fn input_order_does_not_matter() {
        let items = vec![
            posting("Acme", "Intern", "x", SourceId::INDEED, Tier::StaticFetch),
            posting("Acme", "Intern", "x", SourceId::GLASSDOOR, Tier::StaticFetch),
            posting("Initech", "Data Intern", "y", SourceId::GLASSDOOR, Tier::RenderedFetch),
        ];
        let mut reversed = items.clone();
        reversed.reverse();
        assert_eq!(deduplicate(items), deduplicate(reversed));
    }
}
