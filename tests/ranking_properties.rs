// tests/ranking_properties.rs
//
// Dedup and scoring properties over hand-picked posting sets.

use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;

use internship_scout::dedup::deduplicate;
use internship_scout::relevance::{scoring_terms, RelevanceScorer};
use internship_scout::sources::types::{RawPosting, SourceId, Tier};

fn raw(title: &str, company: &str, desc: &str, source: SourceId, tier: Tier) -> RawPosting {
    RawPosting {
        title: title.into(),
        company: company.into(),
        location: "Bengaluru, Karnataka".into(),
        description: desc.into(),
        url: format!("https://{source}.test/{}", title.len() + desc.len()),
        source,
        fetched_at: Utc.with_ymd_and_hms(2025, 11, 3, 9, 30, 0).unwrap(),
        tier_used: tier,
    }
}

fn sample() -> Vec<RawPosting> {
    vec![
        raw("Backend Intern", "Acme", "", SourceId::INDEED, Tier::StaticFetch),
        raw("Backend Intern", "ACME", "Go and Postgres", SourceId::GLASSDOOR, Tier::RenderedFetch),
        raw("backend intern.", "Acme", "Go, Postgres, Kafka", SourceId::INTERNSHIPS_COM, Tier::StaticFetch),
        raw("Data Analyst Intern", "Initech", "SQL", SourceId::INDEED, Tier::FeedFetch),
        raw("Data Analyst Intern", "Initech", "SQL dashboards", SourceId::INDEED, Tier::FeedFetch),
        raw("ML Intern", "Hooli", "PyTorch", SourceId::SKILL_INDIA, Tier::RenderedFetch),
    ]
}

#[test]
fn dedup_is_idempotent_and_order_independent() {
    let first = deduplicate(sample());
    let second = deduplicate(sample());
    assert_eq!(first, second);

    let mut reversed = sample();
    reversed.reverse();
    assert_eq!(deduplicate(reversed), first);

    let mut rotated = sample();
    rotated.rotate_left(2);
    assert_eq!(deduplicate(rotated), first);
}

#[test]
fn dedup_merges_sources_and_picks_best_representative() {
    let out = deduplicate(sample());
    assert_eq!(out.len(), 3);

    let backend = out
        .iter()
        .find(|p| p.canonical_key.starts_with("acme|backend intern"))
        .unwrap();
    // Cheapest tier first, then the longest description.
    assert_eq!(backend.posting.source, SourceId::INTERNSHIPS_COM);
    assert_eq!(backend.posting.description, "Go, Postgres, Kafka");
    assert_eq!(backend.sources.len(), 3);

    let data = out.iter().find(|p| p.posting.company == "Initech").unwrap();
    assert_eq!(data.posting.description, "SQL dashboards");
}

#[test]
fn title_match_strictly_beats_identical_posting_without_it() {
    let scorer = RelevanceScorer::default();
    let cases: &[(&[&str], &str, &str, &str)] = &[
        (&["python", "django"], "Django Intern", "Python Django Intern", "web apps"),
        (&["data", "analyst"], "Intern", "Data Intern", "analyst role"),
        (&["machine learning"], "Research Intern", "Machine Learning Research Intern", ""),
        (&["react", "node", "sql", "aws"], "Node Intern", "React Node Intern", "sql on aws"),
    ];
    for (terms, without, with, desc) in cases {
        let terms = scoring_terms(terms);
        let lo = scorer.score(without, desc, &terms).score;
        let hi = scorer.score(with, desc, &terms).score;
        assert!(hi > lo, "{with:?} ({hi}) should beat {without:?} ({lo})");
        assert!((0.0..=100.0).contains(&hi) && (0.0..=100.0).contains(&lo));
    }
}

#[test]
fn ranked_output_is_sorted_and_keys_unique() {
    let now = Utc.with_ymd_and_hms(2025, 11, 4, 0, 0, 0).unwrap();
    let ranked = RelevanceScorer::default().rank(
        deduplicate(sample()),
        &scoring_terms(&["backend", "sql"]),
        now,
    );
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    let keys: BTreeSet<&str> = ranked.iter().map(|p| p.canonical_key.as_str()).collect();
    assert_eq!(keys.len(), ranked.len());
    assert_eq!(ranked[0].posting.title, "backend intern.");
    assert!(ranked[0].matched_keywords.contains("backend"));
}
