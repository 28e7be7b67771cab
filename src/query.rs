// src/query.rs
//! Raw query + profile skills -> per-source search terms.

use metrics::counter;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{info, warn};

use crate::refine::{DynRefiner, RefineRequest, RefinedQuery};
use crate::relevance::{anon_hash, scoring_terms, tokenize};
use crate::sources::internship_term;
use crate::sources::types::SourceId;

pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "in", "at", "for", "of", "to", "with", "on", "intern",
    "internship", "internships",
];

pub const MAX_SKILLS: usize = 3;
pub const SKILL_SIMILARITY_MIN: f64 = 0.85;
const MAX_SKILL_TERMS: usize = 2;

/// How the search terms were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Refined,
    FallbackDisabled,
    FallbackTimeout,
    FallbackEmpty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuery {
    pub original_query: String,
    /// Core keywords (refined or tokenized).
    pub keywords: Vec<String>,
    /// Profile skills selected for this query, most similar first.
    pub skills: Vec<String>,
    pub per_source: BTreeMap<SourceId, Vec<String>>,
    pub location: Option<String>,
    pub strategy: Strategy,
    pub strategy_note: Option<String>,
}

impl NormalizedQuery {
    pub fn refined(&self) -> bool {
        self.strategy == Strategy::Refined
    }

    /// Keywords union selected skills, lower-cased and de-duplicated.
    pub fn scoring_terms(&self) -> Vec<String> {
        let all: Vec<&String> = self.keywords.iter().chain(self.skills.iter()).collect();
        scoring_terms(&all)
    }

    /// Distinct search terms across sources, first-seen order.
    pub fn all_terms(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.per_source
            .values()
            .flatten()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }
}

/// Lower-cased tokens with stop-words removed, de-duplicated in order.
/// A query made only of stop-words keeps its tokens.
pub fn fallback_keywords(raw: &str) -> Vec<String> {
    let tokens = tokenize(raw);
    let mut seen = BTreeSet::new();
    let kept: Vec<String> = tokens
        .iter()
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.to_string()))
        .cloned()
        .collect();
    if kept.is_empty() {
        let mut seen = BTreeSet::new();
        tokens.into_iter().filter(|t| seen.insert(t.clone())).collect()
    } else {
        kept
    }
}

fn skill_similarity(skill: &str, keywords: &[String], query: &str) -> f64 {
    let s = skill.trim().to_lowercase();
    if s.is_empty() {
        return 0.0;
    }
    // Substring checks only for parts long enough not to match by accident ("r", "go").
    let long = |t: &str| t.chars().count() >= 3;
    let q = query.to_lowercase();
    if long(s.as_str()) && q.contains(&s) {
        return 1.0;
    }
    let skill_tokens: BTreeSet<String> = tokenize(&s).into_iter().collect();
    let mut best = 0.0f64;
    for kw in keywords {
        if skill_tokens.contains(kw)
            || (long(kw.as_str()) && s.contains(kw.as_str()))
            || (long(s.as_str()) && kw.contains(s.as_str()))
        {
            return 1.0;
        }
        best = best.max(strsim::jaro_winkler(&s, kw));
        for t in &skill_tokens {
            best = best.max(strsim::jaro_winkler(t, kw));
        }
    }
    best
}

/// Up to `MAX_SKILLS` profile skills most similar to the query; ties keep input order.
pub fn select_skills(query: &str, keywords: &[String], skills: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut scored: Vec<(f64, &String)> = skills
        .iter()
        .filter(|s| !s.trim().is_empty() && seen.insert(s.trim().to_lowercase()))
        .map(|s| (skill_similarity(s, keywords, query), s))
        .filter(|(sim, _)| *sim >= SKILL_SIMILARITY_MIN)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(MAX_SKILLS)
        .map(|(_, s)| s.trim().to_string())
        .collect()
}

/// Core term first, then up to two `<skill> intern` terms; capped at `max_terms`.
pub fn build_terms(core: &str, skills: &[String], max_terms: usize) -> Vec<String> {
    let mut terms = Vec::new();
    let core = core.trim();
    if !core.is_empty() {
        terms.push(internship_term(core));
    }
    let core_lower = core.to_lowercase();
    for skill in skills.iter().take(MAX_SKILL_TERMS) {
        let s = skill.trim().to_lowercase();
        if s.is_empty() || core_lower.contains(&s) {
            continue;
        }
        let t = internship_term(&s);
        if !terms.contains(&t) {
            terms.push(t);
        }
    }
    terms.truncate(max_terms.max(1));
    terms
}

pub struct QueryNormalizer {
    refiner: DynRefiner,
    timeout: Duration,
    max_terms: usize,
}

impl QueryNormalizer {
    pub fn new(refiner: DynRefiner, timeout: Duration, max_terms: usize) -> Self {
        Self {
            refiner,
            timeout,
            max_terms,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.refiner.provider_name()
    }

    /// Never fails and never waits longer than the refinement timeout.
    pub async fn normalize(
        &self,
        raw: &str,
        location: Option<&str>,
        skills: &[String],
        sources: &[SourceId],
    ) -> NormalizedQuery {
        let location = location.map(str::trim).filter(|l| !l.is_empty());
        let req = RefineRequest {
            query: raw.trim().to_string(),
            location: location.map(str::to_string),
            skills: skills.to_vec(),
        };

        let (refined, strategy) = if !self.refiner.is_enabled() {
            (None, Strategy::FallbackDisabled)
        } else {
            match tokio::time::timeout(self.timeout, self.refiner.refine(&req)).await {
                Ok(Some(r)) => (Some(r), Strategy::Refined),
                Ok(None) => (None, Strategy::FallbackEmpty),
                Err(_) => {
                    warn!(
                        target: "query",
                        timeout_ms = self.timeout.as_millis() as u64,
                        "query refinement timed out"
                    );
                    (None, Strategy::FallbackTimeout)
                }
            }
        };
        if strategy != Strategy::Refined {
            counter!("query_refine_fallback_total", "reason" => strategy_label(strategy))
                .increment(1);
        }

        let out = self.assemble(raw, location, skills, sources, refined, strategy);
        info!(
            target: "query",
            id = %anon_hash(raw),
            strategy = strategy_label(out.strategy),
            keywords = out.keywords.len(),
            skills = out.skills.len(),
            terms = out.all_terms().len(),
            "query normalized"
        );
        out
    }

    fn assemble(
        &self,
        raw: &str,
        location: Option<&str>,
        skills: &[String],
        sources: &[SourceId],
        refined: Option<RefinedQuery>,
        strategy: Strategy,
    ) -> NormalizedQuery {
        let (keywords, core, location, note) = match refined {
            Some(r) => {
                let mut keywords = scoring_terms(&r.keywords);
                if keywords.is_empty() {
                    keywords = fallback_keywords(&r.optimized_query);
                }
                let core = if r.optimized_query.trim().is_empty() {
                    keywords.join(" ")
                } else {
                    r.optimized_query.clone()
                };
                let loc = r.location.or_else(|| location.map(str::to_string));
                (keywords, core, loc, r.search_strategy)
            }
            None => {
                let keywords = fallback_keywords(raw);
                let core = keywords.join(" ");
                (keywords, core, location.map(str::to_string), None)
            }
        };

        let selected = select_skills(raw, &keywords, skills);
        let terms = build_terms(&core, &selected, self.max_terms);
        let per_source = sources.iter().map(|s| (*s, terms.clone())).collect();

        NormalizedQuery {
            original_query: raw.trim().to_string(),
            keywords,
            skills: selected,
            per_source,
            location,
            strategy,
            strategy_note: note,
        }
    }
}

pub fn strategy_label(s: Strategy) -> &'static str {
    match s {
        Strategy::Refined => "refined",
        Strategy::FallbackDisabled => "fallback_disabled",
        Strategy::FallbackTimeout => "fallback_timeout",
        Strategy::FallbackEmpty => "fallback_empty",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refine::{DisabledRefiner, QueryRefiner};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;

    struct Slow;
    impl QueryRefiner for Slow {
        fn refine<'a>(
            &'a self,
            _req: &'a RefineRequest,
        ) -> Pin<Box<dyn Future<Output = Option<RefinedQuery>> + Send + 'a>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                None
            })
        }
        fn provider_name(&self) -> &'static str {
            "slow"
        }
    }

    struct Fixed;
    impl QueryRefiner for Fixed {
        fn refine<'a>(
            &'a self,
            _req: &'a RefineRequest,
        ) -> Pin<Box<dyn Future<Output = Option<RefinedQuery>> + Send + 'a>> {
            Box::pin(async { Some(fixed_reply()) })
        }
        fn provider_name(&self) -> &'static str {
            "fixed"
        }
    }

    fn fixed_reply() -> RefinedQuery {
        RefinedQuery {
            optimized_query: "software engineer intern".into(),
            location: Some("Bengaluru, Karnataka".into()),
            keywords: vec!["Software Engineer".into()],
            search_strategy: Some("role terms".into()),
        }
    }

    /// Counts calls; enablement and name are independent.
    struct Counting {
        enabled: bool,
        name: &'static str,
        calls: std::sync::atomic::AtomicUsize,
    }
    impl QueryRefiner for Counting {
        fn refine<'a>(
            &'a self,
            _req: &'a RefineRequest,
        ) -> Pin<Box<dyn Future<Output = Option<RefinedQuery>> + Send + 'a>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Box::pin(async { Some(fixed_reply()) })
        }
        fn provider_name(&self) -> &'static str {
            self.name
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    fn skills(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fallback_tokenization_drops_stop_words() {
        assert_eq!(
            fallback_keywords("The Backend Internship in Rust and Go"),
            vec!["backend", "rust", "go"]
        );
        assert_eq!(fallback_keywords("Internship"), vec!["internship"]);
    }

    #[test]
    fn skills_ranked_by_similarity_then_input_order() {
        let kws = fallback_keywords("python backend developer");
        let picked = select_skills(
            "python backend developer",
            &kws,
            &skills(&["Figma", "Django", "Python", "Backend Development", "Developer Tools", "Go"]),
        );
        assert_eq!(picked, vec!["Python", "Backend Development", "Developer Tools"]);
    }

    #[test]
    fn near_spellings_pass_jaro_winkler() {
        let kws = vec!["javascript".to_string()];
        assert_eq!(
            select_skills("javascript", &kws, &skills(&["Javascrpt", "Cobol"])),
            vec!["Javascrpt"]
        );
    }

    #[test]
    fn terms_are_core_then_skills_capped() {
        let t = build_terms("data science", &skills(&["Python", "SQL", "Tableau"]), 3);
        assert_eq!(t, vec!["data science intern", "python intern", "sql intern"]);
        let t = build_terms("python backend", &skills(&["Python", "SQL"]), 2);
        assert_eq!(t, vec!["python backend intern", "sql intern"]);
        assert_eq!(build_terms("ml", &skills(&["Rust"]), 1), vec!["ml intern"]);
    }

    #[tokio::test]
    async fn disabled_refiner_uses_fallback() {
        let n = QueryNormalizer::new(Arc::new(DisabledRefiner), Duration::from_secs(3), 3);
        let q = n
            .normalize("Backend intern", Some(" Remote "), &[], &[SourceId::INDEED])
            .await;
        assert_eq!(q.strategy, Strategy::FallbackDisabled);
        assert_eq!(q.keywords, vec!["backend"]);
        assert_eq!(q.location.as_deref(), Some("Remote"));
        assert_eq!(q.per_source[&SourceId::INDEED], vec!["backend intern"]);
    }

    #[tokio::test]
    async fn enablement_does_not_depend_on_provider_name() {
        let off = Arc::new(Counting {
            enabled: false,
            name: "openai",
            calls: Default::default(),
        });
        let n = QueryNormalizer::new(off.clone(), Duration::from_secs(1), 3);
        let q = n.normalize("data analyst", None, &[], &[SourceId::INDEED]).await;
        assert_eq!(q.strategy, Strategy::FallbackDisabled);
        assert_eq!(off.calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        let on = Arc::new(Counting {
            enabled: true,
            name: "disabled",
            calls: Default::default(),
        });
        let n = QueryNormalizer::new(on.clone(), Duration::from_secs(1), 3);
        let q = n.normalize("swe", None, &[], &[SourceId::INDEED]).await;
        assert_eq!(q.strategy, Strategy::Refined);
        assert_eq!(on.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_refiner_times_out_to_fallback() {
        let n = QueryNormalizer::new(Arc::new(Slow), Duration::from_millis(50), 3);
        let t0 = std::time::Instant::now();
        let q = n.normalize("data analyst", None, &[], &[SourceId::GLASSDOOR]).await;
        assert!(t0.elapsed() < Duration::from_secs(2));
        assert_eq!(q.strategy, Strategy::FallbackTimeout);
        assert_eq!(q.keywords, vec!["data", "analyst"]);
    }

    #[tokio::test]
    async fn refined_terms_and_location_are_used() {
        let n = QueryNormalizer::new(Arc::new(Fixed), Duration::from_secs(1), 3);
        let q = n
            .normalize("swe", Some("bangalore"), &skills(&["Java"]), &[SourceId::INDEED])
            .await;
        assert!(q.refined());
        assert_eq!(q.keywords, vec!["software engineer"]);
        assert_eq!(q.location.as_deref(), Some("Bengaluru, Karnataka"));
        assert_eq!(q.per_source[&SourceId::INDEED][0], "software engineer intern");
        assert_eq!(q.scoring_terms(), vec!["software engineer"]);
    }
}
