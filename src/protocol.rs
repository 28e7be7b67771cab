// src/protocol.rs
//! Wire shapes: progress events, the scrape response, and SSE framing.

use chrono::SecondsFormat;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::dedup::CanonicalPosting;
use crate::query::{strategy_label, NormalizedQuery};
use crate::session::{SourceStatus, TerminalState};
use crate::sources::types::{SourceId, Tier};

/// One per SourceStatus transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub source: SourceId,
    pub status: &'static str,
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProgressEvent {
    /// `tier` is the tier in play (the one being fetched, or the last one tried).
    pub fn new(source: SourceId, status: &SourceStatus, tier: Option<Tier>) -> Self {
        let (tier, count, reason) = match status {
            SourceStatus::Pending => (None, None, None),
            SourceStatus::Fetching(t) => (Some(*t), None, None),
            SourceStatus::Succeeded(n) => (tier, Some(*n), None),
            SourceStatus::FailedAllTiers(r) => (tier, None, Some(r.clone())),
            SourceStatus::TimedOut => (tier, None, None),
        };
        Self {
            source,
            status: status.label(),
            tier,
            count,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityOut {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
    pub source: String,
    pub match_score: f32,
    pub matched_keywords: Vec<String>,
    pub scraped_at: String,
    pub tier_used: Option<Tier>,
    pub sources: Vec<String>,
}

impl From<&CanonicalPosting> for OpportunityOut {
    fn from(p: &CanonicalPosting) -> Self {
        Self {
            title: p.posting.title.clone(),
            company: p.posting.company.clone(),
            location: p.posting.location.clone(),
            description: p.posting.description.clone(),
            url: p.posting.url.clone(),
            source: p.posting.source.to_string(),
            match_score: round1(p.score),
            matched_keywords: p.matched_keywords.iter().cloned().collect(),
            scraped_at: p.posting.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            tier_used: Some(p.posting.tier_used),
            sources: p.sources.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn round1(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOptimization {
    pub original_query: String,
    pub optimized_terms: Vec<String>,
    pub keywords: Vec<String>,
    pub skills: Vec<String>,
    pub optimized_location: Option<String>,
    pub refined: bool,
    pub strategy: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<&NormalizedQuery> for QueryOptimization {
    fn from(q: &NormalizedQuery) -> Self {
        Self {
            original_query: q.original_query.clone(),
            optimized_terms: q.all_terms(),
            keywords: q.keywords.clone(),
            skills: q.skills.clone(),
            optimized_location: q.location.clone(),
            refined: q.refined(),
            strategy: strategy_label(q.strategy),
            note: q.strategy_note.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapeResponse {
    pub success: bool,
    pub session_id: String,
    pub terminal_state: TerminalState,
    pub total_results: usize,
    pub has_fallback: bool,
    pub opportunities: Vec<OpportunityOut>,
    pub scraped_sources: Vec<SourceId>,
    pub source_statuses: BTreeMap<SourceId, ProgressEvent>,
    pub query_optimization: QueryOptimization,
    pub elapsed_ms: u64,
}

/// Server-sent event payloads of the streaming endpoint.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Progress(ProgressEvent),
    Result(Box<ScrapeResponse>),
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Progress(_) => "progress",
            StreamEvent::Result(_) => "result",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            StreamEvent::Progress(p) => serde_json::to_string(p),
            StreamEvent::Result(r) => serde_json::to_string(r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn progress_event_shapes() {
        let e = ProgressEvent::new(SourceId::INDEED, &SourceStatus::Fetching(Tier::FeedFetch), None);
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({"source": "indeed", "status": "fetching", "tier": "feed"})
        );

        let e = ProgressEvent::new(SourceId::GLASSDOOR, &SourceStatus::Pending, None);
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({"source": "glassdoor", "status": "pending", "tier": null})
        );

        let e = ProgressEvent::new(
            SourceId::GLASSDOOR,
            &SourceStatus::Succeeded(3),
            Some(Tier::RenderedFetch),
        );
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({"source": "glassdoor", "status": "succeeded", "tier": "rendered", "count": 3})
        );

        let e = ProgressEvent::new(SourceId::SKILL_INDIA, &SourceStatus::TimedOut, None);
        assert_eq!(e.status, "timed_out");
    }

    #[test]
    fn failed_carries_reason() {
        let e = ProgressEvent::new(
            SourceId::INDEED,
            &SourceStatus::FailedAllTiers("blocked: HTTP 403".into()),
            Some(Tier::FeedFetch),
        );
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["status"], "failed");
        assert_eq!(v["reason"], "blocked: HTTP 403");
    }

    #[test]
    fn scores_round_to_one_decimal() {
        assert_eq!(round1(33.333_332), 33.3);
        assert_eq!(round1(100.0), 100.0);
    }
}
