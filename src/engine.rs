//! # Scrape Engine
//! One request in, one finished session out: validate, normalize the query,
//! fan out over the sources, then dedup, rank and truncate.
//!
//! The engine never fabricates postings. A session in which every source
//! came back empty finishes as `AllSourcesFailed`; what to show the user in
//! that case is the HTTP layer's call.

use chrono::Utc;
use metrics::{counter, histogram};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;
use uuid::Uuid;

use crate::config::{RefinerConfig, ScrapeConfig};
use crate::controller::{SourceJob, TierPolicy};
use crate::dedup::{deduplicate, CanonicalPosting};
use crate::metrics::ensure_metrics_described;
use crate::orchestrator::Orchestrator;
use crate::protocol::{OpportunityOut, ProgressEvent, QueryOptimization, ScrapeResponse};
use crate::query::{NormalizedQuery, QueryNormalizer};
use crate::refine::build_refiner;
use crate::relevance::{anon_hash, RelevanceScorer};
use crate::session::{Query, Session, SessionError, TerminalState};
use crate::sources::http::HttpFetcher;
use crate::sources::render::build_renderer;
use crate::sources::types::SourceId;
use crate::sources::{Fetchers, SourceRegistry};

pub const DEFAULT_MAX_RESULTS: usize = 20;

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

/// Request body of the scrape endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScrapeRequest {
    pub query: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl ScrapeRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            location: None,
            max_results: DEFAULT_MAX_RESULTS,
            sources: Vec::new(),
            skills: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("max_results must be greater than zero")]
    ZeroMaxResults,
    #[error("unknown source: {0}")]
    UnknownSource(String),
    #[error("no sources are registered")]
    NoSources,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// The finished session, ready to be rendered.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub terminal: TerminalState,
    pub results: Vec<CanonicalPosting>,
    pub statuses: BTreeMap<SourceId, ProgressEvent>,
    pub sources: Vec<SourceId>,
    pub query: NormalizedQuery,
    pub elapsed_ms: u64,
}

impl SessionOutcome {
    pub fn exhausted(&self) -> bool {
        self.terminal == TerminalState::AllSourcesFailed
    }

    pub fn response(&self) -> ScrapeResponse {
        let opportunities: Vec<OpportunityOut> =
            self.results.iter().map(OpportunityOut::from).collect();
        ScrapeResponse {
            success: true,
            session_id: self.session_id.to_string(),
            terminal_state: self.terminal,
            total_results: opportunities.len(),
            has_fallback: self.exhausted(),
            opportunities,
            scraped_sources: self.sources.clone(),
            source_statuses: self.statuses.clone(),
            query_optimization: QueryOptimization::from(&self.query),
            elapsed_ms: self.elapsed_ms,
        }
    }
}

pub struct ScrapeEngine {
    registry: SourceRegistry,
    normalizer: QueryNormalizer,
    scorer: RelevanceScorer,
    config: Arc<ScrapeConfig>,
    renderer: &'static str,
}

impl ScrapeEngine {
    pub fn new(registry: SourceRegistry, normalizer: QueryNormalizer, config: Arc<ScrapeConfig>) -> Self {
        ensure_metrics_described();
        Self {
            registry,
            normalizer,
            scorer: RelevanceScorer::default(),
            config,
            renderer: "none",
        }
    }

    /// Production wiring: shared HTTP client, renderer, built-in boards, refiner.
    pub fn from_configs(scrape: ScrapeConfig, refiner: &RefinerConfig) -> anyhow::Result<Self> {
        let http = Arc::new(HttpFetcher::new(&scrape.user_agent)?);
        let renderer = build_renderer(&scrape);
        let renderer_name = renderer.name();
        let registry = SourceRegistry::with_builtin(&Fetchers { http, renderer });
        let normalizer = QueryNormalizer::new(
            build_refiner(refiner),
            refiner.timeout(),
            scrape.max_terms_per_source,
        );
        info!(
            sources = ?registry.ids(),
            renderer = renderer_name,
            refiner = normalizer.provider_name(),
            deadline_ms = scrape.deadline_ms,
            "scrape engine ready"
        );
        Ok(Self::new(registry, normalizer, Arc::new(scrape)).with_renderer_name(renderer_name))
    }

    pub fn with_renderer_name(mut self, name: &'static str) -> Self {
        self.renderer = name;
        self
    }

    pub fn with_scorer(mut self, scorer: RelevanceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    pub fn renderer_name(&self) -> &'static str {
        self.renderer
    }

    /// Checks the request and resolves its source names, in registry order.
    pub fn validate(&self, req: &ScrapeRequest) -> Result<Vec<SourceId>, EngineError> {
        if req.query.trim().is_empty() {
            return Err(EngineError::EmptyQuery);
        }
        if req.max_results == 0 {
            return Err(EngineError::ZeroMaxResults);
        }
        if self.registry.is_empty() {
            return Err(EngineError::NoSources);
        }
        let mut requested = BTreeSet::new();
        for name in req.sources.iter().filter(|n| !n.trim().is_empty()) {
            let id = self
                .registry
                .resolve(name)
                .ok_or_else(|| EngineError::UnknownSource(name.clone()))?;
            requested.insert(id);
        }
        Ok(self
            .registry
            .select(&requested)
            .iter()
            .map(|a| a.id())
            .collect())
    }

    /// Runs one session to completion. Progress events, when asked for, are
    /// sent as they happen; the sender is dropped when this returns.
    pub async fn run(
        &self,
        req: &ScrapeRequest,
        progress: Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<SessionOutcome, EngineError> {
        let ids = self.validate(req)?;
        let nq = self
            .normalizer
            .normalize(&req.query, req.location.as_deref(), &req.skills, &ids)
            .await;

        let query = Query {
            terms: nq.all_terms(),
            location: nq.location.clone(),
            max_results: req.max_results,
            sources: ids.iter().copied().collect(),
        };
        let mut session = Session::new(query, &ids, self.config.deadline());
        info!(
            target: "scrape",
            session = %session.id(),
            query_id = %anon_hash(&req.query),
            terms = session.query().terms.len(),
            sources = ids.len(),
            deadline_ms = self.config.deadline_ms,
            "session started"
        );

        let limit = self.config.per_source_limit(req.max_results, ids.len());
        let jobs: Vec<SourceJob> = ids
            .iter()
            .filter_map(|id| self.registry.get(*id))
            .map(|adapter| SourceJob {
                terms: nq
                    .per_source
                    .get(&adapter.id())
                    .cloned()
                    .unwrap_or_else(|| nq.all_terms()),
                location: nq.location.clone(),
                limit,
                adapter,
            })
            .collect();

        let orchestrator = Orchestrator::new(
            TierPolicy::from_config(&self.config),
            self.config.workers_for(ids.len()),
        );
        let fan = orchestrator.run(&mut session, jobs, progress.as_ref()).await;

        counter!("scrape_postings_raw_total").increment(fan.postings.len() as u64);
        let deduped = deduplicate(fan.postings);
        counter!("scrape_postings_deduped_total").increment(deduped.len() as u64);

        let mut ranked = self.scorer.rank(deduped, &nq.scoring_terms(), Utc::now());
        ranked.truncate(req.max_results);

        let terminal = session.outcome(fan.deadline_elapsed);
        session.set_results(ranked)?;
        session.finish(terminal)?;

        let elapsed_ms = session.elapsed().as_millis() as u64;
        counter!("scrape_sessions_total", "terminal" => terminal.label()).increment(1);
        histogram!("scrape_session_ms").record(elapsed_ms as f64);

        let statuses = session
            .statuses()
            .iter()
            .map(|(id, st)| (*id, ProgressEvent::new(*id, st, fan.last_tier.get(id).copied())))
            .collect();
        info!(
            target: "scrape",
            session = %session.id(),
            terminal = terminal.label(),
            results = session.results().len(),
            elapsed_ms,
            "session finished"
        );

        Ok(SessionOutcome {
            session_id: session.id(),
            terminal,
            statuses,
            sources: ids,
            query: nq,
            elapsed_ms,
            results: session.into_results(),
        })
    }
}
