// tests/common/mod.rs
//
// Scripted job boards and engine builders shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use internship_scout::config::ScrapeConfig;
use internship_scout::query::QueryNormalizer;
use internship_scout::refine::DisabledRefiner;
use internship_scout::sources::types::{FetchError, RawPosting, SourceAdapter, SourceId, Tier};
use internship_scout::sources::SourceRegistry;
use internship_scout::ScrapeEngine;

pub const BOARD_X: SourceId = SourceId::new("board_x");
pub const BOARD_Y: SourceId = SourceId::new("board_y");

/// What one tier of a scripted board does.
#[derive(Clone)]
pub enum Reply {
    /// `(title, company, description)` triples, all in "Remote".
    Postings(Vec<(&'static str, &'static str, &'static str)>),
    Fail(FetchError),
    /// Sleeps, then answers.
    Slow(Duration, Box<Reply>),
    /// Never answers.
    Hang,
}

pub fn postings(titles: &[&'static str]) -> Reply {
    Reply::Postings(titles.iter().map(|t| (*t, "Acme", "")).collect())
}

pub struct ScriptedBoard {
    id: SourceId,
    script: BTreeMap<Tier, Reply>,
    calls: [AtomicUsize; 3],
}

impl ScriptedBoard {
    pub fn new(id: SourceId) -> Self {
        Self {
            id,
            script: BTreeMap::new(),
            calls: Default::default(),
        }
    }

    pub fn on(mut self, tier: Tier, reply: Reply) -> Self {
        self.script.insert(tier, reply);
        self
    }

    pub fn calls(&self, tier: Tier) -> usize {
        self.calls[tier.index()].load(Ordering::SeqCst)
    }

    fn answer(&self, reply: &Reply, tier: Tier) -> Result<Vec<RawPosting>, FetchError> {
        match reply {
            Reply::Postings(items) => Ok(items
                .iter()
                .map(|(title, company, description)| RawPosting {
                    title: title.to_string(),
                    company: company.to_string(),
                    location: "Remote".into(),
                    description: description.to_string(),
                    url: format!("https://{}.test/{}", self.id, title.replace(' ', "-")),
                    source: self.id,
                    fetched_at: Utc::now(),
                    tier_used: tier,
                })
                .collect()),
            Reply::Fail(e) => Err(e.clone()),
            Reply::Slow(..) | Reply::Hang => unreachable!("resolved before answering"),
        }
    }
}

#[async_trait]
impl SourceAdapter for ScriptedBoard {
    fn id(&self) -> SourceId {
        self.id
    }

    fn supports(&self, tier: Tier) -> bool {
        self.script.contains_key(&tier)
    }

    async fn fetch(
        &self,
        _term: &str,
        _location: Option<&str>,
        _limit: usize,
        tier: Tier,
    ) -> Result<Vec<RawPosting>, FetchError> {
        self.calls[tier.index()].fetch_add(1, Ordering::SeqCst);
        let mut reply = self
            .script
            .get(&tier)
            .cloned()
            .unwrap_or(Reply::Fail(FetchError::Unsupported(tier)));
        loop {
            match reply {
                Reply::Slow(d, next) => {
                    tokio::time::sleep(d).await;
                    reply = *next;
                }
                Reply::Hang => std::future::pending::<()>().await,
                other => return self.answer(&other, tier),
            }
        }
    }
}

/// Small real budgets, zero floors, one search term per source.
pub fn fast_config(deadline_ms: u64) -> ScrapeConfig {
    let mut cfg = ScrapeConfig {
        deadline_ms,
        max_terms_per_source: 1,
        ..ScrapeConfig::default()
    };
    for t in Tier::ALL {
        let b = cfg.tiers.get_mut(t);
        b.timeout_ms = deadline_ms;
        b.floor_ms = 0;
    }
    cfg
}

pub fn engine_with(boards: Vec<Arc<ScriptedBoard>>, cfg: ScrapeConfig) -> ScrapeEngine {
    let mut reg = SourceRegistry::new();
    for b in boards {
        reg.register(b);
    }
    let normalizer = QueryNormalizer::new(
        Arc::new(DisabledRefiner),
        Duration::from_millis(100),
        cfg.max_terms_per_source,
    );
    ScrapeEngine::new(reg, normalizer, Arc::new(cfg))
}
