// src/controller.rs
//! Per-source tier state machine: start cheap, escalate only on failure or too
//! few results, never revisit a tier, never start a tier that cannot finish.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::scrape::{ScrapeConfig, TierBudget};
use crate::session::SourceStatus;
use crate::sources::types::{FetchError, RawPosting, SourceAdapter, SourceId, Tier};

/// Escalation parameters, copied out of the session config.
#[derive(Debug, Clone, Copy)]
pub struct TierPolicy {
    pub min_results: usize,
    pub max_tiers: usize,
    budgets: [TierBudget; 3],
}

impl TierPolicy {
    pub fn from_config(cfg: &ScrapeConfig) -> Self {
        Self {
            min_results: cfg.min_results_per_tier,
            max_tiers: cfg.max_tiers_per_source,
            budgets: Tier::ALL.map(|t| cfg.budget(t)),
        }
    }

    pub fn budget(&self, tier: Tier) -> TierBudget {
        self.budgets[tier.index()]
    }
}

/// What the controller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Attempt(Tier),
    /// No tier left to try (or the tier budget is spent).
    Finish,
    /// The next tier's floor does not fit in the remaining session time.
    OutOfTime,
}

/// Picks the next supported tier strictly above `after`.
pub fn plan_next(
    policy: &TierPolicy,
    after: Option<Tier>,
    attempted: usize,
    remaining: Duration,
    supports: impl Fn(Tier) -> bool,
) -> Step {
    if attempted >= policy.max_tiers {
        return Step::Finish;
    }
    let next = Tier::ALL
        .into_iter()
        .filter(|t| after.map_or(true, |a| *t > a))
        .find(|t| supports(*t));
    match next {
        None => Step::Finish,
        Some(t) if remaining < policy.budget(t).floor() || remaining.is_zero() => Step::OutOfTime,
        Some(t) => Step::Attempt(t),
    }
}

/// Whether an attempt result is good enough to stop escalating.
pub fn satisfied(policy: &TierPolicy, result: &Result<Vec<RawPosting>, FetchError>) -> bool {
    matches!(result, Ok(p) if p.len() >= policy.min_results && !p.is_empty())
}

/// Messages a worker sends to the orchestrator. Workers never touch the session.
#[derive(Debug)]
pub enum WorkerMsg {
    Status(SourceId, SourceStatus),
    Finished(ControllerReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub tier: Tier,
    pub outcome: &'static str,
    pub count: usize,
    pub elapsed_ms: u64,
}

/// Final word of one source.
#[derive(Debug, Clone)]
pub struct ControllerReport {
    pub source: SourceId,
    pub status: SourceStatus,
    pub postings: Vec<RawPosting>,
    pub attempts: Vec<AttemptRecord>,
}

/// Everything a worker needs to run one source.
#[derive(Clone)]
pub struct SourceJob {
    pub adapter: Arc<dyn SourceAdapter>,
    pub terms: Vec<String>,
    pub location: Option<String>,
    pub limit: usize,
}

pub struct TierController {
    policy: TierPolicy,
}

impl TierController {
    pub fn new(policy: TierPolicy) -> Self {
        Self { policy }
    }

    /// Runs one source to a terminal status. Sends `Fetching` updates as it
    /// escalates; the final status travels in the returned report.
    pub async fn run(
        &self,
        job: SourceJob,
        deadline: Instant,
        cancel: CancellationToken,
        tx: &UnboundedSender<WorkerMsg>,
    ) -> ControllerReport {
        let SourceJob {
            adapter,
            terms,
            location,
            limit,
        } = job;
        let location = location.as_deref();
        let source = adapter.id();
        let mut after: Option<Tier> = None;
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut best: Vec<RawPosting> = Vec::new();
        let mut last_err: Option<FetchError> = None;
        let mut permanent = false;
        let mut out_of_time = false;

        loop {
            if cancel.is_cancelled() {
                out_of_time = true;
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let tier = match plan_next(&self.policy, after, attempts.len(), remaining, |t| {
                adapter.supports(t)
            }) {
                Step::Attempt(t) => t,
                Step::Finish => break,
                Step::OutOfTime => {
                    out_of_time = true;
                    break;
                }
            };
            after = Some(tier);
            let _ = tx.send(WorkerMsg::Status(source, SourceStatus::Fetching(tier)));

            let budget = self.policy.budget(tier).timeout().min(remaining);
            let t0 = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = tokio::time::timeout(budget, attempt(adapter.as_ref(), tier, &terms, location, limit)) => {
                    Some(r.unwrap_or(Err(FetchError::Timeout)))
                }
            };
            let elapsed_ms = t0.elapsed().as_millis() as u64;

            let Some(result) = result else {
                // Deadline hit mid-attempt; whatever was in flight is dropped whole.
                record(source, tier, "cancelled", 0, elapsed_ms, &mut attempts);
                out_of_time = true;
                break;
            };

            let done = satisfied(&self.policy, &result);
            match result {
                Ok(postings) => {
                    record(source, tier, "ok", postings.len(), elapsed_ms, &mut attempts);
                    last_err = None;
                    if !postings.is_empty() {
                        best = postings;
                    }
                    if done {
                        break;
                    }
                }
                Err(e) => {
                    record(source, tier, e.kind(), 0, elapsed_ms, &mut attempts);
                    if e.is_recoverable() {
                        warn!(target: "scrape", source = %source, %tier, error = %e, "tier failed, escalating");
                        last_err = Some(e);
                    } else {
                        warn!(target: "scrape", source = %source, %tier, error = %e, "permanent failure");
                        last_err = Some(e);
                        permanent = true;
                        break;
                    }
                }
            }
        }

        let status = final_status(&best, last_err.as_ref(), permanent, out_of_time, attempts.len());
        ControllerReport {
            source,
            status,
            postings: best,
            attempts,
        }
    }
}

/// Runs every term at `tier` in order until `limit` postings are collected.
/// Fails only if every term failed; a permanent error stops immediately.
async fn attempt(
    adapter: &dyn SourceAdapter,
    tier: Tier,
    terms: &[String],
    location: Option<&str>,
    limit: usize,
) -> Result<Vec<RawPosting>, FetchError> {
    let mut out: Vec<RawPosting> = Vec::new();
    let mut any_ok = false;
    let mut last_err = None;
    for term in terms {
        if out.len() >= limit {
            break;
        }
        match adapter.fetch(term, location, limit - out.len(), tier).await {
            Ok(p) => {
                any_ok = true;
                out.extend(p);
            }
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => last_err = Some(e),
        }
    }
    if any_ok {
        out.truncate(limit);
        Ok(out)
    } else {
        Err(last_err.unwrap_or_else(|| FetchError::ParseError("no search terms".into())))
    }
}

fn final_status(
    best: &[RawPosting],
    last_err: Option<&FetchError>,
    permanent: bool,
    out_of_time: bool,
    attempted: usize,
) -> SourceStatus {
    if !best.is_empty() {
        return SourceStatus::Succeeded(best.len());
    }
    if permanent {
        let reason = last_err.map(|e| e.to_string()).unwrap_or_default();
        return SourceStatus::FailedAllTiers(reason);
    }
    if out_of_time || matches!(last_err, Some(FetchError::Timeout)) {
        return SourceStatus::TimedOut;
    }
    let reason = match (last_err, attempted) {
        (Some(e), _) => e.to_string(),
        (None, 0) => "no supported tier".to_string(),
        (None, _) => "no results".to_string(),
    };
    SourceStatus::FailedAllTiers(reason)
}

fn record(
    source: SourceId,
    tier: Tier,
    outcome: &'static str,
    count: usize,
    elapsed_ms: u64,
    attempts: &mut Vec<AttemptRecord>,
) {
    counter!(
        "scrape_tier_attempts_total",
        "source" => source.as_str(),
        "tier" => tier.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("scrape_tier_ms", "tier" => tier.as_str()).record(elapsed_ms as f64);
    info!(target: "scrape", source = %source, %tier, outcome, count, elapsed_ms, "tier attempt");
    attempts.push(AttemptRecord {
        tier,
        outcome,
        count,
        elapsed_ms,
    });
}
