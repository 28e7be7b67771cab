// src/orchestrator.rs
//! Fans a session out over a bounded worker pool and folds worker messages back
//! into the session. The session is only ever mutated here, on one task.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::{ControllerReport, SourceJob, TierController, TierPolicy, WorkerMsg};
use crate::protocol::ProgressEvent;
use crate::session::{Session, SourceStatus};
use crate::sources::types::{RawPosting, SourceId, Tier};

/// What the fan-out produced, before dedup and ranking.
#[derive(Debug, Default)]
pub struct FanOut {
    pub postings: Vec<RawPosting>,
    pub deadline_elapsed: bool,
    pub reports: Vec<ControllerReport>,
    /// Last tier each source was in, for progress payloads.
    pub last_tier: BTreeMap<SourceId, Tier>,
}

pub struct Orchestrator {
    policy: TierPolicy,
    workers: usize,
}

impl Orchestrator {
    pub fn new(policy: TierPolicy, workers: usize) -> Self {
        Self {
            policy,
            workers: workers.max(1),
        }
    }

    /// Runs every job until all sources are terminal or the session deadline
    /// passes, whichever comes first. Never waits past the deadline.
    pub async fn run(
        &self,
        session: &mut Session,
        jobs: Vec<SourceJob>,
        progress: Option<&UnboundedSender<ProgressEvent>>,
    ) -> FanOut {
        let mut out = FanOut::default();
        for (id, st) in session.statuses() {
            emit(progress, ProgressEvent::new(*id, st, None));
        }
        if session.all_terminal() {
            return out;
        }

        let deadline = session.deadline();
        let cancel = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let (tx, mut rx) = unbounded_channel::<WorkerMsg>();
        let mut set = JoinSet::new();

        for job in jobs {
            let tx = tx.clone();
            let cancel = cancel.clone();
            let sem = semaphore.clone();
            let controller = TierController::new(self.policy);
            set.spawn(async move {
                let source = job.adapter.id();
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    p = sem.acquire_owned() => p.ok(),
                };
                let report = match permit {
                    Some(_permit) => controller.run(job, deadline, cancel, &tx).await,
                    None => ControllerReport {
                        source,
                        status: SourceStatus::TimedOut,
                        postings: Vec::new(),
                        attempts: Vec::new(),
                    },
                };
                let _ = tx.send(WorkerMsg::Finished(report));
            });
        }
        drop(tx);

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Some(WorkerMsg::Status(id, st)) => {
                        if let SourceStatus::Fetching(t) = st {
                            out.last_tier.insert(id, t);
                        }
                        apply(session, id, st, &out.last_tier, progress);
                    }
                    Some(WorkerMsg::Finished(mut report)) => {
                        let id = report.source;
                        if let Some(p) = report.postings.first() {
                            out.last_tier.insert(id, p.tier_used);
                        }
                        if apply(session, id, report.status.clone(), &out.last_tier, progress)
                            && matches!(report.status, SourceStatus::Succeeded(_))
                        {
                            out.postings.append(&mut report.postings);
                        }
                        out.reports.push(report);
                        if session.all_terminal() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut sleep => {
                    out.deadline_elapsed = true;
                    break;
                }
            }
        }

        cancel.cancel();
        let late = session.unfinished();
        if !late.is_empty() {
            warn!(target: "scrape", session = %session.id(), sources = ?late, "deadline reached, abandoning sources");
        }
        for id in late {
            apply(session, id, SourceStatus::TimedOut, &out.last_tier, progress);
        }
        // Cancelled workers wind down on their own; their messages go nowhere.
        set.detach_all();

        info!(
            target: "scrape",
            session = %session.id(),
            raw = out.postings.len(),
            deadline_elapsed = out.deadline_elapsed,
            "fan-out finished"
        );
        out
    }
}

/// Applies one transition and reports it; late or stale updates are dropped.
fn apply(
    session: &mut Session,
    id: SourceId,
    status: SourceStatus,
    last_tier: &BTreeMap<SourceId, Tier>,
    progress: Option<&UnboundedSender<ProgressEvent>>,
) -> bool {
    let event = ProgressEvent::new(id, &status, last_tier.get(&id).copied());
    match session.transition(id, status) {
        Ok(()) => {
            emit(progress, event);
            true
        }
        Err(e) => {
            debug!(target: "scrape", error = %e, "dropping status update");
            false
        }
    }
}

fn emit(progress: Option<&UnboundedSender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = progress {
        // A gone listener does not stop the session.
        let _ = tx.send(event);
    }
}
