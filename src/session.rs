// src/session.rs
//! One scrape request end to end: query, deadline, per-source status, result.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::dedup::CanonicalPosting;
use crate::sources::types::{SourceId, Tier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Pending,
    Fetching(Tier),
    Succeeded(usize),
    FailedAllTiers(String),
    TimedOut,
}

impl SourceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SourceStatus::Succeeded(_) | SourceStatus::FailedAllTiers(_) | SourceStatus::TimedOut
        )
    }

    /// Pending -> Fetching(t1) -> Fetching(t2 > t1) -> terminal; nothing leaves a terminal state.
    pub fn can_become(&self, next: &SourceStatus) -> bool {
        match (self, next) {
            (SourceStatus::Pending, SourceStatus::Pending) => false,
            (SourceStatus::Pending, _) => true,
            (SourceStatus::Fetching(a), SourceStatus::Fetching(b)) => b > a,
            (SourceStatus::Fetching(_), n) => n.is_terminal(),
            _ => false,
        }
    }

    /// Wire label of the progress protocol.
    pub fn label(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Fetching(_) => "fetching",
            SourceStatus::Succeeded(_) => "succeeded",
            SourceStatus::FailedAllTiers(_) => "failed",
            SourceStatus::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Running,
    Completed,
    PartialTimeout,
    AllSourcesFailed,
}

impl TerminalState {
    pub fn label(self) -> &'static str {
        match self {
            TerminalState::Running => "running",
            TerminalState::Completed => "completed",
            TerminalState::PartialTimeout => "partial_timeout",
            TerminalState::AllSourcesFailed => "all_sources_failed",
        }
    }
}

/// Immutable once the session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub terms: Vec<String>,
    pub location: Option<String>,
    pub max_results: usize,
    /// Empty selects every registered source.
    pub sources: BTreeSet<SourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("source {0} is not part of this session")]
    UnknownSource(SourceId),
    #[error("illegal status transition for {source_id}: {from:?} -> {to:?}")]
    IllegalTransition {
        source_id: SourceId,
        from: SourceStatus,
        to: SourceStatus,
    },
    #[error("session already finished as {0:?}")]
    AlreadyFinished(TerminalState),
    #[error("terminal state cannot be Running")]
    NotTerminal,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    query: Query,
    started: Instant,
    deadline: Instant,
    statuses: BTreeMap<SourceId, SourceStatus>,
    results: Vec<CanonicalPosting>,
    terminal: TerminalState,
}

impl Session {
    pub fn new(query: Query, sources: &[SourceId], budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            id: Uuid::new_v4(),
            query,
            started,
            deadline: started + budget,
            statuses: sources.iter().map(|s| (*s, SourceStatus::Pending)).collect(),
            results: Vec::new(),
            terminal: TerminalState::Running,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn statuses(&self) -> &BTreeMap<SourceId, SourceStatus> {
        &self.statuses
    }

    pub fn status(&self, source: SourceId) -> Option<&SourceStatus> {
        self.statuses.get(&source)
    }

    pub fn results(&self) -> &[CanonicalPosting] {
        &self.results
    }

    pub fn into_results(self) -> Vec<CanonicalPosting> {
        self.results
    }

    pub fn terminal(&self) -> TerminalState {
        self.terminal
    }

    /// Applies a monotonic status change.
    pub fn transition(&mut self, source: SourceId, next: SourceStatus) -> Result<(), SessionError> {
        let current = self
            .statuses
            .get_mut(&source)
            .ok_or(SessionError::UnknownSource(source))?;
        if !current.can_become(&next) {
            return Err(SessionError::IllegalTransition {
                source_id: source,
                from: current.clone(),
                to: next,
            });
        }
        *current = next;
        Ok(())
    }

    /// Sources that have not reached a terminal status yet.
    pub fn unfinished(&self) -> Vec<SourceId> {
        self.statuses
            .iter()
            .filter(|(_, st)| !st.is_terminal())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.statuses.values().all(SourceStatus::is_terminal)
    }

    pub fn set_results(&mut self, results: Vec<CanonicalPosting>) -> Result<(), SessionError> {
        if self.terminal != TerminalState::Running {
            return Err(SessionError::AlreadyFinished(self.terminal));
        }
        self.results = results;
        Ok(())
    }

    /// Terminal state implied by the per-source outcomes.
    pub fn outcome(&self, deadline_elapsed: bool) -> TerminalState {
        let any_postings = self
            .statuses
            .values()
            .any(|s| matches!(s, SourceStatus::Succeeded(n) if *n > 0));
        let any_timed_out = self.statuses.values().any(|s| *s == SourceStatus::TimedOut);
        if !any_postings {
            TerminalState::AllSourcesFailed
        } else if deadline_elapsed || any_timed_out {
            TerminalState::PartialTimeout
        } else {
            TerminalState::Completed
        }
    }

    /// Sets the terminal state; allowed exactly once.
    pub fn finish(&mut self, state: TerminalState) -> Result<(), SessionError> {
        if state == TerminalState::Running {
            return Err(SessionError::NotTerminal);
        }
        if self.terminal != TerminalState::Running {
            return Err(SessionError::AlreadyFinished(self.terminal));
        }
        self.terminal = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query {
            terms: vec!["backend".into()],
            location: None,
            max_results: 10,
            sources: BTreeSet::new(),
        }
    }

    #[test]
    fn statuses_only_move_forward() {
        use SourceStatus::*;
        assert!(Pending.can_become(&Fetching(Tier::StaticFetch)));
        assert!(Pending.can_become(&TimedOut));
        assert!(Fetching(Tier::StaticFetch).can_become(&Fetching(Tier::FeedFetch)));
        assert!(!Fetching(Tier::RenderedFetch).can_become(&Fetching(Tier::StaticFetch)));
        assert!(!Fetching(Tier::RenderedFetch).can_become(&Pending));
        assert!(!Succeeded(3).can_become(&TimedOut));
        assert!(!TimedOut.can_become(&Succeeded(1)));
    }

    #[test]
    fn session_rejects_regression_and_unknown_sources() {
        let mut s = Session::new(query(), &[SourceId::INDEED], Duration::from_secs(5));
        s.transition(SourceId::INDEED, SourceStatus::Fetching(Tier::RenderedFetch)).unwrap();
        let err = s
            .transition(SourceId::INDEED, SourceStatus::Fetching(Tier::StaticFetch))
            .unwrap_err();
        assert!(matches!(err, SessionError::IllegalTransition { .. }));
        assert_eq!(
            s.transition(SourceId::GLASSDOOR, SourceStatus::TimedOut),
            Err(SessionError::UnknownSource(SourceId::GLASSDOOR))
        );
        assert_eq!(
            s.status(SourceId::INDEED),
            Some(&SourceStatus::Fetching(Tier::RenderedFetch))
        );
    }

    #[test]
    fn terminal_state_is_set_once() {
        let mut s = Session::new(query(), &[SourceId::INDEED], Duration::from_secs(5));
        assert_eq!(s.terminal(), TerminalState::Running);
        assert_eq!(s.finish(TerminalState::Running), Err(SessionError::NotTerminal));
        s.finish(TerminalState::Completed).unwrap();
        assert_eq!(
            s.finish(TerminalState::PartialTimeout),
            Err(SessionError::AlreadyFinished(TerminalState::Completed))
        );
        assert_eq!(s.terminal(), TerminalState::Completed);
        assert!(s.set_results(Vec::new()).is_err());
    }

    #[test]
    fn outcome_reflects_source_results() {
        let ids = [SourceId::INDEED, SourceId::GLASSDOOR];
        let mut s = Session::new(query(), &ids, Duration::from_secs(5));
        s.transition(ids[0], SourceStatus::FailedAllTiers("blocked".into())).unwrap();
        s.transition(ids[1], SourceStatus::TimedOut).unwrap();
        assert_eq!(s.outcome(false), TerminalState::AllSourcesFailed);

        let mut s = Session::new(query(), &ids, Duration::from_secs(5));
        s.transition(ids[0], SourceStatus::Succeeded(2)).unwrap();
        s.transition(ids[1], SourceStatus::TimedOut).unwrap();
        assert_eq!(s.outcome(false), TerminalState::PartialTimeout);

        let mut s = Session::new(query(), &ids, Duration::from_secs(5));
        s.transition(ids[0], SourceStatus::Succeeded(2)).unwrap();
        s.transition(ids[1], SourceStatus::FailedAllTiers("parse".into())).unwrap();
        assert_eq!(s.outcome(false), TerminalState::Completed);
        assert!(s.all_terminal());
    }
}
