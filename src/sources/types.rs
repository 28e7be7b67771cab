// src/sources/types.rs
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Identifies one job board. Adapters own their id; the registry maps request
/// names onto ids, so adding a board never touches the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(&'static str);

impl SourceId {
    pub const INDEED: SourceId = SourceId("indeed");
    pub const GLASSDOOR: SourceId = SourceId("glassdoor");
    pub const INTERNSHIPS_COM: SourceId = SourceId("internships_com");
    pub const SKILL_INDIA: SourceId = SourceId("skill_india");

    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for SourceId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.0)
    }
}

/// Fetch strategies in strictly increasing cost/robustness order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Tier {
    #[serde(rename = "static")]
    StaticFetch,
    #[serde(rename = "rendered")]
    RenderedFetch,
    #[serde(rename = "feed")]
    FeedFetch,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::StaticFetch, Tier::RenderedFetch, Tier::FeedFetch];

    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::StaticFetch => Some(Tier::RenderedFetch),
            Tier::RenderedFetch => Some(Tier::FeedFetch),
            Tier::FeedFetch => None,
        }
    }

    /// 0-based position, used to index per-tier config arrays.
    pub fn index(self) -> usize {
        match self {
            Tier::StaticFetch => 0,
            Tier::RenderedFetch => 1,
            Tier::FeedFetch => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::StaticFetch => "static",
            Tier::RenderedFetch => "rendered",
            Tier::FeedFetch => "feed",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One posting as produced by an adapter. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawPosting {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
    pub source: SourceId,
    pub fetched_at: DateTime<Utc>,
    pub tier_used: Tier,
}

/// Why a tier attempt did not produce postings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("blocked: {0}")]
    Blocked(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("rate limited")]
    RateLimited,
    #[error("timed out")]
    Timeout,
    #[error("tier {0} not supported by this source")]
    Unsupported(Tier),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl FetchError {
    /// Recoverable errors drive tier escalation; everything else ends the source.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FetchError::Permanent(_))
    }

    /// Short label used for metrics and progress reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::SourceUnavailable(_) => "source_unavailable",
            FetchError::Blocked(_) => "blocked",
            FetchError::ParseError(_) => "parse_error",
            FetchError::RateLimited => "rate_limited",
            FetchError::Timeout => "timeout",
            FetchError::Unsupported(_) => "unsupported",
            FetchError::Permanent(_) => "permanent",
        }
    }
}

/// The uniform capability every job board implements.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    /// Extra request names that select this source (case-insensitive).
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn supports(&self, _tier: Tier) -> bool {
        true
    }

    async fn fetch(
        &self,
        term: &str,
        location: Option<&str>,
        limit: usize,
        tier: Tier,
    ) -> Result<Vec<RawPosting>, FetchError>;
}
