// src/config/scrape.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, time::Duration};

use crate::sources::types::Tier;

pub const ENV_SCRAPE_CONFIG_PATH: &str = "SCOUT_CONFIG_PATH";
pub const DEFAULT_SCRAPE_CONFIG_PATH: &str = "config/scrape.toml";
pub const ENV_DEADLINE_MS: &str = "SCOUT_DEADLINE_MS";

pub const DEFAULT_DEADLINE_MS: u64 = 25_000;
pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Time budget of one tier attempt. `floor_ms` is the least remaining session
/// time for which starting the tier is still worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBudget {
    pub timeout_ms: u64,
    pub floor_ms: u64,
}

impl TierBudget {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
    pub fn floor(&self) -> Duration {
        Duration::from_millis(self.floor_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierBudgets {
    #[serde(rename = "static")]
    pub static_fetch: TierBudget,
    #[serde(rename = "rendered")]
    pub rendered_fetch: TierBudget,
    #[serde(rename = "feed")]
    pub feed_fetch: TierBudget,
}

impl Default for TierBudgets {
    fn default() -> Self {
        Self {
            static_fetch: TierBudget { timeout_ms: 8_000, floor_ms: 300 },
            rendered_fetch: TierBudget { timeout_ms: 15_000, floor_ms: 2_000 },
            feed_fetch: TierBudget { timeout_ms: 6_000, floor_ms: 200 },
        }
    }
}

impl TierBudgets {
    pub fn get(&self, tier: Tier) -> TierBudget {
        match tier {
            Tier::StaticFetch => self.static_fetch,
            Tier::RenderedFetch => self.rendered_fetch,
            Tier::FeedFetch => self.feed_fetch,
        }
    }

    pub fn get_mut(&mut self, tier: Tier) -> &mut TierBudget {
        match tier {
            Tier::StaticFetch => &mut self.static_fetch,
            Tier::RenderedFetch => &mut self.rendered_fetch,
            Tier::FeedFetch => &mut self.feed_fetch,
        }
    }
}

/// Session budgets and fetch settings. Built once, then shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub deadline_ms: u64,
    /// Fixed pool size; `None` sizes the pool to the requested sources.
    pub worker_pool_size: Option<usize>,
    pub max_workers: usize,
    pub min_results_per_tier: usize,
    pub max_tiers_per_source: usize,
    pub tiers: TierBudgets,
    pub max_terms_per_source: usize,
    pub per_source_limit_floor: usize,
    pub user_agent: String,
    pub webdriver_url: Option<String>,
    /// Substitute sample postings at the HTTP boundary when every source fails.
    pub fallback_samples: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_DEADLINE_MS,
            worker_pool_size: None,
            max_workers: DEFAULT_MAX_WORKERS,
            min_results_per_tier: 1,
            max_tiers_per_source: Tier::ALL.len(),
            tiers: TierBudgets::default(),
            max_terms_per_source: 3,
            per_source_limit_floor: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            webdriver_url: None,
            fallback_samples: false,
        }
    }
}

impl ScrapeConfig {
    /// Load from `$SCOUT_CONFIG_PATH` or `config/scrape.toml`. A missing file
    /// yields defaults; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_SCRAPE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SCRAPE_CONFIG_PATH));

        let mut cfg = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                anyhow::anyhow!("Failed to read scrape config at {}: {}", path.display(), e)
            })?;
            Self::from_toml_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid scrape config {}: {}", path.display(), e))?
        } else {
            tracing::info!(path = %path.display(), "no scrape config file, using defaults");
            Self::default().sanitized()
        };

        if let Some(ms) = parse_positive_ms(env::var(ENV_DEADLINE_MS).ok()) {
            cfg.deadline_ms = ms;
        }
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: ScrapeConfig = toml::from_str(s)?;
        Ok(cfg.sanitized())
    }

    /// Replace unusable values with defaults and keep floors within timeouts.
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        if self.deadline_ms == 0 {
            self.deadline_ms = d.deadline_ms;
        }
        if self.max_workers == 0 {
            self.max_workers = d.max_workers;
        }
        if self.worker_pool_size == Some(0) {
            self.worker_pool_size = None;
        }
        self.max_tiers_per_source = self.max_tiers_per_source.clamp(1, Tier::ALL.len());
        if self.max_terms_per_source == 0 {
            self.max_terms_per_source = 1;
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = d.user_agent;
        }
        for tier in Tier::ALL {
            let fallback = d.tiers.get(tier);
            let b = self.tiers.get_mut(tier);
            if b.timeout_ms == 0 {
                b.timeout_ms = fallback.timeout_ms;
            }
            if b.floor_ms > b.timeout_ms {
                b.floor_ms = b.timeout_ms;
            }
        }
        self
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn budget(&self, tier: Tier) -> TierBudget {
        self.tiers.get(tier)
    }

    /// Worker pool size for a session over `sources` sources (at least 1).
    pub fn workers_for(&self, sources: usize) -> usize {
        self.worker_pool_size
            .unwrap_or_else(|| sources.min(self.max_workers))
            .max(1)
    }

    /// Limit handed to each adapter call.
    pub fn per_source_limit(&self, max_results: usize, sources: usize) -> usize {
        let share = max_results.div_ceil(sources.max(1));
        share.max(self.per_source_limit_floor).max(1)
    }
}

fn parse_positive_ms(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok()).filter(|ms| *ms > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let c = ScrapeConfig::default();
        assert_eq!(c.deadline(), Duration::from_secs(25));
        assert_eq!(c.budget(Tier::RenderedFetch).timeout_ms, 15_000);
        assert_eq!(c.budget(Tier::FeedFetch).floor_ms, 200);
        assert_eq!(c.min_results_per_tier, 1);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let c = ScrapeConfig::from_toml_str(
            r#"
            deadline_ms = 5000
            [tiers.rendered]
            timeout_ms = 4000
            floor_ms = 9000
            "#,
        )
        .unwrap();
        assert_eq!(c.deadline_ms, 5000);
        assert_eq!(c.budget(Tier::RenderedFetch).timeout_ms, 4000);
        assert_eq!(c.budget(Tier::RenderedFetch).floor_ms, 4000, "floor clamped");
        assert_eq!(c.budget(Tier::StaticFetch).timeout_ms, 8000);
        assert_eq!(c.max_workers, DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn zero_values_are_sanitized() {
        let c = ScrapeConfig::from_toml_str(
            "deadline_ms = 0\nmax_workers = 0\nworker_pool_size = 0\nmax_tiers_per_source = 9",
        )
        .unwrap();
        assert_eq!(c.deadline_ms, DEFAULT_DEADLINE_MS);
        assert_eq!(c.max_workers, DEFAULT_MAX_WORKERS);
        assert_eq!(c.worker_pool_size, None);
        assert_eq!(c.max_tiers_per_source, 3);
    }

    #[test]
    fn malformed_toml_is_error() {
        assert!(ScrapeConfig::from_toml_str("deadline_ms = \"soon\"").is_err());
    }

    #[test]
    fn pool_and_limits() {
        let c = ScrapeConfig::default();
        assert_eq!(c.workers_for(2), 2);
        assert_eq!(c.workers_for(9), 4);
        assert_eq!(c.workers_for(0), 1);
        assert_eq!(c.per_source_limit(20, 4), 10);
        assert_eq!(c.per_source_limit(50, 2), 25);
        let fixed = ScrapeConfig {
            worker_pool_size: Some(1),
            ..ScrapeConfig::default()
        };
        assert_eq!(fixed.workers_for(4), 1);
    }

    #[test]
    fn deadline_env_parsing() {
        assert_eq!(parse_positive_ms(Some(" 1500 ".into())), Some(1500));
        assert_eq!(parse_positive_ms(Some("0".into())), None);
        assert_eq!(parse_positive_ms(Some("x".into())), None);
        assert_eq!(parse_positive_ms(None), None);
    }
}
