// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod controller;
pub mod dedup;
pub mod engine;
pub mod fallback;
pub mod metrics;
pub mod orchestrator;
pub mod protocol;
pub mod query;
pub mod refine;
pub mod relevance;
pub mod session;
pub mod sources;
pub mod telemetry;

pub use crate::api::{router, AppState};
pub use crate::engine::{ScrapeEngine, ScrapeRequest};

use axum::Router;
use tracing::info;

use crate::config::{RefinerConfig, ScrapeConfig};
use crate::metrics::Metrics;

/// Build the full application router from the on-disk/env configuration:
/// scrape API, health probe and `/metrics`.
pub fn app() -> anyhow::Result<Router> {
    let scrape = ScrapeConfig::load()?;
    let refiner = RefinerConfig::load()?;
    let engine = ScrapeEngine::from_configs(scrape, &refiner)?;
    let metrics = Metrics::init()?;
    info!("router assembled");
    Ok(router(AppState::new(engine)).merge(metrics.router()))
}
