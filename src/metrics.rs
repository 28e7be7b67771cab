use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_all);
}

fn describe_all() {
    describe_counter!(
        "scrape_sessions_total",
        "Finished scrape sessions by terminal state."
    );
    describe_counter!(
        "scrape_tier_attempts_total",
        "Tier attempts by source, tier and outcome."
    );
    describe_counter!(
        "scrape_postings_raw_total",
        "Postings returned by sources before dedup."
    );
    describe_counter!(
        "scrape_postings_deduped_total",
        "Postings left after dedup."
    );
    describe_counter!(
        "query_refine_fallback_total",
        "Queries normalized without the refinement collaborator."
    );
    describe_histogram!("scrape_session_ms", "Session wall time in milliseconds.");
    describe_histogram!("scrape_tier_ms", "Tier attempt time in milliseconds.");
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process; later calls reuse it.
    pub fn init() -> anyhow::Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| {
                let handle = PrometheusBuilder::new().install_recorder()?;
                // Descriptions only stick once a recorder is in place.
                describe_all();
                Ok::<_, metrics_exporter_prometheus::BuildError>(handle)
            })
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?
            .clone();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
