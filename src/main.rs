//! Internship Scout: binary entrypoint.
//! Boots the Axum HTTP server through Shuttle: scrape API, health and metrics.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    internship_scout::telemetry::init_tracing();

    let router = internship_scout::app()?;
    Ok(router.into())
}
