use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::unbounded_channel;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::engine::{EngineError, ScrapeEngine, ScrapeRequest, SessionOutcome};
use crate::fallback::sample_internships;
use crate::protocol::{ScrapeResponse, StreamEvent};
use crate::sources::types::SourceId;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScrapeEngine>,
}

impl AppState {
    pub fn new(engine: ScrapeEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Response body for a finished session, with sample postings swapped in
    /// when every source came back empty and samples are enabled.
    fn respond(&self, req: &ScrapeRequest, outcome: &SessionOutcome) -> ScrapeResponse {
        let mut resp = outcome.response();
        if outcome.exhausted() && self.engine.config().fallback_samples {
            resp.opportunities =
                sample_internships(&req.query, req.location.as_deref(), req.max_results);
            resp.total_results = resp.opportunities.len();
        }
        resp
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/internships/scrape", post(scrape))
        .route("/api/internships/scrape/stream", post(scrape_stream))
        .route("/api/internships/scrape/status", get(scrape_status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Request-level failures. Source failures never end up here.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        ApiError::BadRequest(r.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Engine(EngineError::Session(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}

async fn scrape(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    let Json(req) = payload?;
    let outcome = state.engine.run(&req, None).await?;
    Ok(Json(state.respond(&req, &outcome)))
}

fn sse_event(ev: &StreamEvent) -> Option<Event> {
    match ev.to_json() {
        Ok(data) => Some(Event::default().event(ev.name()).data(data)),
        Err(e) => {
            warn!(event = ev.name(), error = %e, "SSE: failed to serialize event");
            None
        }
    }
}

/// One `progress` event per status transition, then one `result` event.
async fn scrape_stream(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(req) = payload?;
    state.engine.validate(&req)?;

    let (tx, mut rx) = unbounded_channel();
    let engine = state.engine.clone();
    let session = tokio::spawn(async move {
        let outcome = engine.run(&req, Some(tx)).await;
        (req, outcome)
    });

    let stream = async_stream::stream! {
        while let Some(progress) = rx.recv().await {
            if let Some(ev) = sse_event(&StreamEvent::Progress(progress)) {
                yield Ok(ev);
            }
        }
        match session.await {
            Ok((req, Ok(outcome))) => {
                let body = state.respond(&req, &outcome);
                if let Some(ev) = sse_event(&StreamEvent::Result(Box::new(body))) {
                    yield Ok(ev);
                }
            }
            Ok((_, Err(e))) => {
                yield Ok(Event::default().event("error").data(e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "SSE: session task failed");
                yield Ok(Event::default().event("error").data("session task failed"));
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[derive(Serialize)]
struct StatusOut {
    available: bool,
    sources: Vec<SourceId>,
    renderer: &'static str,
}

async fn scrape_status(State(state): State<AppState>) -> Json<StatusOut> {
    let sources = state.engine.registry().ids();
    Json(StatusOut {
        available: !sources.is_empty(),
        sources,
        renderer: state.engine.renderer_name(),
    })
}
