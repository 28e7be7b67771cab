// tests/deadline.rs
//
// The session deadline bounds the whole request, whatever the sources do.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use common::{engine_with, fast_config, postings, Reply, ScriptedBoard, BOARD_X, BOARD_Y};
use internship_scout::session::TerminalState;
use internship_scout::sources::types::{FetchError, Tier};
use internship_scout::ScrapeRequest;

const DEADLINE_MS: u64 = 300;
const EPSILON: Duration = Duration::from_millis(250);

#[tokio::test]
async fn hanging_tier_times_out_without_hurting_others() {
    let x = Arc::new(
        ScriptedBoard::new(BOARD_X).on(Tier::StaticFetch, postings(&["Backend Intern", "Rust Intern"])),
    );
    let y = Arc::new(
        ScriptedBoard::new(BOARD_Y)
            .on(Tier::StaticFetch, Reply::Fail(FetchError::Blocked("HTTP 403".into())))
            .on(Tier::RenderedFetch, Reply::Hang),
    );
    let engine = engine_with(vec![x, y], fast_config(DEADLINE_MS));

    let started = Instant::now();
    let out = engine.run(&ScrapeRequest::new("backend"), None).await.unwrap();
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_millis(DEADLINE_MS) + EPSILON,
        "returned after {elapsed:?}"
    );
    assert_eq!(out.statuses[&BOARD_Y].status, "timed_out");
    assert_eq!(out.statuses[&BOARD_X].status, "succeeded");
    assert_eq!(out.results.len(), 2);
    assert!(out.results.iter().all(|p| p.posting.source == BOARD_X));
    assert_eq!(out.terminal, TerminalState::PartialTimeout);
}

#[tokio::test]
async fn everything_hanging_is_all_sources_failed() {
    let x = Arc::new(ScriptedBoard::new(BOARD_X).on(Tier::StaticFetch, Reply::Hang));
    let y = Arc::new(ScriptedBoard::new(BOARD_Y).on(Tier::FeedFetch, Reply::Hang));
    let engine = engine_with(vec![x, y], fast_config(DEADLINE_MS));

    let started = Instant::now();
    let out = engine.run(&ScrapeRequest::new("backend"), None).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(DEADLINE_MS) + EPSILON);
    assert_eq!(out.terminal, TerminalState::AllSourcesFailed);
    assert!(out.response().has_fallback);
    assert!(out.statuses.values().all(|e| e.status == "timed_out"));
}

#[tokio::test]
async fn tier_floor_prevents_starting_a_doomed_tier() {
    let mut cfg = fast_config(DEADLINE_MS);
    // The rendered tier needs more than the whole session.
    cfg.tiers.get_mut(Tier::RenderedFetch).floor_ms = DEADLINE_MS * 2;
    cfg.tiers.get_mut(Tier::RenderedFetch).timeout_ms = DEADLINE_MS * 4;
    let x = Arc::new(
        ScriptedBoard::new(BOARD_X)
            .on(Tier::StaticFetch, postings(&[]))
            .on(
                Tier::RenderedFetch,
                Reply::Slow(Duration::from_millis(10), Box::new(postings(&["Never Intern"]))),
            ),
    );
    let engine = engine_with(vec![x.clone()], cfg);
    let out = engine.run(&ScrapeRequest::new("backend"), None).await.unwrap();

    assert_eq!(x.calls(Tier::RenderedFetch), 0);
    assert_eq!(out.statuses[&BOARD_X].status, "timed_out");
}

#[tokio::test]
async fn pool_of_one_still_respects_deadline() {
    let mut cfg = fast_config(DEADLINE_MS);
    cfg.worker_pool_size = Some(1);
    let x = Arc::new(ScriptedBoard::new(BOARD_X).on(Tier::StaticFetch, Reply::Hang));
    let y = Arc::new(ScriptedBoard::new(BOARD_Y).on(Tier::StaticFetch, postings(&["Backend Intern"])));
    let engine = engine_with(vec![x, y], cfg);

    let started = Instant::now();
    let out = engine.run(&ScrapeRequest::new("backend"), None).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(DEADLINE_MS) + EPSILON);
    assert_eq!(out.statuses[&BOARD_X].status, "timed_out");
    assert!(out.statuses.values().all(|e| e.status != "pending" && e.status != "fetching"));
}
