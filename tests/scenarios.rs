// tests/scenarios.rs
//
// End-to-end sessions over scripted boards: fan-out, dedup, ranking, response.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{engine_with, fast_config, postings, Reply, ScriptedBoard, BOARD_X, BOARD_Y};
use internship_scout::session::TerminalState;
use internship_scout::sources::types::{FetchError, Tier};
use internship_scout::ScrapeRequest;

fn request(query: &str) -> ScrapeRequest {
    let mut req = ScrapeRequest::new(query);
    req.location = Some("Remote".into());
    req.max_results = 10;
    req
}

#[tokio::test]
async fn scenario_a_mixed_tiers_merge_and_rank() {
    let x = Arc::new(
        ScriptedBoard::new(BOARD_X).on(
            Tier::StaticFetch,
            Reply::Postings(vec![
                ("Frontend Intern", "Globex", "React and CSS"),
                ("Backend Intern", "Initech", "APIs in Go"),
            ]),
        ),
    );
    let y = Arc::new(
        ScriptedBoard::new(BOARD_Y)
            .on(Tier::StaticFetch, Reply::Fail(FetchError::Blocked("HTTP 403".into())))
            .on(Tier::RenderedFetch, Reply::Fail(FetchError::SourceUnavailable("no browser".into())))
            .on(
                Tier::FeedFetch,
                Reply::Postings(vec![("Intern, Platform", "Hooli", "backend services")]),
            ),
    );
    let engine = engine_with(vec![x, y], fast_config(2_000));
    let out = engine.run(&request("backend intern"), None).await.unwrap();
    let resp = out.response();

    assert!(resp.success);
    assert_eq!(resp.total_results, 3);
    assert!(!resp.has_fallback);
    assert_eq!(resp.terminal_state, TerminalState::Completed);

    let scores: Vec<f32> = resp.opportunities.iter().map(|o| o.match_score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{scores:?}");
    assert_eq!(resp.opportunities[0].title, "Backend Intern");
    assert_eq!(resp.opportunities[1].company, "Hooli");
    assert_eq!(resp.opportunities[1].tier_used, Some(Tier::FeedFetch));
    assert_eq!(resp.opportunities[2].match_score, 0.0);
    assert_eq!(resp.source_statuses[&BOARD_Y].tier, Some(Tier::FeedFetch));
}

#[tokio::test]
async fn scenario_b_all_sources_fail() {
    let failing = |id| {
        Arc::new(
            ScriptedBoard::new(id)
                .on(Tier::StaticFetch, Reply::Fail(FetchError::Blocked("HTTP 403".into())))
                .on(Tier::RenderedFetch, Reply::Fail(FetchError::ParseError("no cards".into())))
                .on(Tier::FeedFetch, Reply::Fail(FetchError::RateLimited)),
        )
    };
    let engine = engine_with(vec![failing(BOARD_X), failing(BOARD_Y)], fast_config(2_000));
    let out = engine.run(&request("backend intern"), None).await.unwrap();
    let resp = out.response();

    assert!(resp.success);
    assert!(resp.has_fallback);
    assert!(resp.opportunities.is_empty());
    assert_eq!(resp.total_results, 0);
    assert_eq!(resp.terminal_state, TerminalState::AllSourcesFailed);
    assert_eq!(resp.source_statuses[&BOARD_X].reason.as_deref(), Some("rate limited"));
}

#[tokio::test]
async fn scenario_c_duplicate_keeps_longer_description() {
    let x = Arc::new(ScriptedBoard::new(BOARD_X).on(
        Tier::StaticFetch,
        Reply::Postings(vec![("Backend Intern", "Acme", "Short.")]),
    ));
    let y = Arc::new(ScriptedBoard::new(BOARD_Y).on(
        Tier::StaticFetch,
        Reply::Postings(vec![(
            "Backend Intern",
            "ACME",
            "A much longer description of the backend internship.",
        )]),
    ));
    let engine = engine_with(vec![x, y], fast_config(2_000));
    let out = engine.run(&request("backend"), None).await.unwrap();

    assert_eq!(out.results.len(), 1);
    let only = &out.results[0];
    assert_eq!(
        only.posting.description,
        "A much longer description of the backend internship."
    );
    assert_eq!(only.sources, BTreeSet::from([BOARD_X, BOARD_Y]));
    assert_eq!(out.response().opportunities[0].sources, vec!["board_x", "board_y"]);
}

#[tokio::test]
async fn session_results_never_share_a_key() {
    let x = Arc::new(ScriptedBoard::new(BOARD_X).on(
        Tier::StaticFetch,
        Reply::Postings(vec![
            ("Rust Intern", "Acme", ""),
            ("Rust  Intern!", "acme", "dup with punctuation"),
            ("Go Intern", "Acme", ""),
        ]),
    ));
    let y = Arc::new(ScriptedBoard::new(BOARD_Y).on(
        Tier::StaticFetch,
        Reply::Postings(vec![("rust intern", "ACME.", ""), ("Go Intern", "Initech", "")]),
    ));
    let engine = engine_with(vec![x, y], fast_config(2_000));
    let out = engine.run(&request("rust"), None).await.unwrap();

    let keys: BTreeSet<&str> = out.results.iter().map(|p| p.canonical_key.as_str()).collect();
    assert_eq!(keys.len(), out.results.len());
    assert_eq!(out.results.len(), 3);
}

#[tokio::test]
async fn max_results_truncates_after_ranking() {
    let x = Arc::new(ScriptedBoard::new(BOARD_X).on(
        Tier::StaticFetch,
        postings(&["Sales Intern", "Rust Intern", "Design Intern", "Rust Backend Intern"]),
    ));
    let engine = engine_with(vec![x], fast_config(2_000));
    let mut req = request("rust backend");
    req.max_results = 2;
    let out = engine.run(&req, None).await.unwrap();

    let titles: Vec<&str> = out.results.iter().map(|p| p.posting.title.as_str()).collect();
    assert_eq!(titles, vec!["Rust Backend Intern", "Rust Intern"]);
}

#[tokio::test]
async fn identical_inputs_rank_identically() {
    let build = || {
        let x = Arc::new(ScriptedBoard::new(BOARD_X).on(
            Tier::StaticFetch,
            postings(&["Rust Intern", "Backend Intern", "Data Intern"]),
        ));
        let y = Arc::new(ScriptedBoard::new(BOARD_Y).on(
            Tier::StaticFetch,
            Reply::Postings(vec![("Rust Intern", "Zed", ""), ("Ops Intern", "Acme", "")]),
        ));
        engine_with(vec![x, y], fast_config(2_000))
    };
    let a = build().run(&request("rust"), None).await.unwrap();
    let b = build().run(&request("rust"), None).await.unwrap();

    let keys = |o: &internship_scout::engine::SessionOutcome| {
        o.results.iter().map(|p| p.canonical_key.clone()).collect::<Vec<_>>()
    };
    assert_eq!(keys(&a), keys(&b));
}
