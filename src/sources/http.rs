// src/sources/http.rs
//! Plain HTTP fetch primitive shared by the static and feed tiers.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, REFERER};
use std::time::Duration;

use crate::sources::types::FetchError;

/// Phrases of an anti-bot interstitial served with a 2xx status. A bare
/// "captcha" in the body is not one: ordinary result pages load reCAPTCHA.
const BLOCK_MARKERS: &[&str] = &[
    "unusual traffic",
    "verify you are a human",
    "are you a robot",
];

/// Marker some boards use for a hard, permanent ban.
const PERMANENT_MARKERS: &[&str] = &["your ip has been permanently blocked"];

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: String,
    pub content_type: String,
    pub final_url: String,
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }

    /// GET `url` and return the body, classifying failures into the fetch taxonomy.
    pub async fn get(&self, url: &str, referer: Option<&str>) -> Result<FetchedPage, FetchError> {
        let mut req = self.client.get(url);
        if let Some(r) = referer {
            req = req.header(REFERER, r);
        }
        let resp = req.send().await.map_err(map_reqwest_error)?;

        let status = resp.status().as_u16();
        if let Some(err) = classify_status(status) {
            return Err(err);
        }

        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::ParseError(format!("body decode: {e}")))?;

        check_body(&final_url, &body)?;
        Ok(FetchedPage {
            body,
            content_type,
            final_url,
        })
    }
}

/// Maps a non-2xx status to its fetch error; `None` for success.
pub fn classify_status(status: u16) -> Option<FetchError> {
    match status {
        200..=299 => None,
        429 => Some(FetchError::RateLimited),
        401 | 451 => Some(FetchError::Permanent(format!("HTTP {status}"))),
        _ => Some(FetchError::Blocked(format!("HTTP {status}"))),
    }
}

/// Detects interstitial/ban pages that come back with a 2xx status.
pub fn check_body(final_url: &str, body: &str) -> Result<(), FetchError> {
    let head: String = body.chars().take(2000).collect::<String>().to_lowercase();
    if PERMANENT_MARKERS.iter().any(|m| head.contains(m)) {
        return Err(FetchError::Permanent("permanent block page".into()));
    }
    if final_url.to_ascii_lowercase().contains("captcha")
        || BLOCK_MARKERS.iter().any(|m| head.contains(m))
    {
        return Err(FetchError::Blocked("anti-bot interstitial".into()));
    }
    Ok(())
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() || e.is_request() {
        FetchError::SourceUnavailable(e.to_string())
    } else if e.is_decode() || e.is_body() {
        FetchError::ParseError(e.to_string())
    } else {
        FetchError::SourceUnavailable(e.to_string())
    }
}
