// src/sources/render.rs
//! Headless-browser page rendering for the rendered tier.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::config::scrape::ScrapeConfig;
use crate::sources::types::FetchError;

#[async_trait]
pub trait PageRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Load `url`, optionally wait for `wait_selector`, and return the rendered DOM.
    async fn render(&self, url: &str, wait_selector: Option<&str>) -> Result<String, FetchError>;
}

/// Used when no browser endpoint is configured; every rendered attempt escalates.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableRenderer;

#[async_trait]
impl PageRenderer for UnavailableRenderer {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn render(&self, _url: &str, _wait: Option<&str>) -> Result<String, FetchError> {
        Err(FetchError::SourceUnavailable(
            "no headless renderer configured".into(),
        ))
    }
}

/// Owns a remote resource (a browser session) and releases it even when the
/// owning future is dropped mid-await by a tier timeout or session cancel.
#[cfg_attr(not(feature = "webdriver"), allow(dead_code))]
pub(crate) struct QuitOnDrop<T: Send + 'static> {
    resource: Option<T>,
    release: fn(T) -> BoxFuture<'static, ()>,
}

#[cfg_attr(not(feature = "webdriver"), allow(dead_code))]
impl<T: Send + 'static> QuitOnDrop<T> {
    pub(crate) fn new(resource: T, release: fn(T) -> BoxFuture<'static, ()>) -> Self {
        Self {
            resource: Some(resource),
            release,
        }
    }

    pub(crate) fn get(&self) -> Option<&T> {
        self.resource.as_ref()
    }

    /// Release in place on the normal path.
    pub(crate) async fn quit(mut self) {
        if let Some(r) = self.resource.take() {
            (self.release)(r).await;
        }
    }
}

impl<T: Send + 'static> Drop for QuitOnDrop<T> {
    fn drop(&mut self) {
        let Some(r) = self.resource.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn((self.release)(r));
            }
            Err(_) => tracing::warn!("no runtime to release renderer session; leaked"),
        }
    }
}

#[cfg(feature = "webdriver")]
pub use webdriver::WebDriverRenderer;

#[cfg(feature = "webdriver")]
mod webdriver {
    use super::*;
    use std::time::Duration;
    use thirtyfour::prelude::*;

    const JS_SETTLE_MS: u64 = 1_500;

    /// Drives a chromedriver-compatible endpoint; one browser session per render.
    pub struct WebDriverRenderer {
        endpoint: String,
        user_agent: String,
    }

    impl WebDriverRenderer {
        pub fn new(endpoint: impl Into<String>, user_agent: impl Into<String>) -> Self {
            Self {
                endpoint: endpoint.into(),
                user_agent: user_agent.into(),
            }
        }

        async fn session(&self) -> Result<WebDriver, FetchError> {
            let mut caps = DesiredCapabilities::chrome();
            let ua_arg = format!("--user-agent={}", self.user_agent);
            caps.add_arg("--headless=new").map_err(unavailable)?;
            caps.add_arg("--no-sandbox").map_err(unavailable)?;
            caps.add_arg("--disable-dev-shm-usage").map_err(unavailable)?;
            caps.add_arg("--disable-gpu").map_err(unavailable)?;
            caps.add_arg("--window-size=1920,1080").map_err(unavailable)?;
            caps.add_arg("--disable-blink-features=AutomationControlled")
                .map_err(unavailable)?;
            caps.add_arg(&ua_arg).map_err(unavailable)?;
            WebDriver::new(self.endpoint.as_str(), caps)
                .await
                .map_err(unavailable)
        }
    }

    fn unavailable(e: WebDriverError) -> FetchError {
        FetchError::SourceUnavailable(format!("webdriver: {e}"))
    }

    #[async_trait]
    impl PageRenderer for WebDriverRenderer {
        fn name(&self) -> &'static str {
            "webdriver"
        }

        async fn render(&self, url: &str, wait_selector: Option<&str>) -> Result<String, FetchError> {
            let guard = QuitOnDrop::new(self.session().await?, release_driver);
            let result = match guard.get() {
                Some(driver) => load(driver, url, wait_selector).await,
                None => Err(FetchError::SourceUnavailable("webdriver session closed".into())),
            };
            guard.quit().await;
            result
        }
    }

    async fn load(driver: &WebDriver, url: &str, wait_selector: Option<&str>) -> Result<String, FetchError> {
        driver.goto(url).await.map_err(unavailable)?;
        if let Some(sel) = wait_selector {
            // Missing cards is not fatal; the page may simply be empty.
            let _ = driver.query(By::Css(sel)).first().await;
        } else {
            driver.query(By::Tag("body")).first().await.map_err(unavailable)?;
        }
        tokio::time::sleep(Duration::from_millis(JS_SETTLE_MS)).await;
        driver
            .source()
            .await
            .map_err(|e| FetchError::ParseError(format!("page source: {e}")))
    }

    fn release_driver(driver: WebDriver) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(e) = driver.quit().await {
                tracing::warn!(error = %e, "failed to quit webdriver session");
            }
        })
    }
}

/// Picks the renderer for this build and configuration.
pub fn build_renderer(cfg: &ScrapeConfig) -> Arc<dyn PageRenderer> {
    match cfg.webdriver_url.as_deref() {
        #[cfg(feature = "webdriver")]
        Some(endpoint) if !endpoint.trim().is_empty() => {
            tracing::info!(endpoint, "rendered tier uses webdriver");
            Arc::new(WebDriverRenderer::new(endpoint, cfg.user_agent.clone()))
        }
        Some(endpoint) if !endpoint.trim().is_empty() => {
            tracing::warn!(
                endpoint,
                "webdriver_url set but built without the `webdriver` feature; rendered tier disabled"
            );
            Arc::new(UnavailableRenderer)
        }
        _ => Arc::new(UnavailableRenderer),
    }
}
