//! Query refinement collaborator: provider abstraction + file cache + daily limit.
//! The engine never depends on this succeeding; `None` means "use the fallback".

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ai::RefinerConfig;
use crate::relevance::anon_hash;

/// What the refiner is asked.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RefineRequest {
    pub query: String,
    pub location: Option<String>,
    pub skills: Vec<String>,
}

/// Refined search parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefinedQuery {
    pub optimized_query: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub search_strategy: Option<String>,
}

impl RefinedQuery {
    /// Drop blank keywords and cap the list; `None` if nothing usable remains.
    fn sanitized(mut self) -> Option<Self> {
        self.optimized_query = self.optimized_query.trim().to_string();
        self.keywords = self
            .keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .take(8)
            .collect();
        self.location = self
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("not specified"));
        if self.optimized_query.is_empty() && self.keywords.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

pub trait QueryRefiner: Send + Sync {
    fn refine<'a>(
        &'a self,
        req: &'a RefineRequest,
    ) -> Pin<Box<dyn Future<Output = Option<RefinedQuery>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
    /// `false` skips the call entirely and the normalizer records a disabled fallback.
    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynRefiner = Arc<dyn QueryRefiner>;

/// Factory: build a refiner according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock refiner.
/// * Else if `config.enabled==false`, returns a disabled refiner.
/// * Else builds the OpenAI provider wrapped with caching + daily limit.
pub fn build_refiner(config: &RefinerConfig) -> DynRefiner {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(CachingRefiner::new(
            MockProvider,
            default_cache_dir(),
            config.daily_limit,
        ));
    }

    if !config.enabled {
        return Arc::new(DisabledRefiner);
    }

    match config.provider.as_str() {
        "openai" => match OpenAiProvider::new(config) {
            Ok(provider) => Arc::new(CachingRefiner::new(
                provider,
                default_cache_dir(),
                config.daily_limit,
            )),
            Err(e) => {
                tracing::warn!(error = %e, "openai refiner unavailable; refinement disabled");
                Arc::new(DisabledRefiner)
            }
        },
        _ => Arc::new(DisabledRefiner),
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does the remote call. Separated so the same caching
/// wrapper serves production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(
        &'a self,
        req: &'a RefineRequest,
    ) -> Pin<Box<dyn Future<Output = Option<RefinedQuery>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

/// OpenAI Chat Completions provider.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(cfg: &RefinerConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("internship-scout/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(2))
            .timeout(cfg.timeout())
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }
}

const SYSTEM_PROMPT: &str =
    "You are a job search query optimizer. Always respond with valid JSON only.";

fn user_prompt(req: &RefineRequest) -> String {
    let location = req.location.as_deref().unwrap_or("Not specified");
    let skills = if req.skills.is_empty() {
        "None".to_string()
    } else {
        req.skills.join(", ")
    };
    format!(
        "Optimize this internship search for job boards.\n\
         Query: {query}\nLocation: {location}\nSkills: {skills}\n\n\
         Return JSON: {{\"optimized_query\": string, \"location\": string, \
         \"keywords\": [string], \"search_strategy\": string}}\n\
         - 2-4 key role terms; do not put the location in the query\n\
         - Indian cities as \"City, State\" (e.g. \"Bengaluru, Karnataka\"); remote as \"Remote\"\n\
         - add \"intern\" only if not already present",
        query = req.query
    )
}

/// Strips a surrounding ```json fence.
pub fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let t = t
        .strip_prefix("```json")
        .or_else(|| t.strip_prefix("```"))
        .unwrap_or(t);
    t.strip_suffix("```").unwrap_or(t).trim()
}

impl Provider for OpenAiProvider {
    fn fetch<'a>(
        &'a self,
        req: &'a RefineRequest,
    ) -> Pin<Box<dyn Future<Output = Option<RefinedQuery>> + Send + 'a>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return None;
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let prompt = user_prompt(req);
            let body = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    Msg {
                        role: "user",
                        content: &prompt,
                    },
                ],
                temperature: 0.3,
                max_tokens: 300,
            };

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .ok()?;

            if !resp.status().is_success() {
                tracing::warn!(status = %resp.status(), "refiner http error");
                return None;
            }
            let body: Resp = resp.json().await.ok()?;
            let content = body.choices.first().map(|c| c.message.content.as_str())?;
            serde_json::from_str::<RefinedQuery>(strip_code_fence(content)).ok()
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Returns `None` always; used when refinement is disabled.
pub struct DisabledRefiner;

impl QueryRefiner for DisabledRefiner {
    fn refine<'a>(
        &'a self,
        _req: &'a RefineRequest,
    ) -> Pin<Box<dyn Future<Output = Option<RefinedQuery>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

/// Deterministic provider for tests/local runs: appends " intern" and echoes words.
#[derive(Clone, Copy, Default)]
pub struct MockProvider;

impl Provider for MockProvider {
    fn fetch<'a>(
        &'a self,
        req: &'a RefineRequest,
    ) -> Pin<Box<dyn Future<Output = Option<RefinedQuery>> + Send + 'a>> {
        let q = req.query.trim().to_lowercase();
        let optimized_query = if q.contains("intern") {
            q.clone()
        } else {
            format!("{q} intern")
        };
        let out = RefinedQuery {
            optimized_query,
            location: req.location.clone(),
            keywords: q.split_whitespace().map(str::to_string).collect(),
            search_strategy: Some("mock".to_string()),
        };
        Box::pin(async move { Some(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching wrapper (file cache + daily limit)
// ------------------------------------------------------------

pub struct CachingRefiner<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingRefiner<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir); // best-effort
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    /// True when the daily budget of real calls is spent.
    fn limit_reached(&self) -> bool {
        let Ok(mut g) = self.counter.lock() else {
            return true;
        };
        if g.is_expired() {
            g.reset_to_today();
            let _ = save_daily_counter(&self.cache_dir, &g);
        }
        g.count >= self.daily_limit_max
    }

    fn record_call(&self) {
        if let Ok(mut g) = self.counter.lock() {
            g.count = g.count.saturating_add(1);
            let _ = save_daily_counter(&self.cache_dir, &g);
        }
    }

    async fn refine_impl(&self, req: &RefineRequest) -> Option<RefinedQuery> {
        // Cache hits do not count against the daily limit.
        let key = cache_key(req);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return Some(hit);
        }
        if self.limit_reached() {
            tracing::debug!(provider = self.inner.name(), "refiner daily limit reached");
            return None;
        }

        let fresh = self.inner.fetch(req).await.and_then(RefinedQuery::sanitized)?;
        let _ = write_cache_file(&self.cache_dir, &key, &fresh);
        self.record_call();
        Some(fresh)
    }
}

impl<P: Provider> QueryRefiner for CachingRefiner<P> {
    fn refine<'a>(
        &'a self,
        req: &'a RefineRequest,
    ) -> Pin<Box<dyn Future<Output = Option<RefinedQuery>> + Send + 'a>> {
        Box::pin(self.refine_impl(req))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/refine")
}

fn cache_key(req: &RefineRequest) -> String {
    let mut skills = req.skills.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();
    skills.sort();
    let material = format!(
        "{}\n{}\n{}",
        req.query.trim().to_lowercase(),
        req.location.as_deref().unwrap_or_default().trim().to_lowercase(),
        skills.join(",")
    );
    anon_hash(&material)
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<RefinedQuery> {
    let buf = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&buf).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &RefinedQuery) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}
