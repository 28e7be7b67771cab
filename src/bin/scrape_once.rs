//! Runs one scrape session from the command line and prints the response JSON.
//!
//! ```text
//! scrape_once "backend developer" --location Remote --max 10 --source indeed --skill rust
//! ```
//! `--progress` also prints each progress event (one JSON line) to stderr.

use anyhow::{bail, Context};
use tokio::sync::mpsc::unbounded_channel;

use internship_scout::config::{RefinerConfig, ScrapeConfig};
use internship_scout::{ScrapeEngine, ScrapeRequest};

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<(ScrapeRequest, bool)> {
    let mut query: Vec<String> = Vec::new();
    let mut req = ScrapeRequest::new("");
    let mut progress = false;
    while let Some(a) = args.next() {
        match a.as_str() {
            "--location" => req.location = Some(args.next().context("--location needs a value")?),
            "--max" => {
                let v = args.next().context("--max needs a value")?;
                req.max_results = v.parse().with_context(|| format!("bad --max value: {v}"))?;
            }
            "--source" => req.sources.push(args.next().context("--source needs a value")?),
            "--skill" => req.skills.push(args.next().context("--skill needs a value")?),
            "--progress" => progress = true,
            flag if flag.starts_with("--") => bail!("unknown flag: {flag}"),
            word => query.push(word.to_string()),
        }
    }
    if query.is_empty() {
        bail!("usage: scrape_once <query> [--location L] [--max N] [--source S].. [--skill K].. [--progress]");
    }
    req.query = query.join(" ");
    Ok((req, progress))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    internship_scout::telemetry::init_tracing();

    let (req, show_progress) = parse_args(std::env::args().skip(1))?;
    let engine = ScrapeEngine::from_configs(ScrapeConfig::load()?, &RefinerConfig::load()?)?;

    let (tx, mut rx) = unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            if show_progress {
                if let Ok(line) = serde_json::to_string(&ev) {
                    eprintln!("{line}");
                }
            }
        }
    });

    let outcome = engine.run(&req, Some(tx)).await?;
    let _ = printer.await;
    println!("{}", serde_json::to_string_pretty(&outcome.response())?);
    Ok(())
}
