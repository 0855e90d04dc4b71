//! fetch-probe: run one request through the fetch engine from the command line.

use anime_fetch::{CancellationToken, FetchEngine, FetchProfiles, FetchRequest};
use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Method;
use shared::{Config, LogConfig};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL to fetch
    url: String,

    /// HTTP method
    #[arg(short, long, default_value = "GET", value_parser = parse_method)]
    method: Method,

    /// Query parameter as key=value (repeatable)
    #[arg(short = 'p', long = "param", value_parser = parse_pair)]
    params: Vec<(String, String)>,

    /// Request header as name=value (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_pair)]
    headers: Vec<(String, String)>,

    /// Decode the body as JSON and pretty-print it
    #[arg(long)]
    json: bool,

    /// Override the number of racing workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Override the attempts each worker makes
    #[arg(short, long)]
    attempts: Option<u32>,

    /// Override the per-attempt timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Use the sequential profile instead of the interactive one
    #[arg(long)]
    sequential: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {:?}", raw)),
    }
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|e| format!("invalid method {:?}: {}", raw, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let mut log_config = LogConfig::from_settings(&config.logging, "fetch-probe");
    if args.verbose {
        log_config.default_level = tracing::Level::DEBUG;
    }
    shared::logging::init(log_config)?;

    let profiles =
        FetchProfiles::from_section(&config.fetch).context("Invalid [fetch] configuration")?;

    let mut fetch_config = if args.sequential {
        profiles.sequential.clone()
    } else {
        profiles.interactive.clone()
    };
    if let Some(workers) = args.workers {
        fetch_config = fetch_config.with_workers(workers);
    }
    if let Some(attempts) = args.attempts {
        fetch_config = fetch_config.with_max_attempts(attempts);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        fetch_config = fetch_config.with_attempt_timeout(Duration::from_millis(timeout_ms));
    }

    let engine = FetchEngine::new(fetch_config)
        .context("Failed to create fetch engine")?
        .with_policy(profiles.policy);

    info!(
        url = %args.url,
        method = %args.method,
        workers = engine.config().workers,
        max_attempts = engine.config().max_attempts,
        attempt_timeout_ms = engine.config().attempt_timeout.as_millis() as u64,
        "fetch-probe starting"
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling fetch");
            on_interrupt.cancel();
        }
    });

    let request = FetchRequest::new(args.method.clone(), args.url.clone())
        .headers(args.headers.iter().cloned());
    let request = args
        .params
        .iter()
        .fold(request, |request, (key, value)| request.param(key, value));

    let mut stdout = std::io::stdout().lock();
    if args.json {
        let value: serde_json::Value = engine
            .fetch_json(request, &cancel)
            .await
            .with_context(|| format!("Fetch of {} failed", args.url))?;
        let pretty = serde_json::to_string_pretty(&value).context("Failed to format JSON")?;
        writeln!(stdout, "{}", pretty).context("Failed to write to stdout")?;
    } else {
        let body = engine
            .fetch_bytes(request, &cancel)
            .await
            .with_context(|| format!("Fetch of {} failed", args.url))?;
        stdout.write_all(&body).context("Failed to write to stdout")?;
        info!(bytes = body.len(), "Body written");
    }
    stdout.flush().context("Failed to flush stdout")?;

    Ok(())
}
