//! herald - demo driver for the delivery engine
//!
//! 実際の surface の代わりに ScriptedProvider を使い、制御面と同じ JSON メッセージで
//! job を投入します。stdout にはレスポンスとイベントを JSON lines で出します（ログは stderr）。
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter (default `info`)
//! - `HERALD_MAX_ATTEMPTS`, `HERALD_ATTEMPT_TIMEOUT_MS`, `HERALD_SETTLE_MS`: config overrides

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use herald_core::app::{
    ControlRequest, EngineBuilder, EngineConfig, RawTargets, StartBulkSend, StatusChannel,
};
use herald_core::domain::StatusEvent;
use herald_core::impls::{ChannelSink, ScriptedProvider, SurfaceScript};
use herald_core::observability::{self, LogFormat};
use tracing::info;

/// Send one payload to many recipients against a simulated surface.
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(version, about, long_about = None)]
struct Args {
    /// Recipients, separated by commas or newlines (repeatable)
    #[arg(short, long = "target", value_name = "LIST")]
    targets: Vec<String>,

    /// File with one recipient per line
    #[arg(long, value_name = "PATH")]
    targets_file: Option<PathBuf>,

    /// Text to deliver
    #[arg(short, long)]
    payload: String,

    /// Wait between two recipients, in milliseconds
    #[arg(short, long, default_value_t = 5_000)]
    delay_ms: u64,

    /// Probability that the simulated surface swallows a submission
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Send a stop request after this many recipients
    #[arg(long, value_name = "N")]
    stop_after: Option<usize>,

    /// Engine config (JSON)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn raw_targets(args: &Args) -> Result<RawTargets> {
    let mut entries = args.targets.clone();
    if let Some(path) = &args.targets_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading targets from {}", path.display()))?;
        entries.push(text);
    }
    if entries.is_empty() {
        bail!("no recipients given; use --target or --targets-file");
    }
    Ok(RawTargets::List(entries))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    observability::init(if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    let config = load_config(args.config.as_ref())?;
    let provider =
        ScriptedProvider::new(SurfaceScript::delivering()).with_failure_rate(args.failure_rate);
    let (sink, mut events) = ChannelSink::new();
    let orchestrator = EngineBuilder::new()
        .config(config)
        .provider(Arc::new(provider))
        .sink(Arc::new(sink))
        .build()?;
    let channel = StatusChannel::new(orchestrator);

    let start = ControlRequest::StartBulkSend(StartBulkSend {
        targets: raw_targets(&args)?,
        payload: args.payload.clone(),
        delay_ms: args.delay_ms,
    });
    let response = channel.handle(start);
    println!("{}", serde_json::to_string(&response)?);
    if !response.success {
        bail!(
            "job rejected: {}",
            response.error.unwrap_or_else(|| "unknown reason".to_string())
        );
    }

    while let Some(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        match &event {
            StatusEvent::SendProgress(progress) => {
                if args.stop_after == Some(progress.current) {
                    info!(after = progress.current, "requesting stop");
                    let response = channel.handle(ControlRequest::StopBulkSend);
                    println!("{}", serde_json::to_string(&response)?);
                }
            }
            StatusEvent::SendComplete(_) => break,
        }
    }
    Ok(())
}
