//! VibeSense - Automotive Vibration Diagnostics
//!
//! Reads triaxial accelerometer frames from in-vehicle sensor nodes, tracks
//! live vibration severity per source, and prints a run summary with ranked
//! findings when the input ends.
//!
//! # Usage
//!
//! ```bash
//! # Live input from the simulation harness
//! ./simulation --seconds 120 | ./vibesense --stdin
//!
//! # Replay a recorded JSON-lines capture at 4x
//! ./vibesense --replay drive.jsonl --speed 4
//! ```
//!
//! # Environment Variables
//!
//! - `VIBESENSE_CONFIG`: Path to the diagnostics TOML (default: ./vibesense.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vibesense::config::defaults::{REPLAY_BASE_DELAY_MS, SETTINGS_POLL_SECS};
use vibesense::config::{self, DiagnosticsConfig, VehicleSpec};
use vibesense::findings::RunSummary;
use vibesense::pipeline::{
    pump, run_vehicle_watcher, AppState, FrameSource, IngestQueue, ProcessingLoop, ReplaySource,
    RunOutcome, StdinSource,
};
use vibesense::sanitize::sanitize_json;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "vibesense")]
#[command(about = "Automotive vibration diagnostics from in-vehicle accelerometers")]
#[command(version)]
#[command(group(clap::ArgGroup::new("input").required(true).args(["stdin", "replay"])))]
struct CliArgs {
    /// Read JSON sensor frames from stdin, one per line
    /// Use with simulator: ./simulation | ./vibesense --stdin
    #[arg(long)]
    stdin: bool,

    /// Replay a JSON-lines capture file
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Replay speed multiplier (1 = base pacing, 0 = no delay)
    #[arg(long, default_value = "0")]
    speed: u64,

    /// Diagnostics config file (overrides VIBESENSE_CONFIG)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the run summary JSON here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "VIBESENSE_JSON_LOGS")]
    json_logs: bool,
}

// ============================================================================
// Startup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Logs go to stderr; stdout carries the run summary.
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<DiagnosticsConfig> {
    match path {
        Some(path) => DiagnosticsConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(DiagnosticsConfig::load()),
    }
}

/// The file `load_config` read, if any, following the same search order.
fn settings_path(path: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path.clone());
    }
    std::env::var("VIBESENSE_CONFIG")
        .ok()
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .or_else(|| Some(PathBuf::from("vibesense.toml")).filter(|p| p.exists()))
}

// ============================================================================
// Pipeline
// ============================================================================

async fn run_pipeline<S: FrameSource>(
    mut source: S,
    app_state: Arc<RwLock<AppState>>,
    vehicle_rx: watch::Receiver<VehicleSpec>,
    cancel_token: CancellationToken,
) -> RunOutcome {
    let processing = ProcessingLoop::new(config::get(), app_state, cancel_token)
        .with_vehicle_updates(vehicle_rx);
    processing.run(&mut source).await
}

fn write_summary(summary: &RunSummary, output: Option<&PathBuf>) -> Result<()> {
    let value = serde_json::to_value(summary).context("Failed to serialize run summary")?;
    let (value, replaced) = sanitize_json(value);
    if replaced {
        warn!("[Main] Non-finite values in run summary were written as null");
    }
    let body = serde_json::to_string_pretty(&value)?;
    match output {
        Some(path) => {
            std::fs::write(path, body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("📝 Run summary written to {}", path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  VibeSense v{}", env!("CARGO_PKG_VERSION"));
    info!("  Automotive Vibration Diagnostics");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    config::init(load_config(args.config.as_ref())?);
    let cfg = config::get();
    info!(
        "🚗 Vehicle: {}/{} R{} | final drive {:.2} | gear {:.2}",
        cfg.vehicle.tire_width_mm,
        cfg.vehicle.tire_aspect_pct,
        cfg.vehicle.rim_in,
        cfg.vehicle.final_drive_ratio,
        cfg.vehicle.current_gear_ratio
    );

    let app_state = Arc::new(RwLock::new(AppState::default()));

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    // Vehicle settings edits apply while the run is in progress
    let (vehicle_tx, vehicle_rx) = watch::channel(cfg.vehicle.clone());
    if let Some(path) = settings_path(args.config.as_ref()) {
        info!("🔧 Watching {} for vehicle settings changes", path.display());
        tokio::spawn(run_vehicle_watcher(
            path,
            vehicle_tx,
            Duration::from_secs(SETTINGS_POLL_SECS),
            cancel_token.clone(),
        ));
    }

    let outcome = if args.stdin {
        info!("📥 Input: stdin (JSON sensor frames)");
        let (queue, queue_source) = IngestQueue::from_config(&cfg.pipeline);
        let reader = tokio::spawn(pump(StdinSource::stdin(), queue));
        let outcome =
            run_pipeline(queue_source, Arc::clone(&app_state), vehicle_rx, cancel_token).await;
        reader.abort();
        match reader.await {
            Ok(Ok(n)) => info!("[Main] stdin reader finished after {} frames", n),
            Ok(Err(e)) => error!("[Main] stdin reader failed: {}", e),
            Err(_) => {}
        }
        outcome
    } else if let Some(path) = args.replay.as_ref() {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let delay_ms = if args.speed == 0 { 0 } else { REPLAY_BASE_DELAY_MS / args.speed };
        let source = ReplaySource::from_json_lines(&body, delay_ms);
        info!(
            "📥 Input: replay of {} ({} frames, {}ms between frames)",
            path.display(),
            source.remaining(),
            delay_ms
        );
        run_pipeline(source, Arc::clone(&app_state), vehicle_rx, cancel_token).await
    } else {
        anyhow::bail!("No input selected; pass --stdin or --replay <FILE>");
    };

    write_summary(&outcome.summary, args.output.as_ref())?;

    info!("");
    info!("✓ VibeSense shutdown complete");
    Ok(())
}
