use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use marker_bridge::bridge::Bridge;
use marker_bridge::config::BridgeConfig;
use marker_bridge::source::scripted::ScriptedSource;
use marker_bridge::source::stdin::StdinSource;
use marker_bridge::types::MarkerId;

/// Watches a marker detection stream and notifies the control server when
/// a registered target holds still long enough.
#[derive(Debug, Parser)]
#[command(name = "marker-bridge", version, about)]
struct Cli {
    /// Path to a JSON config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where detections come from.
    #[arg(long, value_enum, default_value_t = SourceKind::Stdin)]
    source: SourceKind,

    /// Marker id used by the demo script.
    #[arg(long, default_value_t = 5)]
    demo_marker: u32,

    /// Override: maximum centroid movement in pixels.
    #[arg(long)]
    stability_threshold: Option<f64>,

    /// Override: required hold time in seconds.
    #[arg(long)]
    stability_duration: Option<f64>,

    /// Override: tolerated detection gap in seconds.
    #[arg(long)]
    grace_period: Option<f64>,

    /// Override: WebSocket URI of the control server.
    #[arg(long)]
    endpoint_uri: Option<String>,

    /// Override: reconnect backoff in seconds.
    #[arg(long)]
    reconnect_interval: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// JSON lines from a detector process on stdin.
    Stdin,
    /// Built-in script: one marker holds still, drifts off, disappears.
    Demo,
}

/// Merge the config file (if any) with CLI overrides and validate.
fn build_config(cli: &Cli) -> Result<BridgeConfig, marker_bridge::config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(v) = cli.stability_threshold {
        config.stability_threshold = v;
    }
    if let Some(v) = cli.stability_duration {
        config.stability_duration = v;
    }
    if let Some(v) = cli.grace_period {
        config.grace_period = v;
    }
    if let Some(v) = &cli.endpoint_uri {
        config.endpoint_uri = v.clone();
    }
    if let Some(v) = cli.reconnect_interval {
        config.reconnect_interval = v;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(endpoint = %config.endpoint_uri, "starting marker bridge");

    let (bridge, handle) = Bridge::new(config);
    if cli.source == SourceKind::Demo {
        // No server is feeding targets in demo mode, so seed the registry
        bridge
            .registry()
            .set(MarkerId::new(cli.demo_marker), serde_json::json!({"demo": true}));
    }

    let interrupt_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            interrupt_handle.shutdown();
        }
    });

    let result = match cli.source {
        SourceKind::Stdin => bridge.run(StdinSource::from_stdin()).await,
        SourceKind::Demo => bridge.run(ScriptedSource::demo(cli.demo_marker)).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("bridge failed: {e}");
            ExitCode::FAILURE
        }
    }
}
