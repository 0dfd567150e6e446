//! Crossing control node
//!
//! Runs the traffic and rail decision loops with:
//! - CLI arguments and TOML config file support
//! - Structured logging with tracing
//! - Optional consensus anchoring and cross-domain supervisor
//! - Prometheus HTTP metrics endpoint
//! - JSONL replay ingestion

use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use crossing_control::control::config::ConsensusConfig;
use crossing_control::{
    init_logging, Actuator, AppConfig, ConsensusAnchor, ControlRuntime, DecisionLog,
    DecisionPipeline, FallbackPolicy, HttpActuator, HttpLedger, HttpOracle, IngestRequest,
    InferenceGateway, LogFormat, MeasurementStore, NoopActuator, PipelineMetrics, SupervisorCheck,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "control_node")]
#[command(version, about = "Traffic signal and rail barrier control node", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "control_node.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<String>,

    /// Metrics HTTP port (0 to disable)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Feed measurements from a JSONL file of {kind, location, value, ts?}
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Delay between replayed lines (ms)
    #[arg(long, default_value_t = 0)]
    replay_interval_ms: u64,

    /// Primary inference oracle URL (overrides config)
    #[arg(long, env = "INFERENCE_URL")]
    inference_url: Option<String>,

    /// Consensus ledger bridge URL (overrides config)
    #[arg(long, env = "LEDGER_URL")]
    ledger_url: Option<String>,

    /// Ledger operator account id
    #[arg(long, env = "LEDGER_OPERATOR_ID")]
    operator_id: Option<String>,

    /// Ledger operator key
    #[arg(long, env = "LEDGER_OPERATOR_KEY", hide_env_values = true)]
    operator_key: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a sample config file
    GenerateConfig {
        /// Output file path
        #[arg(short, long, default_value = "control_node.toml")]
        output: String,
    },
    /// Validate config without running
    ValidateConfig,
    /// Run the control loops (default)
    Run,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::GenerateConfig { output }) => {
            generate_sample_config(output)?;
            return Ok(());
        }
        Some(Commands::ValidateConfig) => {
            let config = load_config(&cli)?;
            println!("Configuration is valid:\n{config:#?}");
            println!(
                "Consensus anchoring: {}",
                if config.consensus.has_credentials() { "enabled" } else { "disabled" }
            );
            return Ok(());
        }
        Some(Commands::Run) | None => {}
    }

    let config = load_config(&cli)?;
    let _log_guards = init_logging(&config.logging)?;

    let metrics = PipelineMetrics::new();
    let store = Arc::new(MeasurementStore::new(&config.retention).with_metrics(metrics.clone()));
    let log = Arc::new(DecisionLog::from_retention(&config.retention));

    let anchor = Arc::new(build_anchor(&config.consensus, log.clone(), metrics.clone())?);

    let actuator: Arc<dyn Actuator> = match &config.actuation.url {
        Some(url) => Arc::new(HttpActuator::new(url.as_str(), &config.actuation)?),
        None => {
            warn!("No actuation URL configured, outcomes will only be logged");
            Arc::new(NoopActuator)
        }
    };

    let mut pipeline = DecisionPipeline::new(
        config.pipeline.clone(),
        store.clone(),
        log.clone(),
        FallbackPolicy::new(config.fallback.clone()),
    )
    .with_anchor(anchor.clone())
    .with_actuator(actuator)
    .with_metrics(metrics.clone());

    let timeout = config.inference.timeout();
    if let Some(url) = &config.inference.primary_url {
        let oracle = Arc::new(HttpOracle::new(url.as_str(), timeout)?);
        pipeline = pipeline.with_primary(InferenceGateway::new("primary", oracle, timeout));
        info!(url = %url, timeout_ms = config.inference.timeout_ms, "Primary inference route configured");
    } else {
        warn!("No inference oracle configured, every decision will use the fallback rule");
    }
    if let Some(url) = &config.inference.secondary_url {
        let oracle = Arc::new(HttpOracle::new(url.as_str(), timeout)?);
        pipeline = pipeline.with_secondary(InferenceGateway::new("secondary", oracle, timeout));
        info!(url = %url, "Secondary inference route configured");
    }

    let mut runtime = ControlRuntime::new(Arc::new(pipeline));
    if let Some(interval) = config.supervisor.interval() {
        let mut check = SupervisorCheck::new(log.clone()).with_metrics(metrics.clone());
        if config.supervisor.anchor_reports {
            check = check.with_anchor(anchor.clone());
        }
        runtime = runtime.with_supervisor(Arc::new(check), interval);
    }

    // Start HTTP metrics endpoint if enabled
    let metrics_port = cli.metrics_port.unwrap_or(config.monitoring.metrics_port);
    if metrics_port > 0 {
        let prometheus = metrics.clone();
        tokio::spawn(async move {
            let app = Router::new().route(
                "/metrics",
                get(move || {
                    let prom = prometheus.clone();
                    async move { prom.to_prometheus_text() }
                }),
            );

            let addr = format!("0.0.0.0:{metrics_port}");
            info!(port = metrics_port, "Starting Prometheus metrics endpoint");

            match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app).await {
                        warn!(error = %e, "Metrics server error");
                    }
                }
                Err(e) => {
                    warn!(error = %e, port = metrics_port, "Failed to bind metrics port");
                }
            }
        });
    }

    if let Some(path) = cli.replay.clone() {
        let store = store.clone();
        let pause = Duration::from_millis(cli.replay_interval_ms);
        tokio::spawn(async move {
            if let Err(e) = replay_file(&path, &store, pause).await {
                warn!(error = %e, path = %path.display(), "Replay aborted");
            }
        });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            // Keep the sender alive so the loops keep running
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping control loops");
        let _ = shutdown_tx.send(true);
    });

    info!(
        tick_interval_ms = config.pipeline.tick_interval_ms,
        anchoring = anchor.is_enabled(),
        "Control node started"
    );
    let summaries = runtime.run(shutdown_rx).await;
    for summary in summaries {
        info!(agent = %summary.kind, ticks = summary.ticks, "Loop summary");
    }
    info!(decisions = log.len(), "Control node stopped");

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config_path = &cli.config;
    let mut config = if Path::new(config_path).exists() {
        let content = std::fs::read_to_string(config_path)?;
        AppConfig::from_toml_str(&content)?
    } else {
        // Return default config if file doesn't exist
        AppConfig::default()
    };

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.parse::<LogFormat>()?;
    }
    if let Some(url) = &cli.inference_url {
        config.inference.primary_url = Some(url.clone());
    }
    if let Some(url) = &cli.ledger_url {
        config.consensus.ledger_url = Some(url.clone());
    }
    if let Some(id) = &cli.operator_id {
        config.consensus.operator_id = Some(id.clone());
    }
    if let Some(key) = &cli.operator_key {
        config.consensus.operator_key = Some(key.clone());
    }
    config.validate()?;
    Ok(config)
}

fn build_anchor(
    config: &ConsensusConfig,
    log: Arc<DecisionLog>,
    metrics: PipelineMetrics,
) -> Result<ConsensusAnchor, Box<dyn std::error::Error>> {
    match HttpLedger::from_config(config)? {
        Some(ledger) => {
            info!(
                ledger_url = config.ledger_url.as_deref().unwrap_or_default(),
                wait_budget_ms = config.wait_budget_ms,
                "Consensus anchoring enabled"
            );
            Ok(ConsensusAnchor::new(Arc::new(ledger), config)
                .with_sink(log)
                .with_metrics(metrics))
        }
        None => {
            info!("Ledger credentials not configured, consensus anchoring disabled");
            Ok(ConsensusAnchor::disabled())
        }
    }
}

/// Ingest every line of a JSONL file, logging and skipping invalid lines.
async fn replay_file(path: &Path, store: &MeasurementStore, pause: Duration) -> std::io::Result<()> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let (mut accepted, mut rejected) = (0u64, 0u64);
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let request: IngestRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                rejected += 1;
                warn!(line = line_no, error = %e, "Skipping unparseable replay line");
                continue;
            }
        };
        match store.ingest_request(request) {
            Ok(_) => accepted += 1,
            Err(e) => {
                rejected += 1;
                warn!(line = line_no, error = %e, "Skipping invalid replay measurement");
            }
        }
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    info!(accepted, rejected, path = %path.display(), "Replay finished");
    Ok(())
}

fn generate_sample_config(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let body = AppConfig::default().to_toml_string()?;
    let content = format!(
        "# Crossing control node configuration\n\
         # Ledger credentials are read from LEDGER_OPERATOR_ID / LEDGER_OPERATOR_KEY\n\n{body}"
    );
    std::fs::write(path, content)?;
    println!("Generated sample config: {path}");
    Ok(())
}
