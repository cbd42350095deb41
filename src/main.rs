//! rembg-gateway
//!
//! HTTP front end for an external background-removal tool. One `POST /rembg`
//! per image, one tool process per request, clean shutdown on SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use rembg_gateway::config::{load_config, ConfigOverrides, LogFormat};
use rembg_gateway::lifecycle::{DrainOutcome, Service};
use rembg_gateway::observability::{logging, metrics};
use rembg_gateway::pipeline::RembgCommand;

#[derive(Parser)]
#[command(name = "rembg-gateway")]
#[command(about = "HTTP gateway for background removal via an external tool", long_about = None)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(short, long, env = "REMBG_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (host:port). Required.
    #[arg(long, env = "LISTEN_ADDRESS")]
    listen_address: Option<String>,

    /// Minimum log level or tracing filter directive.
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format: text or json.
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Absolute path of the background-removal executable.
    #[arg(long, env = "REMBG_PATH")]
    rembg_path: Option<PathBuf>,

    /// Per-invocation tool deadline in seconds (0 disables it).
    #[arg(long, env = "REMBG_TIMEOUT_SECS")]
    tool_timeout_secs: Option<u64>,

    /// Grace period for in-flight requests on shutdown, in seconds.
    #[arg(long, env = "SHUTDOWN_GRACE_SECS")]
    shutdown_grace_secs: Option<u64>,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "METRICS_ADDRESS")]
    metrics_address: Option<String>,
}

impl From<Cli> for ConfigOverrides {
    fn from(cli: Cli) -> Self {
        Self {
            config_file: cli.config,
            listen_address: cli.listen_address,
            log_level: cli.log_level,
            log_format: cli.log_format,
            tool_path: cli.rembg_path,
            tool_timeout_secs: cli.tool_timeout_secs,
            shutdown_grace_secs: cli.shutdown_grace_secs,
            metrics_address: cli.metrics_address,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let overrides = ConfigOverrides::from(Cli::parse());

    let config = match load_config(&overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rembg-gateway: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability);

    tracing::info!("rembg-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        listen_address = ?config.listener.bind_address,
        tool = %config.pipeline.tool_path.display(),
        tool_timeout_secs = config.pipeline.timeout_secs,
        grace_period_secs = config.shutdown.grace_period_secs,
        "Configuration loaded"
    );

    if let Some(addr) = &config.observability.metrics_address {
        // Validation already checked the format.
        if let Ok(addr) = addr.parse::<SocketAddr>() {
            metrics::init_metrics(addr);
        }
    }

    let remover = Arc::new(RembgCommand::from_config(&config.pipeline));

    match Service::new(config, remover).run().await {
        Ok(report) => {
            if report.drain == DrainOutcome::TimedOut {
                tracing::warn!(cause = %report.cause, "Stopped after grace period expired");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e.chain(), "Service stopped with an error");
            ExitCode::FAILURE
        }
    }
}
