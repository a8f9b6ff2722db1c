//! Coinpetitive daemon: entry point for serving the challenge API.

mod config;

use clap::Parser;
use config::DaemonConfig;
use cpt_engine::ChallengeEngine;
use cpt_nullables::{NullLedger, NullStore};
use cpt_rpc::{RpcServer, StaticTokens};
use cpt_types::SystemClock;
use cpt_utils::LogFormat;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cpt-daemon", about = "Coinpetitive challenge engine daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "CPT_CONFIG")]
    config: Option<PathBuf>,

    /// Address the HTTP API binds to.
    #[arg(long, env = "CPT_BIND")]
    bind: Option<SocketAddr>,

    /// Log format: "human" or "json".
    #[arg(long, env = "CPT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "CPT_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the API server until Ctrl-C.
    Serve {
        /// Serve from the in-memory store and ledger. Fees confirm at once
        /// and all state is lost on exit.
        #[arg(long)]
        in_memory: bool,
    },
    /// Print the effective configuration as TOML.
    PrintConfig,
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::from_toml_file(path)?,
            None => DaemonConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    match cli.command {
        Command::PrintConfig => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Serve { in_memory } => {
            require_in_memory(in_memory)?;
            cpt_utils::init_logging(config.log_format, &config.log_level);
            if let Some(path) = &cli.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            serve(config).await?;
        }
    }

    Ok(())
}

/// Only in-memory collaborators are built in, so serving needs the caller
/// to opt into them.
fn require_in_memory(in_memory: bool) -> anyhow::Result<()> {
    if !in_memory {
        anyhow::bail!(
            "no persistent record store or value ledger is available; \
             pass --in-memory to serve from process memory"
        );
    }
    Ok(())
}

async fn serve(config: DaemonConfig) -> anyhow::Result<()> {
    tracing::warn!(
        "serving from the in-memory store and ledger: fees confirm immediately \
         and all state is lost on exit"
    );
    if config.tokens.is_empty() {
        tracing::warn!("no API tokens configured; every authenticated route will answer 401");
    }

    // In-memory collaborators: state lives for the lifetime of the process.
    let engine = Arc::new(ChallengeEngine::new(
        Arc::new(NullStore::new()),
        Arc::new(NullLedger::new()),
        Arc::new(SystemClock),
        config.engine.clone(),
    ));
    let tokens = StaticTokens::new(config.tokens.into_iter().collect());
    tracing::info!(
        bind = %config.bind,
        tokens = tokens.len(),
        report_threshold = config.engine.report_threshold,
        "Starting challenge API"
    );

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    RpcServer::new(engine, Arc::new(tokens))
        .serve(listener, shutdown_signal())
        .await?;

    tracing::info!("cpt daemon exited cleanly");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received, stopping server"),
        Err(e) => tracing::error!(error = %e, "cannot listen for Ctrl-C; stopping server"),
    }
}
