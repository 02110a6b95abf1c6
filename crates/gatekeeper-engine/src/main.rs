use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gatekeeper_engine::sources::{build_execution, HttpPredictionSource};
use gatekeeper_engine::{Collaborators, DecisionLoop};
use gatekeeper_models::config::GatekeeperConfig;
use gatekeeper_opinions::build_sources;
use gatekeeper_store::{CommandMailbox, JournalWriter, SqliteTradeHistory};

#[derive(Parser, Debug)]
#[command(
    name = "gatekeeper-engine",
    about = "Gatekeeper decision loop - validates predictions and decides which trades execute"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/gatekeeper.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = GatekeeperConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;

    let journal = JournalWriter::open(&config.paths.journal_path)
        .with_context(|| format!("Failed to open journal: {}", config.paths.journal_path))?;
    let mailbox = CommandMailbox::open(&config.paths.mailbox_dir)
        .with_context(|| format!("Failed to open mailbox: {}", config.paths.mailbox_dir))?;

    let timeout = Duration::from_millis(config.network.request_timeout_ms);
    let collaborators = Collaborators {
        predictions: Arc::new(
            HttpPredictionSource::new(&config.prediction_source.base_url, timeout)
                .context("Failed to build prediction client")?,
        ),
        opinions: build_sources(&config.validation, &config.network)
            .context("Failed to build opinion sources")?,
        history: Arc::new(SqliteTradeHistory::open(
            &config.paths.history_path,
            config.history.memory_max_capacity,
            Duration::from_secs(config.history.memory_ttl_seconds),
        )),
        execution: build_execution(&config.execution, timeout)
            .context("Failed to build execution client")?,
    };

    let mut decision_loop = DecisionLoop::new(config, journal, mailbox, collaborators)
        .context("Failed to restore decision loop state")?;

    if cli.once {
        let report = decision_loop
            .run_cycle()
            .await
            .map_err(|e| anyhow::anyhow!("Cycle failed: {e}"))?;
        tracing::info!(
            decisions = report.decisions().count(),
            accepted = report.accepted(),
            "Single cycle finished"
        );
        return Ok(());
    }

    let cancel = decision_loop.cancel_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        cancel.cancel();
    });

    decision_loop
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Decision loop error: {e}"))?;

    Ok(())
}
