use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use gatekeeper_models::config::GatekeeperConfig;
use gatekeeper_store::CommandMailbox;
use gatekeeper_supervisor::{AppState, Broadcaster, JournalFeed, SupervisorServer};

#[derive(Parser, Debug)]
#[command(
    name = "gatekeeper-supervisor",
    about = "Gatekeeper supervisor - observe the decision loop and steer it through the command mailbox"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/gatekeeper.toml")]
    config: String,

    /// Override [supervisor].bind_addr
    #[arg(long)]
    bind: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
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
    let supervisor = &config.supervisor;

    let bind = cli.bind.unwrap_or_else(|| supervisor.bind_addr.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {bind}"))?;

    let mailbox = CommandMailbox::open(&config.paths.mailbox_dir)
        .with_context(|| format!("Failed to open mailbox: {}", config.paths.mailbox_dir))?;
    let broadcaster = Arc::new(Broadcaster::new(
        supervisor.recent_activity_capacity,
        supervisor.broadcast_capacity,
    ));

    let cancel = CancellationToken::new();
    let feed = JournalFeed::new(
        config.paths.journal_path.clone(),
        broadcaster.clone(),
        supervisor.recent_activity_capacity,
    );
    let feed_task = tokio::spawn(feed.run(
        Duration::from_millis(supervisor.poll_interval_ms.max(1)),
        cancel.clone(),
    ));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        shutdown.cancel();
    });

    let server = SupervisorServer::new(AppState {
        mailbox,
        broadcaster,
        heartbeat: Duration::from_secs(supervisor.heartbeat_seconds.max(1)),
    });
    let served = server.serve(addr, cancel.clone()).await;
    cancel.cancel();
    let _ = feed_task.await;

    served.with_context(|| format!("Supervisor failed on {addr}"))
}
