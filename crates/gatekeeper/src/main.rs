use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gatekeeper::models::command::CommandKind;
use gatekeeper::models::config::GatekeeperConfig;
use gatekeeper::store::CommandMailbox;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "gatekeeperctl",
    about = "Issue commands to the gatekeeper decision loop and inspect its journal"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/gatekeeper.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Switch to ACTIVE (needs at least one active instrument)
    Activate,
    /// Switch to STANDBY
    Standby,
    /// Replace the active instrument set
    SetInstruments {
        #[arg(required = true)]
        instruments: Vec<String>,
    },
    ActivateInstrument {
        instrument: String,
    },
    DeactivateInstrument {
        instrument: String,
    },
    /// Activate and deactivate several instruments in one command
    Batch {
        #[arg(long, value_delimiter = ',')]
        activate: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        deactivate: Vec<String>,
    },
    /// Where a command is (pending, processed, failed)
    Status {
        id: String,
    },
    /// Operational state as last persisted by the decision loop
    State,
    /// Recent decisions, newest first
    History {
        #[arg(long)]
        instrument: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn print(value: &impl serde::Serialize, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GatekeeperConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;

    let issue = |kind: CommandKind, payload: Value| -> Result<()> {
        let mailbox = CommandMailbox::open(&config.paths.mailbox_dir)
            .with_context(|| format!("Failed to open mailbox: {}", config.paths.mailbox_dir))?;
        let record = gatekeeper::submit(&mailbox, kind, payload)
            .with_context(|| format!("Rejected {}", kind.as_str()))?;
        print(&record, cli.pretty)
    };

    match &cli.command {
        Command::Activate => issue(CommandKind::ActivateMonitoring, Value::Null),
        Command::Standby => issue(CommandKind::SetStandby, Value::Null),
        Command::SetInstruments { instruments } => issue(
            CommandKind::UpdateInstrumentSet,
            gatekeeper::instrument_set_payload(instruments),
        ),
        Command::ActivateInstrument { instrument } => issue(
            CommandKind::ActivateInstrument,
            gatekeeper::instrument_payload(instrument),
        ),
        Command::DeactivateInstrument { instrument } => issue(
            CommandKind::DeactivateInstrument,
            gatekeeper::instrument_payload(instrument),
        ),
        Command::Batch {
            activate,
            deactivate,
        } => issue(
            CommandKind::BatchUpdateInstruments,
            gatekeeper::batch_payload(activate, deactivate),
        ),
        Command::Status { id } => {
            let mailbox = CommandMailbox::new(&config.paths.mailbox_dir);
            let lookup = mailbox
                .status(id)?
                .with_context(|| format!("No command with id {id}"))?;
            print(&lookup, cli.pretty)
        }
        Command::State => {
            let journal = gatekeeper::open_journal(&config.paths.journal_path)?;
            let state = journal.load_state()?.unwrap_or_default();
            print(&state, cli.pretty)
        }
        Command::History { instrument, limit } => {
            let journal = gatekeeper::open_journal(&config.paths.journal_path)?;
            let decisions = journal.recent_decisions(instrument.as_deref(), *limit)?;
            print(&decisions, cli.pretty)
        }
    }
}
