//! Gatekeeper - decides, per monitoring cycle and instrument, whether a
//! predicted trade may execute.
//!
//! The decision loop (`gatekeeper-engine`) and the supervisor
//! (`gatekeeper-supervisor`) run as separate processes and only meet through
//! the command mailbox and the journal. This crate re-exports the pieces and
//! carries the helpers behind `gatekeeperctl`.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use gatekeeper::models::command::CommandKind;
//! use gatekeeper::store::CommandMailbox;
//!
//! let mailbox = CommandMailbox::open("data/mailbox").unwrap();
//! let record = gatekeeper::submit(&mailbox, CommandKind::ActivateMonitoring, serde_json::Value::Null).unwrap();
//! println!("queued {}", record.id);
//! ```

pub use gatekeeper_engine as engine;
pub use gatekeeper_models as models;
pub use gatekeeper_opinions as opinions;
pub use gatekeeper_store as store;
pub use gatekeeper_supervisor as supervisor;

use chrono::Utc;
use gatekeeper_models::command::{CommandKind, CommandRecord, ControlInstruction};
use gatekeeper_store::{CommandMailbox, JournalReader};

/// Validate a command's payload and drop it in the mailbox's pending area.
///
/// Invalid payloads are refused here instead of being quarantined later by
/// the decision loop.
pub fn submit(
    mailbox: &CommandMailbox,
    kind: CommandKind,
    payload: serde_json::Value,
) -> Result<CommandRecord, anyhow::Error> {
    let candidate = CommandRecord {
        id: String::new(),
        kind,
        payload: payload.clone(),
        created_at: Utc::now(),
        outcome: None,
    };
    ControlInstruction::from_record(&candidate)?;
    Ok(mailbox.enqueue(kind, payload)?)
}

/// Payload for a batch instrument update.
pub fn batch_payload(activate: &[String], deactivate: &[String]) -> serde_json::Value {
    serde_json::json!({ "activate": activate, "deactivate": deactivate })
}

pub fn instrument_payload(instrument: &str) -> serde_json::Value {
    serde_json::json!({ "instrument": instrument })
}

pub fn instrument_set_payload(instruments: &[String]) -> serde_json::Value {
    serde_json::json!({ "instruments": instruments })
}

/// Read-only view of the journal for inspection tools.
pub fn open_journal(path: &str) -> Result<JournalReader, anyhow::Error> {
    JournalReader::open(path).map_err(|e| anyhow::anyhow!("Failed to open journal {path}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_store::PendingCommand;

    #[test]
    fn submit_validates_before_enqueue() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = CommandMailbox::open(dir.path()).unwrap();

        assert!(submit(
            &mailbox,
            CommandKind::BatchUpdateInstruments,
            batch_payload(&["BTC".to_string()], &["BTC".to_string()]),
        )
        .is_err());
        assert!(mailbox.pending().unwrap().is_empty());

        let record = submit(
            &mailbox,
            CommandKind::UpdateInstrumentSet,
            instrument_set_payload(&["BTC".to_string(), "ETH".to_string()]),
        )
        .unwrap();
        let pending = mailbox.pending().unwrap();
        assert_eq!(pending.len(), 1);
        match &pending[0] {
            PendingCommand::Ready(ready) => assert_eq!(ready.record.id, record.id),
            PendingCommand::Malformed(m) => panic!("malformed: {}", m.error),
        }
    }

    #[test]
    fn payload_shapes() {
        assert_eq!(instrument_payload("SOL")["instrument"], "SOL");
        let batch = batch_payload(&["A".to_string()], &[]);
        assert_eq!(batch["activate"][0], "A");
        assert!(batch["deactivate"].as_array().unwrap().is_empty());
    }
}
