use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a control command did not take effect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Payload did not parse or failed validation.
    #[error("{0}")]
    Malformed(String),
    /// Well-formed, but refused by the current operational state.
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    ActivateMonitoring,
    SetStandby,
    UpdateInstrumentSet,
    ActivateInstrument,
    DeactivateInstrument,
    BatchUpdateInstruments,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::ActivateMonitoring => "ACTIVATE_MONITORING",
            CommandKind::SetStandby => "SET_STANDBY",
            CommandKind::UpdateInstrumentSet => "UPDATE_INSTRUMENT_SET",
            CommandKind::ActivateInstrument => "ACTIVATE_INSTRUMENT",
            CommandKind::DeactivateInstrument => "DEACTIVATE_INSTRUMENT",
            CommandKind::BatchUpdateInstruments => "BATCH_UPDATE_INSTRUMENTS",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Processed,
    Failed,
}

/// Terminal outcome stamped on a consumed command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandOutcome {
    pub status: CommandStatus,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One durable mailbox record: `{id, type, payload, created_at}` plus its outcome once consumed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CommandOutcome>,
}

/// A control instruction with a validated payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlInstruction {
    ActivateMonitoring,
    SetStandby,
    UpdateInstrumentSet(BTreeSet<String>),
    ActivateInstrument(String),
    DeactivateInstrument(String),
    BatchUpdateInstruments {
        activate: BTreeSet<String>,
        deactivate: BTreeSet<String>,
    },
}

#[derive(Deserialize)]
struct InstrumentPayload {
    instrument: String,
}

#[derive(Deserialize)]
struct InstrumentSetPayload {
    instruments: Vec<String>,
}

#[derive(Deserialize)]
struct BatchPayload {
    #[serde(default)]
    activate: Vec<String>,
    #[serde(default)]
    deactivate: Vec<String>,
}

fn instrument_id(raw: &str) -> Result<String, CommandError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(CommandError::Malformed(
            "instrument id must not be empty".to_string(),
        ));
    }
    Ok(id.to_string())
}

fn instrument_set(raw: &[String]) -> Result<BTreeSet<String>, CommandError> {
    raw.iter().map(|s| instrument_id(s)).collect()
}

fn payload<T: serde::de::DeserializeOwned>(record: &CommandRecord) -> Result<T, CommandError> {
    serde_json::from_value(record.payload.clone()).map_err(|e| {
        CommandError::Malformed(format!("malformed {} payload: {e}", record.kind.as_str()))
    })
}

impl ControlInstruction {
    /// Validate a record's payload against its type.
    pub fn from_record(record: &CommandRecord) -> Result<Self, CommandError> {
        match record.kind {
            CommandKind::ActivateMonitoring => Ok(Self::ActivateMonitoring),
            CommandKind::SetStandby => Ok(Self::SetStandby),
            CommandKind::UpdateInstrumentSet => {
                let p: InstrumentSetPayload = payload(record)?;
                Ok(Self::UpdateInstrumentSet(instrument_set(&p.instruments)?))
            }
            CommandKind::ActivateInstrument => {
                let p: InstrumentPayload = payload(record)?;
                Ok(Self::ActivateInstrument(instrument_id(&p.instrument)?))
            }
            CommandKind::DeactivateInstrument => {
                let p: InstrumentPayload = payload(record)?;
                Ok(Self::DeactivateInstrument(instrument_id(&p.instrument)?))
            }
            CommandKind::BatchUpdateInstruments => {
                let p: BatchPayload = payload(record)?;
                let activate = instrument_set(&p.activate)?;
                let deactivate = instrument_set(&p.deactivate)?;
                if let Some(both) = activate.intersection(&deactivate).next() {
                    return Err(CommandError::Malformed(format!(
                        "{both} is both activated and deactivated"
                    )));
                }
                Ok(Self::BatchUpdateInstruments {
                    activate,
                    deactivate,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: CommandKind, payload: serde_json::Value) -> CommandRecord {
        CommandRecord {
            id: "0000000000001-test".to_string(),
            kind,
            payload,
            created_at: Utc::now(),
            outcome: None,
        }
    }

    #[test]
    fn wire_format_uses_type_field() {
        let rec = record(
            CommandKind::ActivateInstrument,
            serde_json::json!({"instrument": "BTC"}),
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "ACTIVATE_INSTRUMENT");
        assert!(json.get("outcome").is_none());
    }

    #[test]
    fn parses_every_command_type() {
        let cases = vec![
            (CommandKind::ActivateMonitoring, serde_json::Value::Null),
            (CommandKind::SetStandby, serde_json::json!({})),
            (
                CommandKind::UpdateInstrumentSet,
                serde_json::json!({"instruments": ["BTC", " ETH "]}),
            ),
            (
                CommandKind::ActivateInstrument,
                serde_json::json!({"instrument": "SOL"}),
            ),
            (
                CommandKind::DeactivateInstrument,
                serde_json::json!({"instrument": "SOL"}),
            ),
            (
                CommandKind::BatchUpdateInstruments,
                serde_json::json!({"activate": ["BTC"], "deactivate": ["ETH"]}),
            ),
        ];
        for (kind, payload) in cases {
            assert!(
                ControlInstruction::from_record(&record(kind, payload)).is_ok(),
                "{kind:?} should parse"
            );
        }
    }

    #[test]
    fn instrument_ids_are_trimmed() {
        let rec = record(
            CommandKind::UpdateInstrumentSet,
            serde_json::json!({"instruments": [" ETH ", "BTC"]}),
        );
        let ControlInstruction::UpdateInstrumentSet(set) =
            ControlInstruction::from_record(&rec).unwrap()
        else {
            panic!("wrong instruction");
        };
        assert!(set.contains("ETH"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn missing_payload_field_is_malformed() {
        let rec = record(CommandKind::ActivateInstrument, serde_json::json!({}));
        let err = ControlInstruction::from_record(&rec).unwrap_err();
        assert!(matches!(&err, CommandError::Malformed(m) if m.contains("ACTIVATE_INSTRUMENT")));
    }

    #[test]
    fn empty_instrument_is_malformed() {
        let rec = record(
            CommandKind::DeactivateInstrument,
            serde_json::json!({"instrument": "  "}),
        );
        assert!(matches!(
            ControlInstruction::from_record(&rec),
            Err(CommandError::Malformed(_))
        ));
    }

    #[test]
    fn conflicting_batch_is_malformed() {
        let rec = record(
            CommandKind::BatchUpdateInstruments,
            serde_json::json!({"activate": ["BTC"], "deactivate": ["BTC"]}),
        );
        let err = ControlInstruction::from_record(&rec).unwrap_err();
        assert_eq!(
            err,
            CommandError::Malformed("BTC is both activated and deactivated".to_string())
        );
    }

    #[test]
    fn unknown_type_does_not_deserialize() {
        let json = r#"{"id":"x","type":"SELF_DESTRUCT","payload":{},"created_at":"2025-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<CommandRecord>(json).is_err());
    }
}
