use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::{CommandKind, CommandStatus};
use crate::decision::Decision;
use crate::state::{Mode, OperationalState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    EngineStarted,
    EngineStopped,
    /// The last active instrument was removed while ACTIVE.
    AutoStandby,
}

/// Something the decision loop did, as recorded in the journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityEvent {
    ModeChanged {
        from: Mode,
        to: Mode,
        command_id: Option<String>,
    },
    InstrumentSetChanged {
        active_instruments: BTreeSet<String>,
        command_id: Option<String>,
    },
    DecisionRecorded {
        decision: Decision,
    },
    InstrumentSkipped {
        instrument: String,
        reason: String,
    },
    CommandCompleted {
        command_id: String,
        command_kind: Option<CommandKind>,
        status: CommandStatus,
        error: Option<String>,
    },
    ExecutionFailed {
        decision_id: Uuid,
        instrument: String,
        error: String,
    },
    /// Accepted, but the order would have had no size.
    ExecutionSkipped {
        decision_id: Uuid,
        instrument: String,
        reason: String,
    },
    Lifecycle {
        event: LifecycleEvent,
        detail: Option<String>,
    },
}

impl ActivityEvent {
    /// Stable label stored next to the payload in the journal.
    pub fn label(&self) -> &'static str {
        match self {
            ActivityEvent::ModeChanged { .. } => "mode_changed",
            ActivityEvent::InstrumentSetChanged { .. } => "instrument_set_changed",
            ActivityEvent::DecisionRecorded { .. } => "decision_recorded",
            ActivityEvent::InstrumentSkipped { .. } => "instrument_skipped",
            ActivityEvent::CommandCompleted { .. } => "command_completed",
            ActivityEvent::ExecutionFailed { .. } => "execution_failed",
            ActivityEvent::ExecutionSkipped { .. } => "execution_skipped",
            ActivityEvent::Lifecycle { .. } => "lifecycle",
        }
    }
}

/// A journaled activity with its position in the append-only log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    pub seq: i64,
    pub recorded_at: DateTime<Utc>,
    pub event: ActivityEvent,
}

/// Server-to-observer message on the broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BroadcastMessage {
    Snapshot {
        state: OperationalState,
        recent: Vec<ActivityEntry>,
        /// Highest journal sequence the snapshot covers. Pushes at or below
        /// it are already reflected.
        last_seq: i64,
    },
    ModeUpdate {
        seq: i64,
        mode: Mode,
        previous: Mode,
        at: DateTime<Utc>,
    },
    InstrumentSetUpdate {
        seq: i64,
        active_instruments: BTreeSet<String>,
        at: DateTime<Utc>,
    },
    DecisionRecorded {
        seq: i64,
        decision: Decision,
    },
    Activity {
        entry: ActivityEntry,
    },
    Heartbeat {
        at: DateTime<Utc>,
    },
}

impl BroadcastMessage {
    /// Journal sequence of an incremental push. `None` for snapshots and heartbeats.
    pub fn seq(&self) -> Option<i64> {
        match self {
            BroadcastMessage::ModeUpdate { seq, .. }
            | BroadcastMessage::InstrumentSetUpdate { seq, .. }
            | BroadcastMessage::DecisionRecorded { seq, .. } => Some(*seq),
            BroadcastMessage::Activity { entry } => Some(entry.seq),
            BroadcastMessage::Snapshot { .. } | BroadcastMessage::Heartbeat { .. } => None,
        }
    }
}

impl From<&ActivityEntry> for BroadcastMessage {
    fn from(entry: &ActivityEntry) -> Self {
        match &entry.event {
            ActivityEvent::ModeChanged { from, to, .. } => BroadcastMessage::ModeUpdate {
                seq: entry.seq,
                mode: *to,
                previous: *from,
                at: entry.recorded_at,
            },
            ActivityEvent::InstrumentSetChanged {
                active_instruments, ..
            } => BroadcastMessage::InstrumentSetUpdate {
                seq: entry.seq,
                active_instruments: active_instruments.clone(),
                at: entry.recorded_at,
            },
            ActivityEvent::DecisionRecorded { decision } => BroadcastMessage::DecisionRecorded {
                seq: entry.seq,
                decision: decision.clone(),
            },
            _ => BroadcastMessage::Activity {
                entry: entry.clone(),
            },
        }
    }
}

/// Observer-to-server request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverRequest {
    Resync,
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(event: ActivityEvent) -> ActivityEntry {
        ActivityEntry {
            seq: 42,
            recorded_at: Utc::now(),
            event,
        }
    }

    #[test]
    fn mode_change_maps_to_mode_update() {
        let e = entry(ActivityEvent::ModeChanged {
            from: Mode::Standby,
            to: Mode::Active,
            command_id: Some("c1".to_string()),
        });
        match BroadcastMessage::from(&e) {
            BroadcastMessage::ModeUpdate {
                seq,
                mode,
                previous,
                ..
            } => {
                assert_eq!(seq, 42);
                assert_eq!(mode, Mode::Active);
                assert_eq!(previous, Mode::Standby);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lifecycle_maps_to_activity() {
        let e = entry(ActivityEvent::Lifecycle {
            event: LifecycleEvent::EngineStarted,
            detail: None,
        });
        let msg = BroadcastMessage::from(&e);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "activity");
        assert_eq!(json["entry"]["event"]["kind"], "lifecycle");
    }

    #[test]
    fn pushes_carry_their_sequence() {
        let e = entry(ActivityEvent::InstrumentSkipped {
            instrument: "BTC".to_string(),
            reason: "no prediction".to_string(),
        });
        assert_eq!(BroadcastMessage::from(&e).seq(), Some(42));
        assert_eq!(BroadcastMessage::Heartbeat { at: Utc::now() }.seq(), None);
    }

    #[test]
    fn heartbeat_wire_format() {
        let json = serde_json::to_value(BroadcastMessage::Heartbeat { at: Utc::now() }).unwrap();
        assert_eq!(json["kind"], "heartbeat");
    }

    #[test]
    fn observer_requests() {
        let r: ObserverRequest = serde_json::from_str(r#"{"type":"resync"}"#).unwrap();
        assert_eq!(r, ObserverRequest::Resync);
        assert!(serde_json::from_str::<ObserverRequest>(r#"{"type":"nope"}"#).is_err());
    }

    #[test]
    fn labels_match_serde_tags() {
        let e = ActivityEvent::InstrumentSkipped {
            instrument: "BTC".to_string(),
            reason: "no prediction".to_string(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], e.label());
    }
}
