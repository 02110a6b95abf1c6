use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use gatekeeper_models::activity::{ActivityEvent, LifecycleEvent};
use gatekeeper_models::command::{CommandError, ControlInstruction};
use gatekeeper_models::state::{Mode, OperationalState};

/// Effect of one applied instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Empty when the instruction was already satisfied.
    pub events: Vec<ActivityEvent>,
    pub detail: String,
}

impl Applied {
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Apply a control instruction to the operational state.
///
/// `Err` leaves `state` untouched. Instructions that are already satisfied
/// succeed without producing events, so replaying a command is harmless.
/// ACTIVE never survives an empty active set: removing the last instrument
/// drops the mode to STANDBY.
pub fn apply(
    state: &mut OperationalState,
    instruction: &ControlInstruction,
    command_id: &str,
    now: DateTime<Utc>,
) -> Result<Applied, CommandError> {
    let command_id = Some(command_id.to_string());
    let mut events = Vec::new();

    let detail = match instruction {
        ControlInstruction::ActivateMonitoring => {
            if state.mode == Mode::Active {
                "already ACTIVE".to_string()
            } else if state.active_instruments.is_empty() {
                return Err(CommandError::Rejected(
                    "cannot activate monitoring: no active instruments".to_string(),
                ));
            } else {
                state.mode = Mode::Active;
                events.push(ActivityEvent::ModeChanged {
                    from: Mode::Standby,
                    to: Mode::Active,
                    command_id: command_id.clone(),
                });
                "mode STANDBY -> ACTIVE".to_string()
            }
        }
        ControlInstruction::SetStandby => {
            if state.mode == Mode::Standby {
                "already STANDBY".to_string()
            } else {
                state.mode = Mode::Standby;
                events.push(ActivityEvent::ModeChanged {
                    from: Mode::Active,
                    to: Mode::Standby,
                    command_id: command_id.clone(),
                });
                "mode ACTIVE -> STANDBY".to_string()
            }
        }
        ControlInstruction::UpdateInstrumentSet(instruments) => {
            replace_set(state, instruments.clone(), &command_id, &mut events)
        }
        ControlInstruction::ActivateInstrument(instrument) => {
            let mut next = state.active_instruments.clone();
            next.insert(instrument.clone());
            replace_set(state, next, &command_id, &mut events)
        }
        ControlInstruction::DeactivateInstrument(instrument) => {
            let mut next = state.active_instruments.clone();
            next.remove(instrument);
            replace_set(state, next, &command_id, &mut events)
        }
        ControlInstruction::BatchUpdateInstruments {
            activate,
            deactivate,
        } => {
            let next = state
                .active_instruments
                .union(activate)
                .filter(|i| !deactivate.contains(*i))
                .cloned()
                .collect();
            replace_set(state, next, &command_id, &mut events)
        }
    };

    if state.mode == Mode::Active && state.active_instruments.is_empty() {
        state.mode = Mode::Standby;
        events.push(ActivityEvent::ModeChanged {
            from: Mode::Active,
            to: Mode::Standby,
            command_id: command_id.clone(),
        });
        events.push(ActivityEvent::Lifecycle {
            event: LifecycleEvent::AutoStandby,
            detail: Some("last active instrument removed".to_string()),
        });
    }

    if !events.is_empty() {
        state.touch(now);
    }
    Ok(Applied { events, detail })
}

fn replace_set(
    state: &mut OperationalState,
    next: BTreeSet<String>,
    command_id: &Option<String>,
    events: &mut Vec<ActivityEvent>,
) -> String {
    if next == state.active_instruments {
        return format!("active set unchanged ({} instruments)", next.len());
    }
    let added = next.difference(&state.active_instruments).count();
    let removed = state.active_instruments.difference(&next).count();
    state.active_instruments = next;
    events.push(ActivityEvent::InstrumentSetChanged {
        active_instruments: state.active_instruments.clone(),
        command_id: command_id.clone(),
    });
    format!("{added} added, {removed} removed")
}
