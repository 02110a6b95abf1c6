use std::collections::VecDeque;

use chrono::Utc;
use gatekeeper_models::activity::{ActivityEntry, BroadcastMessage};
use gatekeeper_models::state::OperationalState;
use tokio::sync::{broadcast, RwLock};

struct Mirror {
    state: OperationalState,
    recent: VecDeque<ActivityEntry>,
    last_seq: i64,
}

/// Fan-out of journal activity to connected observers.
///
/// Keeps the latest OperationalState and a bounded ring of recent entries so
/// a new or lagging observer can be brought up to date with one snapshot.
/// Delivery is best-effort: publishing with nobody subscribed is not an error.
pub struct Broadcaster {
    tx: broadcast::Sender<BroadcastMessage>,
    mirror: RwLock<Mirror>,
    capacity: usize,
}

impl Broadcaster {
    pub fn new(recent_capacity: usize, channel_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            tx,
            mirror: RwLock::new(Mirror {
                state: OperationalState::default(),
                recent: VecDeque::with_capacity(recent_capacity),
                last_seq: 0,
            }),
            capacity: recent_capacity,
        }
    }

    /// Subscribe before taking a snapshot so nothing published in between is lost.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub async fn last_seq(&self) -> i64 {
        self.mirror.read().await.last_seq
    }

    pub async fn state(&self) -> OperationalState {
        self.mirror.read().await.state.clone()
    }

    pub async fn snapshot(&self) -> BroadcastMessage {
        let mirror = self.mirror.read().await;
        BroadcastMessage::Snapshot {
            state: mirror.state.clone(),
            recent: mirror.recent.iter().cloned().collect(),
            last_seq: mirror.last_seq,
        }
    }

    /// Replace the mirror wholesale (journal opened or reopened) and push a
    /// snapshot to everyone.
    pub async fn reset(&self, state: OperationalState, recent: Vec<ActivityEntry>, last_seq: i64) {
        {
            let mut mirror = self.mirror.write().await;
            mirror.last_seq = last_seq;
            let skip = recent.len().saturating_sub(self.capacity);
            mirror.recent = recent.into_iter().skip(skip).collect();
            mirror.state = state;
        }
        let snapshot = self.snapshot().await;
        let _ = self.tx.send(snapshot);
    }

    /// Record new journal entries and push one incremental message per entry.
    /// Entries at or below the last seen sequence are ignored.
    pub async fn publish(&self, state: Option<OperationalState>, entries: Vec<ActivityEntry>) {
        let mut fresh = Vec::with_capacity(entries.len());
        {
            let mut mirror = self.mirror.write().await;
            if let Some(state) = state {
                mirror.state = state;
            }
            for entry in entries {
                if entry.seq <= mirror.last_seq {
                    continue;
                }
                mirror.last_seq = entry.seq;
                if self.capacity > 0 {
                    if mirror.recent.len() == self.capacity {
                        mirror.recent.pop_front();
                    }
                    mirror.recent.push_back(entry.clone());
                }
                fresh.push(entry);
            }
        }

        for entry in &fresh {
            // Err only means no observer is connected right now.
            let _ = self.tx.send(BroadcastMessage::from(entry));
        }
    }

    pub fn heartbeat() -> BroadcastMessage {
        BroadcastMessage::Heartbeat { at: Utc::now() }
    }
}
