use std::sync::Arc;
use std::time::Duration;

use gatekeeper_models::activity::ActivityEntry;
use gatekeeper_models::state::OperationalState;
use gatekeeper_store::{JournalReader, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;

/// Entries pulled from the journal per poll.
const BATCH: usize = 500;

/// Read-only tail of the decision loop's journal.
///
/// The journal may not exist yet when the supervisor starts, and the reader
/// is dropped after any error, so both cases are retried on the next poll.
pub struct JournalFeed {
    path: String,
    reader: Option<JournalReader>,
    broadcaster: Arc<Broadcaster>,
    recent_capacity: usize,
}

impl JournalFeed {
    pub fn new(path: impl Into<String>, broadcaster: Arc<Broadcaster>, recent_capacity: usize) -> Self {
        Self {
            path: path.into(),
            reader: None,
            broadcaster,
            recent_capacity,
        }
    }

    /// Pull anything new from the journal into the broadcaster. Returns how
    /// many entries were published.
    pub async fn poll(&mut self) -> Result<usize, StoreError> {
        if self.reader.is_none() {
            self.attach().await?;
        }
        let after_seq = self.broadcaster.last_seq().await;
        let Some(reader) = self.reader.as_ref() else {
            return Ok(0);
        };

        let (state, entries) = match read_new(reader, after_seq) {
            Ok(batch) => batch,
            Err(e) => {
                self.reader = None;
                return Err(e);
            }
        };
        let published = entries.len();
        if published > 0 {
            debug!(entries = published, "Publishing journal activity");
            self.broadcaster.publish(state, entries).await;
        }
        Ok(published)
    }

    async fn attach(&mut self) -> Result<(), StoreError> {
        let reader = JournalReader::open(&self.path)?;
        let state = reader.load_state()?.unwrap_or_default();
        let recent = reader.recent_activity(self.recent_capacity)?;
        let last_seq = reader.last_seq()?;
        info!(path = %self.path, last_seq, "Attached to journal");
        self.broadcaster.reset(state, recent, last_seq).await;
        self.reader = Some(reader);
        Ok(())
    }

    /// Poll every `interval` until cancelled.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut failing = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.poll().await {
                Ok(_) => failing = false,
                Err(e) => {
                    // Log once per outage rather than every tick.
                    if !failing {
                        warn!(path = %self.path, error = %e, "Journal not readable, retrying");
                    }
                    failing = true;
                }
            }
        }
        debug!("Journal feed stopped");
    }
}

type Batch = (Option<OperationalState>, Vec<ActivityEntry>);

fn read_new(reader: &JournalReader, after_seq: i64) -> Result<Batch, StoreError> {
    let entries = reader.activity_since(after_seq, BATCH)?;
    if entries.is_empty() {
        return Ok((None, entries));
    }
    Ok((reader.load_state()?, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_models::activity::{ActivityEvent, BroadcastMessage, LifecycleEvent};
    use gatekeeper_models::state::Mode;
    use gatekeeper_store::JournalWriter;

    fn lifecycle() -> ActivityEvent {
        ActivityEvent::Lifecycle {
            event: LifecycleEvent::EngineStarted,
            detail: None,
        }
    }

    #[tokio::test]
    async fn missing_journal_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let path = path.to_str().unwrap().to_string();
        let broadcaster = Arc::new(Broadcaster::new(10, 16));
        let mut feed = JournalFeed::new(path.clone(), broadcaster.clone(), 10);

        assert!(feed.poll().await.is_err());

        let writer = JournalWriter::open(&path).unwrap();
        writer.append(&lifecycle()).unwrap();
        assert_eq!(feed.poll().await.unwrap(), 0);
        assert_eq!(broadcaster.last_seq().await, 1);

        writer.append(&lifecycle()).unwrap();
        assert_eq!(feed.poll().await.unwrap(), 1);
        assert_eq!(broadcaster.last_seq().await, 2);
    }

    #[tokio::test]
    async fn state_changes_reach_observers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let path = path.to_str().unwrap().to_string();
        let mut writer = JournalWriter::open(&path).unwrap();

        let broadcaster = Arc::new(Broadcaster::new(10, 16));
        let mut feed = JournalFeed::new(path, broadcaster.clone(), 10);
        feed.poll().await.unwrap();
        let mut rx = broadcaster.subscribe();

        let mut state = OperationalState::default();
        state.mode = Mode::Active;
        state.active_instruments.insert("BTC-USD".to_string());
        state.version = 1;
        writer
            .commit(
                &state,
                &[ActivityEvent::ModeChanged {
                    from: Mode::Standby,
                    to: Mode::Active,
                    command_id: None,
                }],
            )
            .unwrap();

        assert_eq!(feed.poll().await.unwrap(), 1);
        assert!(matches!(
            rx.recv().await.unwrap(),
            BroadcastMessage::ModeUpdate { mode: Mode::Active, .. }
        ));
        assert_eq!(broadcaster.state().await, state);
    }
}
