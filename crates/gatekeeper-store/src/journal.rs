use std::path::Path;

use chrono::{DateTime, Utc};
use gatekeeper_models::activity::{ActivityEntry, ActivityEvent};
use gatekeeper_models::decision::Decision;
use gatekeeper_models::journal_schema::JOURNAL_DDL;
use gatekeeper_models::state::OperationalState;
use rusqlite::{Connection, OptionalExtension};

use crate::error::StoreError;

/// Read-write journal owned by the decision loop.
///
/// Opened in WAL mode so the supervisor's read-only connection can tail it
/// while the loop keeps writing. There is exactly one writer.
pub struct JournalWriter {
    conn: Connection,
}

impl JournalWriter {
    /// Open (or create) the journal. Creates the schema and enables WAL.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(JOURNAL_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    /// Open an in-memory journal for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(JOURNAL_DDL)?;
        Ok(Self { conn })
    }

    /// The persisted operational state, if the loop has ever saved one.
    pub fn load_state(&self) -> Result<Option<OperationalState>, StoreError> {
        load_state(&self.conn)
    }

    /// Persist a state mutation together with the activity describing it.
    /// Both land in one transaction or neither does.
    pub fn commit(
        &mut self,
        state: &OperationalState,
        events: &[ActivityEvent],
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO operational_state (id, state_json, version, updated_at) \
             VALUES (1, ?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET state_json = ?1, version = ?2, updated_at = ?3",
            rusqlite::params![
                serde_json::to_string(state)?,
                state.version as i64,
                state.last_updated.to_rfc3339(),
            ],
        )?;
        let mut entries = Vec::with_capacity(events.len());
        for event in events {
            entries.push(insert_activity(&tx, event)?);
        }
        tx.commit()?;
        Ok(entries)
    }

    /// Append one activity entry.
    pub fn append(&self, event: &ActivityEvent) -> Result<ActivityEntry, StoreError> {
        insert_activity(&self.conn, event)
    }

    pub fn activity_count(&self) -> Result<usize, StoreError> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM activity", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>, StoreError> {
        recent_activity(&self.conn, limit)
    }
}

/// Read-only view of the journal, used by the supervisory process.
pub struct JournalReader {
    conn: Connection,
}

impl JournalReader {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn load_state(&self) -> Result<Option<OperationalState>, StoreError> {
        load_state(&self.conn)
    }

    /// Entries strictly after `after_seq`, oldest first.
    pub fn activity_since(
        &self,
        after_seq: i64,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT seq, payload_json, recorded_at FROM activity \
             WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![after_seq, limit as i64], raw_activity)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(decode_activity).collect()
    }

    /// The last `limit` entries, oldest first.
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>, StoreError> {
        recent_activity(&self.conn, limit)
    }

    /// Most recent decisions, newest first, optionally for one instrument.
    pub fn recent_decisions(
        &self,
        instrument: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Decision>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT seq, payload_json, recorded_at FROM activity \
             WHERE kind = 'decision_recorded' AND (?1 IS NULL OR instrument = ?1) \
             ORDER BY seq DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![instrument, limit as i64], raw_activity)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut decisions = Vec::with_capacity(rows.len());
        for row in rows {
            if let ActivityEvent::DecisionRecorded { decision } = decode_activity(row)?.event {
                decisions.push(decision);
            }
        }
        Ok(decisions)
    }

    /// Highest sequence number written so far, 0 for an empty journal.
    pub fn last_seq(&self) -> Result<i64, StoreError> {
        let seq: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM activity", [], |row| row.get(0))?;
        Ok(seq.unwrap_or(0))
    }
}

type RawActivity = (i64, String, String);

fn raw_activity(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawActivity> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode_activity((seq, payload, recorded_at): RawActivity) -> Result<ActivityEntry, StoreError> {
    let event: ActivityEvent = serde_json::from_str(&payload)
        .map_err(|e| StoreError::Corrupt(format!("activity {seq}: {e}")))?;
    Ok(ActivityEntry {
        seq,
        recorded_at: parse_timestamp(&recorded_at)?,
        event,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

fn event_instrument(event: &ActivityEvent) -> Option<&str> {
    match event {
        ActivityEvent::DecisionRecorded { decision } => Some(&decision.instrument),
        ActivityEvent::InstrumentSkipped { instrument, .. }
        | ActivityEvent::ExecutionFailed { instrument, .. }
        | ActivityEvent::ExecutionSkipped { instrument, .. } => Some(instrument),
        _ => None,
    }
}

fn insert_activity(conn: &Connection, event: &ActivityEvent) -> Result<ActivityEntry, StoreError> {
    let recorded_at = Utc::now();
    conn.execute(
        "INSERT INTO activity (kind, instrument, payload_json, recorded_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            event.label(),
            event_instrument(event),
            serde_json::to_string(event)?,
            recorded_at.to_rfc3339(),
        ],
    )?;
    Ok(ActivityEntry {
        seq: conn.last_insert_rowid(),
        recorded_at,
        event: event.clone(),
    })
}

fn load_state(conn: &Connection) -> Result<Option<OperationalState>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT state_json FROM operational_state WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|json| {
        serde_json::from_str(&json)
            .map_err(|e| StoreError::Corrupt(format!("operational state: {e}")))
    })
    .transpose()
}

fn recent_activity(conn: &Connection, limit: usize) -> Result<Vec<ActivityEntry>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT seq, payload_json, recorded_at FROM \
         (SELECT seq, payload_json, recorded_at FROM activity ORDER BY seq DESC LIMIT ?1) \
         ORDER BY seq ASC",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![limit as i64], raw_activity)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode_activity).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_models::activity::LifecycleEvent;
    use gatekeeper_models::decision::{FreshnessReport, FreshnessVerdict, RejectionReason};
    use gatekeeper_models::state::Mode;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn decision(instrument: &str) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            accepted: false,
            prediction_value: dec!(0.5),
            score: None,
            threshold: None,
            freshness: FreshnessReport {
                verdict: FreshnessVerdict::Stale,
                score: 0.0,
                age_ms: Some(45_000),
                latency_ms: Some(80),
                delayed: false,
                slow: false,
            },
            mode: Mode::Standby,
            rejection: Some(RejectionReason::Stale),
            decided_at: Utc::now(),
        }
    }

    fn started() -> ActivityEvent {
        ActivityEvent::Lifecycle {
            event: LifecycleEvent::EngineStarted,
            detail: None,
        }
    }

    #[test]
    fn empty_journal_has_no_state() {
        let journal = JournalWriter::open_in_memory().unwrap();
        assert!(journal.load_state().unwrap().is_none());
        assert_eq!(journal.activity_count().unwrap(), 0);
    }

    #[test]
    fn commit_persists_state_and_events() {
        let mut journal = JournalWriter::open_in_memory().unwrap();
        let mut state = OperationalState::default();
        state.active_instruments.insert("BTC".to_string());
        state.touch(Utc::now());

        let entries = journal
            .commit(
                &state,
                &[ActivityEvent::InstrumentSetChanged {
                    active_instruments: state.active_instruments.clone(),
                    command_id: Some("c-1".to_string()),
                }],
            )
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].seq, 1);

        let loaded = journal.load_state().unwrap().unwrap();
        assert_eq!(loaded, state);

        state.mode = Mode::Active;
        state.touch(Utc::now());
        journal.commit(&state, &[]).unwrap();
        assert_eq!(journal.load_state().unwrap().unwrap().mode, Mode::Active);
    }

    #[test]
    fn corrupt_state_is_reported() {
        let journal = JournalWriter::open_in_memory().unwrap();
        journal
            .conn
            .execute(
                "INSERT INTO operational_state (id, state_json, version, updated_at) \
                 VALUES (1, '{not json', 1, '2025-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        assert!(matches!(journal.load_state(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn recent_activity_is_bounded_and_ordered() {
        let journal = JournalWriter::open_in_memory().unwrap();
        for _ in 0..5 {
            journal.append(&started()).unwrap();
        }
        let recent = journal.recent_activity(3).unwrap();
        let seqs: Vec<i64> = recent.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn reader_tails_writer_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let path = path.to_str().unwrap();

        let mut writer = JournalWriter::open(path).unwrap();
        writer.append(&started()).unwrap();

        let reader = JournalReader::open(path).unwrap();
        assert_eq!(reader.last_seq().unwrap(), 1);
        assert!(reader.load_state().unwrap().is_none());

        writer
            .commit(
                &OperationalState::default(),
                &[
                    ActivityEvent::DecisionRecorded {
                        decision: decision("BTC"),
                    },
                    ActivityEvent::DecisionRecorded {
                        decision: decision("ETH"),
                    },
                ],
            )
            .unwrap();

        let tail = reader.activity_since(1, 100).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].seq, 2);
        assert!(reader.load_state().unwrap().is_some());

        let eth = reader.recent_decisions(Some("ETH"), 10).unwrap();
        assert_eq!(eth.len(), 1);
        assert_eq!(eth[0].instrument, "ETH");
        assert_eq!(reader.recent_decisions(None, 10).unwrap().len(), 2);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.db");
        JournalWriter::open(path.to_str().unwrap()).unwrap();
        assert!(path.exists());
    }
}
