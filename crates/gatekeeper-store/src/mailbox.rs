use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use gatekeeper_models::command::{CommandKind, CommandOutcome, CommandRecord, CommandStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;

const PENDING: &str = "pending";
const PROCESSED: &str = "processed";
const FAILED: &str = "failed";
const TMP: &str = "tmp";

/// Durable file-backed command mailbox.
///
/// Layout under `root`: `pending/`, `processed/`, `failed/`, one `<id>.json`
/// per command, plus `tmp/` for staging writes. Every file lands in its area
/// through write-to-tmp + fsync + rename, so readers never see partial
/// records. Records are never deleted from `processed/` or `failed/`.
///
/// The supervisory process is the only writer of `pending/`; the decision
/// loop is the only one that moves records out of it.
#[derive(Debug, Clone)]
pub struct CommandMailbox {
    root: PathBuf,
}

/// A pending record that parsed cleanly.
#[derive(Debug, Clone)]
pub struct ReadyCommand {
    pub path: PathBuf,
    pub record: CommandRecord,
}

/// A pending file that could not be read as a command record.
#[derive(Debug, Clone)]
pub struct MalformedCommand {
    pub path: PathBuf,
    pub id: String,
    pub raw: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub enum PendingCommand {
    Ready(ReadyCommand),
    Malformed(MalformedCommand),
}

impl PendingCommand {
    pub fn id(&self) -> &str {
        match self {
            PendingCommand::Ready(c) => &c.record.id,
            PendingCommand::Malformed(c) => &c.id,
        }
    }
}

/// Failed-area record for a file that never parsed; keeps the original text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantinedRecord {
    pub id: String,
    pub raw: String,
    pub outcome: CommandOutcome,
}

/// Where a command currently lives, with its stored record.
#[derive(Debug, Clone, Serialize)]
pub struct CommandLookup {
    pub status: CommandStatus,
    pub record: serde_json::Value,
}

impl CommandMailbox {
    /// Mailbox rooted at `root`. Nothing is created until first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Mailbox rooted at `root`, with all areas created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mailbox = Self::new(root);
        for area in [PENDING, PROCESSED, FAILED, TMP] {
            std::fs::create_dir_all(mailbox.root.join(area))?;
        }
        Ok(mailbox)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn area(&self, area: &str) -> PathBuf {
        self.root.join(area)
    }

    fn record_path(&self, area: &str, id: &str) -> PathBuf {
        self.area(area).join(format!("{id}.json"))
    }

    /// Persist a new command in the pending area and return it. Does not wait
    /// for processing.
    pub fn enqueue(
        &self,
        kind: CommandKind,
        payload: serde_json::Value,
    ) -> Result<CommandRecord, StoreError> {
        let created_at = Utc::now();
        // Millisecond prefix keeps a directory listing in creation order.
        let id = format!(
            "{:013}-{}",
            created_at.timestamp_millis().max(0),
            Uuid::new_v4().simple()
        );
        let record = CommandRecord {
            id,
            kind,
            payload,
            created_at,
            outcome: None,
        };
        self.write_atomic(PENDING, &record.id, &serde_json::to_vec_pretty(&record)?)?;
        debug!(id = %record.id, kind = kind.as_str(), "Enqueued command");
        Ok(record)
    }

    /// List the pending area in scan order.
    ///
    /// A missing pending area means no commands. Pending files whose id
    /// already has a terminal record are leftovers of an interrupted
    /// relocation; they are removed here and never returned.
    pub fn pending(&self) -> Result<Vec<PendingCommand>, StoreError> {
        let dir = match std::fs::read_dir(self.area(PENDING)) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut commands = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            if self.terminal_status(&id).is_some() {
                warn!(id = %id, "Pending command already settled, removing duplicate");
                remove_if_present(&path)?;
                continue;
            }

            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match serde_json::from_str::<CommandRecord>(&raw) {
                Ok(mut record) => {
                    if record.id != id {
                        warn!(file_id = %id, record_id = %record.id, "Command id differs from file name, using file name");
                        record.id = id;
                    }
                    commands.push(PendingCommand::Ready(ReadyCommand { path, record }));
                }
                Err(e) => commands.push(PendingCommand::Malformed(MalformedCommand {
                    path,
                    id,
                    raw,
                    error: format!("unreadable command record: {e}"),
                })),
            }
        }
        Ok(commands)
    }

    /// Stamp the outcome of an applied command and move it out of pending.
    ///
    /// `Ok(detail)` lands in `processed/`, `Err(error)` in `failed/`.
    pub fn complete(
        &self,
        command: ReadyCommand,
        result: Result<Option<String>, String>,
    ) -> Result<CommandRecord, StoreError> {
        let ReadyCommand { path, mut record } = command;
        let (area, outcome) = match result {
            Ok(detail) => (
                PROCESSED,
                CommandOutcome {
                    status: CommandStatus::Processed,
                    completed_at: Utc::now(),
                    detail,
                    error: None,
                },
            ),
            Err(error) => (
                FAILED,
                CommandOutcome {
                    status: CommandStatus::Failed,
                    completed_at: Utc::now(),
                    detail: None,
                    error: Some(error),
                },
            ),
        };
        record.outcome = Some(outcome);
        self.write_atomic(area, &record.id, &serde_json::to_vec_pretty(&record)?)?;
        remove_if_present(&path)?;
        Ok(record)
    }

    /// Move an unreadable pending file to `failed/` with an error annotation.
    pub fn quarantine(&self, command: MalformedCommand) -> Result<QuarantinedRecord, StoreError> {
        let MalformedCommand {
            path,
            id,
            raw,
            error,
        } = command;
        let record = QuarantinedRecord {
            id,
            raw,
            outcome: CommandOutcome {
                status: CommandStatus::Failed,
                completed_at: Utc::now(),
                detail: None,
                error: Some(error),
            },
        };
        self.write_atomic(FAILED, &record.id, &serde_json::to_vec_pretty(&record)?)?;
        remove_if_present(&path)?;
        Ok(record)
    }

    /// Look a command up by id across all three areas.
    pub fn status(&self, id: &str) -> Result<Option<CommandLookup>, StoreError> {
        if !valid_id(id) {
            return Err(StoreError::UnknownCommand(id.to_string()));
        }
        for (area, status) in [
            (PROCESSED, CommandStatus::Processed),
            (FAILED, CommandStatus::Failed),
            (PENDING, CommandStatus::Pending),
        ] {
            match std::fs::read(self.record_path(area, id)) {
                Ok(bytes) => {
                    let record = serde_json::from_slice(&bytes)?;
                    return Ok(Some(CommandLookup { status, record }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    fn terminal_status(&self, id: &str) -> Option<CommandStatus> {
        if self.record_path(PROCESSED, id).exists() {
            Some(CommandStatus::Processed)
        } else if self.record_path(FAILED, id).exists() {
            Some(CommandStatus::Failed)
        } else {
            None
        }
    }

    fn write_atomic(&self, area: &str, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp_dir = self.area(TMP);
        std::fs::create_dir_all(&tmp_dir)?;
        std::fs::create_dir_all(self.area(area))?;

        let tmp_path = tmp_dir.join(format!("{id}.{}.tmp", Uuid::new_v4().simple()));
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, self.record_path(area, id))?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
