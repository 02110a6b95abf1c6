use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state or history could not be decoded. Never safe to continue on.
    #[error("Corrupt journal: {0}")]
    Corrupt(String),

    #[error("Store not available: {0}")]
    Unavailable(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}
