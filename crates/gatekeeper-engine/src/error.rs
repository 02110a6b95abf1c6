use gatekeeper_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The loop can no longer trust its own recorded state. Never retried.
    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Prediction source error: {0}")]
    Prediction(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Wrap a journal failure. Anything that touched persisted state is fatal.
    pub fn journal(context: &str, err: StoreError) -> Self {
        EngineError::Fatal(format!("{context}: {err}"))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Fatal(_))
    }
}
