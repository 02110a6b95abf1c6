use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpinionError {
    #[error("Validator CLI error: {0}")]
    Cli(String),

    #[error("Validator HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Opinion parse error: {0}")]
    Parse(String),

    #[error("Validator timed out after {0} ms")]
    Timeout(u64),

    #[error("Source misconfigured: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
