pub mod aggregator;
pub mod claude_cli;
pub mod error;
pub mod panel;
pub mod parser;
pub mod prompts;
pub mod retry;
pub mod source;

pub mod test_support;

pub use aggregator::{SourceWeights, ValidationAggregator};
pub use error::OpinionError;
pub use panel::{OpinionPanel, PanelResult, SourceFailure};
pub use retry::{RetryError, RetryPolicy};
pub use source::{build_sources, CliOpinionSource, HttpOpinionSource, OpinionSource};
