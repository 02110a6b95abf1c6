pub mod control;
pub mod error;
pub mod freshness;
pub mod orchestrator;
pub mod sources;
pub mod threshold;

pub mod test_support;

pub use error::EngineError;
pub use orchestrator::{Collaborators, CycleOutcome, CycleReport, DecisionLoop};
pub use sources::{ExecutionEngine, PredictionSource};
