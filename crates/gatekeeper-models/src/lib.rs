pub mod activity;
pub mod command;
pub mod config;
pub mod decision;
pub mod journal_schema;
pub mod opinion;
pub mod prediction;
pub mod state;
pub mod threshold;
pub mod validation;

pub use activity::{ActivityEntry, ActivityEvent, BroadcastMessage, LifecycleEvent, ObserverRequest};
pub use command::{CommandError, CommandKind, CommandOutcome, CommandRecord, CommandStatus, ControlInstruction};
pub use config::{
    ConfigError, EngineConfig, ExecutionConfig, ExecutionMode, FreshnessConfig, GatekeeperConfig,
    HistoryConfig, NetworkConfig, OpinionSourceConfig, PathsConfig, PredictionSourceConfig,
    RegimeOffsets, SourceKind, SupervisorConfig, ThresholdConfig, ValidationConfig,
};
pub use decision::{Decision, ExecutionOrder, FreshnessReport, FreshnessVerdict, RejectionReason};
pub use opinion::{Opinion, OpinionReply, TradeContext};
pub use prediction::{Prediction, PredictionReply, TradeSide};
pub use state::{FreshnessCounters, Mode, OperationalState};
pub use threshold::{
    AdaptiveThreshold, AdjustmentStep, HistoricalInput, PerformanceWindow, Regime,
    ThresholdAdjustment, ThresholdContext,
};
pub use validation::{SourceContribution, ValidationOutcome, ValidationScore, WeightTable};
