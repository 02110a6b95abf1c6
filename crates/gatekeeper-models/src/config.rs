use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::threshold::Regime;

/// Top-level configuration shared by the decision loop and the supervisor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatekeeperConfig {
    pub engine: EngineConfig,
    pub paths: PathsConfig,
    pub freshness: FreshnessConfig,
    pub network: NetworkConfig,
    pub prediction_source: PredictionSourceConfig,
    pub execution: ExecutionConfig,
    pub validation: ValidationConfig,
    pub threshold: ThresholdConfig,
    pub history: HistoryConfig,
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub cycle_interval_seconds: u64,
    /// Instruments evaluated every cycle, in addition to the active set.
    pub instruments: Vec<String>,
    /// Volatility assumed when a prediction does not carry one.
    pub default_volatility: f64,
    /// Upper bound on the size hint handed to execution.
    pub max_position_fraction: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_interval_seconds: 60,
            instruments: Vec::new(),
            default_volatility: 0.02,
            max_position_fraction: 0.10,
        }
    }
}

impl EngineConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// SQLite journal written by the decision loop, read by the supervisor.
    pub journal_path: String,
    /// Append-only historical trade store.
    pub history_path: String,
    /// Root of the command mailbox (pending/processed/failed).
    pub mailbox_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            journal_path: "data/gatekeeper_journal.db".to_string(),
            history_path: "data/trade_history.db".to_string(),
            mailbox_dir: "data/mailbox".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FreshnessConfig {
    pub max_age_seconds: u64,
    pub warn_threshold_seconds: u64,
    pub max_api_latency_ms: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: 30,
            warn_threshold_seconds: 15,
            max_api_latency_ms: 5_000,
        }
    }
}

/// Time-box and retry budget for every outbound call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub request_timeout_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            max_attempts: 3,
            initial_backoff_ms: 250,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredictionSourceConfig {
    /// `GET {base_url}/predictions/{instrument}`.
    pub base_url: String,
}

impl Default for PredictionSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Log accepted decisions without placing anything.
    #[default]
    DryRun,
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// `POST {base_url}/orders` when mode = "http".
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// LLM validator driven through the `claude` CLI.
    #[default]
    Cli,
    /// Remote validator answering `POST {url}` with an opinion.
    Http,
}

/// One configured opinion source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpinionSourceConfig {
    pub name: String,
    #[serde(default)]
    pub kind: SourceKind,
    /// Review focus for CLI validators ("technical", "risk", "sentiment").
    #[serde(default = "default_focus")]
    pub focus: String,
    /// Model override for CLI validators. Falls back to `ValidationConfig::cli_model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub weight: f64,
    /// Weight used above `ValidationConfig::high_volatility_cutoff`. Defaults to `weight`.
    #[serde(default)]
    pub high_volatility_weight: Option<f64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl OpinionSourceConfig {
    pub fn weight_for(&self, high_volatility: bool) -> f64 {
        if high_volatility {
            self.high_volatility_weight.unwrap_or(self.weight)
        } else {
            self.weight
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Above this volatility the alternate weight table applies.
    pub high_volatility_cutoff: f64,
    pub cli_model: String,
    pub sources: Vec<OpinionSourceConfig>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            high_volatility_cutoff: 0.05,
            cli_model: "claude-3-5-haiku-latest".to_string(),
            sources: vec![
                OpinionSourceConfig {
                    name: "technical".to_string(),
                    kind: SourceKind::Cli,
                    focus: "technical".to_string(),
                    model: None,
                    url: None,
                    weight: 0.4,
                    high_volatility_weight: Some(0.25),
                    enabled: true,
                },
                OpinionSourceConfig {
                    name: "risk".to_string(),
                    kind: SourceKind::Cli,
                    focus: "risk".to_string(),
                    model: None,
                    url: None,
                    weight: 0.35,
                    high_volatility_weight: Some(0.5),
                    enabled: true,
                },
                OpinionSourceConfig {
                    name: "sentiment".to_string(),
                    kind: SourceKind::Cli,
                    focus: "sentiment".to_string(),
                    model: None,
                    url: None,
                    weight: 0.25,
                    high_volatility_weight: Some(0.25),
                    enabled: true,
                },
            ],
        }
    }
}

/// Fixed regime-specific threshold offsets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegimeOffsets {
    pub trending: f64,
    pub sideways: f64,
    pub high_volatility: f64,
    pub normal: f64,
}

impl Default for RegimeOffsets {
    fn default() -> Self {
        Self {
            trending: -0.05,
            sideways: 0.05,
            high_volatility: 0.10,
            normal: 0.0,
        }
    }
}

impl RegimeOffsets {
    pub fn offset(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Trending => self.trending,
            Regime::Sideways => self.sideways,
            Regime::HighVolatility => self.high_volatility,
            Regime::Normal => self.normal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdConfig {
    pub base: f64,
    pub min_bound: f64,
    pub max_bound: f64,
    pub low_volatility_cutoff: f64,
    pub high_volatility_cutoff: f64,
    /// Added at or below the low cutoff.
    pub low_volatility_delta: f64,
    /// Subtracted at or above the high cutoff.
    pub high_volatility_delta: f64,
    pub history_window_days: u32,
    pub min_sample_size: u64,
    pub good_return_cutoff: f64,
    pub poor_return_cutoff: f64,
    pub performance_delta: f64,
    pub regime_offsets: RegimeOffsets,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            base: 0.5,
            min_bound: 0.30,
            max_bound: 0.85,
            low_volatility_cutoff: 0.01,
            high_volatility_cutoff: 0.05,
            low_volatility_delta: 0.25,
            high_volatility_delta: 0.15,
            history_window_days: 7,
            min_sample_size: 5,
            good_return_cutoff: 0.02,
            poor_return_cutoff: -0.01,
            performance_delta: 0.05,
            regime_offsets: RegimeOffsets::default(),
        }
    }
}

/// Hot cache in front of the historical trade store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub memory_max_capacity: u64,
    pub memory_ttl_seconds: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            memory_max_capacity: 1_000,
            memory_ttl_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    pub bind_addr: String,
    pub heartbeat_seconds: u64,
    pub recent_activity_capacity: usize,
    /// How often the journal is tailed for new activity.
    pub poll_interval_ms: u64,
    pub broadcast_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8088".to_string(),
            heartbeat_seconds: 15,
            recent_activity_capacity: 100,
            poll_interval_ms: 500,
            broadcast_capacity: 256,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl GatekeeperConfig {
    /// Read and validate a TOML config file. Missing sections take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: GatekeeperConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the decision loop cannot run safely with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.threshold;
        if !(0.0..=1.0).contains(&t.min_bound) || !(0.0..=1.0).contains(&t.max_bound) {
            return Err(ConfigError::Invalid(
                "threshold bounds must lie in [0, 1]".to_string(),
            ));
        }
        if t.min_bound > t.max_bound {
            return Err(ConfigError::Invalid(format!(
                "threshold min_bound {} exceeds max_bound {}",
                t.min_bound, t.max_bound
            )));
        }
        if t.low_volatility_cutoff > t.high_volatility_cutoff {
            return Err(ConfigError::Invalid(
                "threshold low_volatility_cutoff exceeds high_volatility_cutoff".to_string(),
            ));
        }

        let f = &self.freshness;
        if f.warn_threshold_seconds > f.max_age_seconds {
            return Err(ConfigError::Invalid(format!(
                "freshness warn_threshold_seconds {} exceeds max_age_seconds {}",
                f.warn_threshold_seconds, f.max_age_seconds
            )));
        }
        if f.max_age_seconds == 0 {
            return Err(ConfigError::Invalid(
                "freshness max_age_seconds must be > 0".to_string(),
            ));
        }

        for source in &self.validation.sources {
            let weights = [source.weight, source.weight_for(true)];
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "validation source {} has a negative or non-finite weight",
                    source.name
                )));
            }
        }
        if self.engine.cycle_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "engine cycle_interval_seconds must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_focus() -> String {
    "technical".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let config = GatekeeperConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: GatekeeperConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn default_weights_sum_to_one() {
        let validation = ValidationConfig::default();
        let base: f64 = validation.sources.iter().map(|s| s.weight_for(false)).sum();
        let high: f64 = validation.sources.iter().map(|s| s.weight_for(true)).sum();
        assert!((base - 1.0).abs() < 1e-9);
        assert!((high - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: GatekeeperConfig = toml::from_str("").unwrap();
        assert_eq!(config.freshness.max_age_seconds, 30);
        assert_eq!(config.threshold.max_bound, 0.85);
        assert_eq!(config.supervisor.recent_activity_capacity, 100);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[engine]
cycle_interval_seconds = 30
instruments = ["BTC", "ETH"]

[paths]
mailbox_dir = "/tmp/gk/mailbox"

[threshold]
base = 0.55

[threshold.regime_offsets]
sideways = 0.08

[validation]
high_volatility_cutoff = 0.04

[[validation.sources]]
name = "technical"
weight = 0.6

[[validation.sources]]
name = "remote"
kind = "http"
url = "http://validator.local/review"
weight = 0.4
high_volatility_weight = 0.7
enabled = false
"#;

        let config: GatekeeperConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.instruments, vec!["BTC", "ETH"]);
        assert_eq!(config.engine.default_volatility, 0.02);
        assert_eq!(config.paths.mailbox_dir, "/tmp/gk/mailbox");
        assert_eq!(config.paths.journal_path, "data/gatekeeper_journal.db");
        assert_eq!(config.threshold.base, 0.55);
        assert_eq!(config.threshold.regime_offsets.sideways, 0.08);
        assert_eq!(config.threshold.regime_offsets.trending, -0.05);

        let sources = &config.validation.sources;
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].kind, SourceKind::Cli);
        assert_eq!(sources[0].focus, "technical");
        assert!(sources[0].enabled);
        assert_eq!(sources[0].weight_for(true), 0.6);
        assert_eq!(sources[1].kind, SourceKind::Http);
        assert_eq!(sources[1].weight_for(true), 0.7);
        assert!(!sources[1].enabled);
    }

    #[test]
    fn regime_offset_lookup() {
        let offsets = RegimeOffsets::default();
        assert_eq!(offsets.offset(Regime::Normal), 0.0);
        assert_eq!(offsets.offset(Regime::HighVolatility), 0.10);
    }

    #[test]
    fn load_from_file() {
        use std::io::Write;

        let toml_str = r#"
[engine]
instruments = ["BTC-USD"]

[execution]
mode = "http"
base_url = "http://127.0.0.1:9000"
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml_str.as_bytes()).unwrap();

        let config = GatekeeperConfig::load(file.path()).unwrap();
        assert_eq!(config.engine.instruments, vec!["BTC-USD"]);
        assert_eq!(config.execution.mode, ExecutionMode::Http);
        assert_eq!(config.paths.mailbox_dir, "data/mailbox");
    }

    #[test]
    fn empty_file_loads_as_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = GatekeeperConfig::load(file.path()).unwrap();
        assert_eq!(config, GatekeeperConfig::default());
    }

    #[test]
    fn unparsable_file_names_its_path() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[engine\n").unwrap();
        match GatekeeperConfig::load(file.path()) {
            Err(ConfigError::Parse { path, .. }) => {
                assert_eq!(path, file.path().display().to_string())
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GatekeeperConfig::load(dir.path().join("absent.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut config = GatekeeperConfig::default();
        config.threshold.min_bound = 0.9;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn warn_above_max_age_is_rejected() {
        let mut config = GatekeeperConfig::default();
        config.freshness.warn_threshold_seconds = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = GatekeeperConfig::default();
        config.validation.sources[0].weight = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn shipped_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/gatekeeper.toml");
        let config = GatekeeperConfig::load(path).unwrap();
        assert_eq!(config.engine.instruments, vec!["BTC-USD", "ETH-USD"]);
        assert_eq!(config.validation.sources.len(), 3);
        assert_eq!(config.supervisor.recent_activity_capacity, 100);
    }
}
