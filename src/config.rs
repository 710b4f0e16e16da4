//! Configuration types for tradeloop

use crate::candles::CacheConfig;
use crate::engine::EngineConfig;
use crate::fusion::FusionConfig;
use crate::lifecycle::LifecycleConfig;
use crate::risk::RiskConfig;
use crate::sentiment::SentimentConfig;
use crate::strategy::StrategyConfig;
use crate::technical::TechnicalConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure. Every section falls back to its defaults,
/// so a partial (or empty) file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub technical: TechnicalConfig,
    #[serde(default)]
    pub sentiment: SentimentConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Execution mode: paper trading or live
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Live,
}

/// Execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_mode")]
    pub mode: ExecutionMode,
    #[serde(default = "default_slippage")]
    pub slippage_estimate: Decimal,
    /// Durable state location for the paper-trading binary
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

fn default_mode() -> ExecutionMode {
    ExecutionMode::Paper
}
fn default_slippage() -> Decimal {
    dec!(0.001)
}
fn default_state_path() -> PathBuf {
    PathBuf::from("tradeloop_state.json")
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            slippage_estimate: default_slippage(),
            state_path: default_state_path(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Prometheus exporter port; disabled when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
