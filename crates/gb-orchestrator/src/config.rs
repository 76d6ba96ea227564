//! `RunConfig`: the typed shape of a run submission document.
//!
//! Mirrors `BacktestConfig` in `gb-types::backtest` — plain `serde`-derived
//! structs with `Default` impls wherever a sensible default exists. Top-level
//! validation mode (tolerant vs. strict) is a `parse`-time flag rather than a
//! compile-time attribute, since both modes deserialize into the same type.

use gb_types::{GbError, GbResult, OrchestratorError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const KNOWN_TOP_LEVEL_KEYS: &[&str] =
    &["name", "data_feed", "strategies", "portfolio", "execution", "risk", "reporters", "notifications"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub data_feed: DataFeedConfig,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub execution: ExecutionStageConfig,
    #[serde(default)]
    pub risk: Vec<RiskRuleConfig>,
    #[serde(default)]
    pub reporters: Vec<ReporterConfig>,
    #[serde(default)]
    pub notifications: Option<NotificationsConfig>,
}

impl RunConfig {
    /// Deserializes a config document. In `strict` mode, an unrecognized
    /// top-level key is rejected up front (`#[serde(deny_unknown_fields)]`
    /// would also catch nested unknown keys, which tolerant mode needs to
    /// ignore for forward-compat, so the check is scoped to the top level
    /// here rather than applied uniformly).
    pub fn parse(value: serde_json::Value, strict: bool) -> GbResult<RunConfig> {
        if strict {
            if let serde_json::Value::Object(map) = &value {
                for key in map.keys() {
                    if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
                        return Err(GbError::Orchestrator(OrchestratorError::InvalidConfig {
                            message: format!("unknown top-level key: {key}"),
                        }));
                    }
                }
            }
        }
        serde_json::from_value(value)
            .map_err(|e| GbError::Orchestrator(OrchestratorError::InvalidConfig { message: e.to_string() }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataFeedConfig {
    /// Bars supplied inline in the config document (tests, replays).
    InMemory { symbol: String, bars: Vec<BarConfig> },
    LocalCsv { symbol: String, path: String },
    LocalFile { symbol: String, path: String },
    Rest { url: String, poll_interval_ms: u64, authentication: Option<String> },
    Websocket { url: String, authentication: Option<String> },
    PushStream { url: String },
    LiveApi { url: String, authentication: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarConfig {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    MovingAverage { id: String, short_window: usize, long_window: usize },
    Breakout { id: String, lookback: usize },
    /// A strategy implementation registered ahead of time by the embedding
    /// program under `class_ref`; no runtime code loading happens here.
    Plugin { id: String, class_ref: String, params: serde_json::Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    #[serde(rename = "type", default = "default_portfolio_type")]
    pub kind: String,
    pub lot_size: Decimal,
    pub initial_cash: Decimal,
}

fn default_portfolio_type() -> String {
    "naive".into()
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self { kind: default_portfolio_type(), lot_size: Decimal::ONE, initial_cash: Decimal::from(100_000) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStageConfig {
    #[serde(rename = "type", default = "default_execution_type")]
    pub kind: String,
    #[serde(default)]
    pub slippage_bps: Decimal,
    #[serde(default)]
    pub commission_per_share: Decimal,
    #[serde(default)]
    pub commission_percentage: Decimal,
    #[serde(default = "default_fill_timing")]
    pub fill_timing: String,
    #[serde(default = "default_volume_cap")]
    pub volume_cap: Decimal,
    #[serde(default = "default_staleness_bars")]
    pub staleness_threshold_bars: u32,
}

fn default_execution_type() -> String {
    "immediate".into()
}
fn default_fill_timing() -> String {
    "next_open".into()
}
fn default_volume_cap() -> Decimal {
    Decimal::new(10, 2)
}
fn default_staleness_bars() -> u32 {
    5
}

impl Default for ExecutionStageConfig {
    fn default() -> Self {
        Self {
            kind: default_execution_type(),
            slippage_bps: Decimal::new(5, 4),
            commission_per_share: Decimal::ZERO,
            commission_percentage: Decimal::new(5, 4),
            fill_timing: default_fill_timing(),
            volume_cap: default_volume_cap(),
            staleness_threshold_bars: default_staleness_bars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RiskRuleConfig {
    MaxPosition { limit: Decimal },
    BuyingPower { fee_rate: Decimal },
    Concentration { max_fraction: Decimal },
    PriceBand { band: Decimal },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReporterConfig {
    Equity,
    Detailed,
    Tradelog { path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_min_level")]
    pub min_level: String,
    #[serde(default = "default_dedupe_ttl")]
    pub dedupe_ttl_seconds: i64,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

fn default_min_level() -> String {
    "info".into()
}
fn default_dedupe_ttl() -> i64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub credentials_reference: Option<String>,
    pub destination: String,
    #[serde(default = "default_min_level")]
    pub min_severity: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_value() -> serde_json::Value {
        serde_json::json!({
            "name": "demo",
            "data_feed": { "type": "local_csv", "symbol": "AAPL", "path": "/tmp/aapl.csv" },
            "strategies": [{ "type": "moving_average", "id": "ma", "short_window": 3, "long_window": 8 }],
            "portfolio": { "type": "naive", "lot_size": "100", "initial_cash": "100000" },
            "execution": { "type": "immediate", "fill_timing": "next_open" },
            "risk": [{ "type": "max_position", "limit": "200" }],
            "reporters": [{ "type": "equity" }],
        })
    }

    #[test]
    fn tolerant_mode_ignores_unknown_top_level_keys() {
        let mut value = sample_value();
        value.as_object_mut().unwrap().insert("future_field".into(), serde_json::json!(true));
        assert!(RunConfig::parse(value, false).is_ok());
    }

    #[test]
    fn strict_mode_rejects_unknown_top_level_keys() {
        let mut value = sample_value();
        value.as_object_mut().unwrap().insert("future_field".into(), serde_json::json!(true));
        assert!(RunConfig::parse(value, true).is_err());
    }

    #[test]
    fn parses_a_well_formed_config() {
        let config = RunConfig::parse(sample_value(), true).unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.strategies.len(), 1);
    }
}
