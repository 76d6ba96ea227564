//! `RunWorker`: assembles a [`gb_engine::Engine`] from a [`RunConfig`] and
//! drives it to completion.
//!
//! Runs inside the isolated worker process (see `bin/engine_service.rs`):
//! `Engine` holds `Rc<RefCell<_>>` pipeline stages and is not `Send`, so it
//! is built and run on the process's own main thread rather than spawned
//! onto a `tokio` task.

use std::path::PathBuf;

use gb_engine::{
    CancelToken, CommissionModel, Engine, EngineConfig, EngineOutcome, ExecutionConfig, ExecutionHandler,
    FillTiming, HistoricalFeed, PipelineStrategy, PortfolioStage, SizingPolicy, SlippageModel,
};
use gb_risk::alerts::RiskAlert;
use gb_types::{
    BuyingPowerRule, ConcentrationRule, GbError, GbResult, MaxPositionRule, OrchestratorError, Portfolio,
    PriceBandRule, Resolution, RiskChain, RiskRule, Symbol,
};

use crate::config::{DataFeedConfig, PortfolioConfig, ReporterConfig, RiskRuleConfig, RunConfig, StrategyConfig};
use crate::csv_bars;

pub struct RunWorker;

impl RunWorker {
    /// Builds a ready-to-run `Engine` from a validated `RunConfig`. Data is
    /// loaded eagerly and in full: the engine's feed is historical-replay
    /// only, so there is no streaming path to thread a partial load through.
    /// `event_tap`, when given, receives a clone of every pipeline event as
    /// it is published — the hook `bin/engine_service.rs` uses to forward
    /// events over IPC while the run is still in progress.
    pub fn build_engine(
        run_id: impl Into<String>,
        config: &RunConfig,
        event_tap: Option<std::sync::mpsc::Sender<gb_types::Event>>,
    ) -> GbResult<Engine> {
        let resolution = Resolution::Day;
        let (symbol, bars) = load_feed(&config.data_feed, resolution)?;

        let mut feed = HistoricalFeed::new(resolution);
        feed.add_symbol(symbol, bars)?;

        let strategies = build_strategies(&config.strategies);
        let portfolio_stage = build_portfolio_stage(&config.portfolio, &config.risk)?;
        let execution = ExecutionHandler::new(build_execution_config(&config.execution));
        let trade_log_path = trade_log_path(&config.reporters);

        Engine::new(
            run_id,
            Box::new(feed),
            strategies,
            portfolio_stage,
            execution,
            trade_log_path,
            EngineConfig::default(),
            CancelToken::new(),
            event_tap,
        )
    }

    /// Runs the engine to completion, translating the outcome (or a fatal
    /// error) into the caller's persistence/IPC step. Separated from
    /// `build_engine` so callers can build once and decide how to stream
    /// progress before calling `run`.
    pub fn run(engine: Engine) -> GbResult<EngineOutcome> {
        engine.run()
    }
}

fn load_feed(feed: &DataFeedConfig, resolution: Resolution) -> GbResult<(Symbol, Vec<gb_types::Bar>)> {
    match feed {
        DataFeedConfig::InMemory { symbol, bars } => {
            let symbol = Symbol::equity(symbol);
            let bars = bars
                .iter()
                .map(|b| {
                    gb_types::Bar::new(symbol.clone(), b.timestamp, b.open, b.high, b.low, b.close, b.volume, resolution)
                })
                .collect();
            Ok((symbol, bars))
        }
        DataFeedConfig::LocalCsv { symbol, path } => {
            let symbol = Symbol::equity(symbol);
            let bars = csv_bars::load_bars(path, &symbol, resolution)?;
            Ok((symbol, bars))
        }
        DataFeedConfig::LocalFile { .. } | DataFeedConfig::Rest { .. } | DataFeedConfig::Websocket { .. }
        | DataFeedConfig::PushStream { .. } | DataFeedConfig::LiveApi { .. } => {
            Err(GbError::Orchestrator(OrchestratorError::InvalidConfig {
                message: "this data feed type is not available to a historical-replay worker".into(),
            }))
        }
    }
}

fn build_strategies(configs: &[StrategyConfig]) -> Vec<Box<dyn PipelineStrategy>> {
    configs
        .iter()
        .filter_map(|c| match c {
            StrategyConfig::MovingAverage { id, short_window, long_window } => {
                Some(Box::new(gb_engine::MovingAverageStrategy::new(id.clone(), *short_window, *long_window))
                    as Box<dyn PipelineStrategy>)
            }
            StrategyConfig::Breakout { id, lookback } => {
                Some(Box::new(gb_engine::BreakoutStrategy::new(id.clone(), *lookback)) as Box<dyn PipelineStrategy>)
            }
            // A registered plugin class isn't resolvable from config alone;
            // the embedding program is expected to substitute its own
            // `PipelineStrategy` before submission reaches this worker.
            StrategyConfig::Plugin { .. } => None,
        })
        .collect()
}

fn build_portfolio_stage(portfolio: &PortfolioConfig, risk: &[RiskRuleConfig]) -> GbResult<PortfolioStage> {
    let mut chain = RiskChain::default();
    for rule in risk {
        chain.push(build_risk_rule(rule));
    }
    let account = Portfolio::new("orchestrated-run".into(), portfolio.initial_cash);
    let sizing = SizingPolicy { default_quantity: portfolio.lot_size };
    Ok(PortfolioStage::new(account, chain, sizing))
}

fn build_risk_rule(rule: &RiskRuleConfig) -> Box<dyn RiskRule> {
    match rule {
        RiskRuleConfig::MaxPosition { limit } => Box::new(MaxPositionRule { limit: *limit }),
        RiskRuleConfig::BuyingPower { fee_rate } => Box::new(BuyingPowerRule { fee_rate: *fee_rate }),
        RiskRuleConfig::Concentration { max_fraction } => Box::new(ConcentrationRule { max_fraction: *max_fraction }),
        RiskRuleConfig::PriceBand { band } => Box::new(PriceBandRule { band: *band }),
    }
}

fn build_execution_config(config: &crate::config::ExecutionStageConfig) -> ExecutionConfig {
    let fill_timing = match config.fill_timing.as_str() {
        "current_close" => FillTiming::CurrentClose,
        _ => FillTiming::NextOpen,
    };
    ExecutionConfig {
        fill_timing,
        slippage: SlippageModel::FixedBps(config.slippage_bps),
        commission: CommissionModel {
            per_share: config.commission_per_share,
            percentage: config.commission_percentage,
            minimum: rust_decimal::Decimal::ZERO,
        },
        max_volume_fraction: config.volume_cap,
        staleness_bars: config.staleness_threshold_bars,
    }
}

fn trade_log_path(reporters: &[ReporterConfig]) -> Option<PathBuf> {
    reporters.iter().find_map(|r| match r {
        ReporterConfig::Tradelog { path } => Some(PathBuf::from(path)),
        _ => None,
    })
}

/// Converts a fatal `EngineOutcome` error into the risk-monitor-visible
/// severity used when a worker crash is surfaced as a `system_alert`
/// upstream, matching `gb-risk::alerts::RiskAlert`'s severity vocabulary.
pub fn worker_crash_alert(reason: impl Into<String>) -> RiskAlert {
    RiskAlert::new(gb_risk::alerts::RiskSeverity::Critical, gb_risk::alerts::RiskAlertKind::Custom, reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionStageConfig, PortfolioConfig};

    fn sample_config() -> RunConfig {
        RunConfig {
            name: "demo".into(),
            data_feed: DataFeedConfig::InMemory {
                symbol: "AAPL".into(),
                bars: (0..8)
                    .map(|i| crate::config::BarConfig {
                        timestamp: chrono::Utc::now() + chrono::Duration::days(i),
                        open: rust_decimal::Decimal::from(100 + i),
                        high: rust_decimal::Decimal::from(101 + i),
                        low: rust_decimal::Decimal::from(99 + i),
                        close: rust_decimal::Decimal::from(100 + i),
                        volume: rust_decimal::Decimal::from(1000),
                    })
                    .collect(),
            },
            strategies: vec![StrategyConfig::MovingAverage { id: "ma".into(), short_window: 2, long_window: 4 }],
            portfolio: PortfolioConfig::default(),
            execution: ExecutionStageConfig::default(),
            risk: vec![RiskRuleConfig::MaxPosition { limit: rust_decimal::Decimal::from(1000) }],
            reporters: vec![ReporterConfig::Equity],
            notifications: None,
        }
    }

    #[test]
    fn build_engine_assembles_and_runs_to_completion() {
        let config = sample_config();
        let engine = RunWorker::build_engine("run-1", &config, None).unwrap();
        let outcome = RunWorker::run(engine).unwrap();
        assert_eq!(outcome.bars_processed, 8);
    }

    #[test]
    fn plugin_strategies_are_skipped_rather_than_erroring() {
        let mut config = sample_config();
        config.strategies.push(StrategyConfig::Plugin {
            id: "custom".into(),
            class_ref: "my.module.Strategy".into(),
            params: serde_json::json!({}),
        });
        let engine = RunWorker::build_engine("run-1", &config, None);
        assert!(engine.is_ok());
    }

    #[test]
    fn unsupported_feed_type_is_rejected_up_front() {
        let mut config = sample_config();
        config.data_feed = DataFeedConfig::Rest { url: "http://x".into(), poll_interval_ms: 1000, authentication: None };
        assert!(RunWorker::build_engine("run-1", &config, None).is_err());
    }
}
