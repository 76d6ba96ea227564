//! Backtest kernel: a bus-driven engine over a pull-based data feed, wired
//! from a feed, a set of strategies, a portfolio stage, an execution stage,
//! and a reporter chain.

pub mod engine;
pub mod execution;
pub mod feed;
pub mod pipeline_strategy;
pub mod portfolio_stage;
pub mod reporter;
pub mod simulator;

pub use engine::{CancelToken, Engine, EngineConfig, EngineOutcome};
pub use execution::{CommissionModel, ExecutionConfig, ExecutionHandler, FillTiming, SlippageModel};
pub use feed::{DataFeed, FeedEvent, HistoricalFeed};
pub use pipeline_strategy::{BreakoutStrategy, MovingAverageStrategy, PipelineStrategy};
pub use portfolio_stage::{PortfolioOutcome, PortfolioStage, SizingPolicy};
pub use reporter::{DetailedReporter, EquityCurveReporter, EquityPoint, TradeLogReporter};
pub use simulator::{MarketHours, MarketSimulator, SimulationStats, TimestampedEvent};
