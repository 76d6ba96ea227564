//! Bus-driven backtest engine: wires a data feed, strategies, the portfolio
//! stage, the execution stage, and reporters onto one `EventBus`, then
//! drains it one bar at a time until the feed ends or the run is canceled.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gb_types::{
    EngineError, Event, EventBus, EventKind, EventPayload, GbError, GbResult, HandlerOutcome, MetricsEvent,
    Portfolio,
};
use tracing::{info, warn};

use crate::execution::ExecutionHandler;
use crate::feed::{DataFeed, FeedEvent};
use crate::pipeline_strategy::PipelineStrategy;
use crate::portfolio_stage::{PortfolioOutcome, PortfolioStage};
use crate::reporter::{DetailedReporter, EquityCurveReporter, EquityPoint, TradeLogReporter};

/// Cooperative cancellation checked once per feed step. A plain
/// `Arc<AtomicBool>` rather than `tokio_util::sync::CancellationToken`: the
/// engine has no other use for tokio's sync primitives and this avoids
/// adding a dependency the teacher stack doesn't carry.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often (in bars) to log a progress checkpoint.
    pub progress_checkpoint_every: usize,
    /// Total strategy-handler errors tolerated across the run before it is
    /// aborted. `None` (the default) means unbounded: a strategy error is
    /// always logged and skipped, never fatal. Counted per strategy, not
    /// pooled across strategies.
    pub max_strategy_errors: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { progress_checkpoint_every: 50, max_strategy_errors: None }
    }
}

/// Everything the run loop produced, for the orchestrator or a standalone
/// caller to persist or stream.
pub struct EngineOutcome {
    pub final_portfolio: Portfolio,
    pub final_metrics: Option<MetricsEvent>,
    pub equity_curve: Vec<EquityPoint>,
    pub detailed: DetailedReporter,
    pub bars_processed: usize,
}

pub struct Engine {
    bus: EventBus,
    config: EngineConfig,
    feed: Box<dyn DataFeed>,
    cancel: CancelToken,
    portfolio: Rc<RefCell<PortfolioStage>>,
    equity_reporter: Rc<RefCell<EquityCurveReporter>>,
    detailed_reporter: Rc<RefCell<DetailedReporter>>,
    trade_log: Option<Rc<RefCell<TradeLogReporter>>>,
}

impl Engine {
    /// Assembles the pipeline: strategies and the portfolio stage subscribe
    /// to `Market`, the portfolio stage subscribes to `Signal`, the
    /// execution stage subscribes to `Order` and `Market`, the portfolio
    /// stage and reporters subscribe to `Fill`, and the reporters subscribe
    /// to `Metrics`. Subscription order is registration order, so the
    /// portfolio's own `Market` handler (marking prices) runs before
    /// execution's `Market` handler (filling against those same prices) —
    /// both were queued from the same published bar, so this is
    /// deterministic regardless of call order here, but registering
    /// strategies first keeps signals flowing before fills in each drain.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: impl Into<String>,
        feed: Box<dyn DataFeed>,
        strategies: Vec<Box<dyn PipelineStrategy>>,
        portfolio_stage: PortfolioStage,
        execution: ExecutionHandler,
        trade_log_path: Option<PathBuf>,
        config: EngineConfig,
        cancel: CancelToken,
        event_tap: Option<std::sync::mpsc::Sender<Event>>,
    ) -> GbResult<Self> {
        let run_id = run_id.into();
        let mut bus = EventBus::new(run_id.clone());
        let portfolio = Rc::new(RefCell::new(portfolio_stage));
        let execution = Rc::new(RefCell::new(execution));
        let equity_reporter = Rc::new(RefCell::new(EquityCurveReporter::default()));
        let detailed_reporter = Rc::new(RefCell::new(DetailedReporter::default()));
        let trade_log =
            trade_log_path.map(|path| Rc::new(RefCell::new(TradeLogReporter::new(run_id.clone(), path))));

        let max_strategy_errors = config.max_strategy_errors;
        for mut strategy in strategies {
            let mut errors = 0u32;
            bus.subscribe(EventKind::Market, move |event, sink| {
                let EventPayload::Market(bar) = &event.payload else { return HandlerOutcome::Ok };
                match strategy.on_bar(bar) {
                    Ok(signals) => {
                        for signal in signals {
                            sink.publish(EventPayload::Signal(signal));
                        }
                        HandlerOutcome::Ok
                    }
                    Err(e) => {
                        errors += 1;
                        match max_strategy_errors {
                            Some(limit) if errors >= limit => HandlerOutcome::Fatal(format!(
                                "strategy {} error budget exceeded: {errors} errors (limit {limit}), last: {e}",
                                strategy.id()
                            )),
                            _ => HandlerOutcome::Recoverable(format!("strategy {} error: {e}", strategy.id())),
                        }
                    }
                }
            })?;
        }

        {
            let portfolio = portfolio.clone();
            bus.subscribe(EventKind::Market, move |event, _sink| {
                let EventPayload::Market(bar) = &event.payload else { return HandlerOutcome::Ok };
                portfolio.borrow_mut().on_market_price(&bar.symbol, bar.close);
                HandlerOutcome::Ok
            })?;
        }

        {
            let portfolio = portfolio.clone();
            bus.subscribe(EventKind::Signal, move |event, sink| {
                let EventPayload::Signal(signal) = &event.payload else { return HandlerOutcome::Ok };
                match portfolio.borrow_mut().on_signal(signal) {
                    PortfolioOutcome::Order(order) => {
                        sink.publish(EventPayload::Order(order));
                    }
                    PortfolioOutcome::Rejected(rejection) => {
                        sink.publish(EventPayload::RiskRejection(rejection));
                    }
                    PortfolioOutcome::NoOp => {}
                }
                HandlerOutcome::Ok
            })?;
        }

        {
            let execution = execution.clone();
            bus.subscribe(EventKind::Order, move |event, _sink| {
                let EventPayload::Order(order) = &event.payload else { return HandlerOutcome::Ok };
                execution.borrow_mut().on_order(order.clone());
                HandlerOutcome::Ok
            })?;
        }

        {
            let execution = execution.clone();
            bus.subscribe(EventKind::Market, move |event, sink| {
                let EventPayload::Market(bar) = &event.payload else { return HandlerOutcome::Ok };
                for fill in execution.borrow_mut().on_market(bar) {
                    sink.publish(EventPayload::Fill(fill));
                }
                HandlerOutcome::Ok
            })?;
        }

        {
            let portfolio = portfolio.clone();
            bus.subscribe(EventKind::Fill, move |event, sink| {
                let EventPayload::Fill(fill) = &event.payload else { return HandlerOutcome::Ok };
                let metrics = portfolio.borrow_mut().on_fill(fill);
                sink.publish(EventPayload::Metrics(metrics));
                HandlerOutcome::Ok
            })?;
        }

        {
            let detailed = detailed_reporter.clone();
            bus.subscribe(EventKind::Fill, move |event, _sink| {
                let EventPayload::Fill(fill) = &event.payload else { return HandlerOutcome::Ok };
                detailed.borrow_mut().on_fill(fill.clone());
                HandlerOutcome::Ok
            })?;
        }

        if let Some(trade_log) = trade_log.clone() {
            let portfolio = portfolio.clone();
            bus.subscribe(EventKind::Fill, move |event, _sink| {
                let EventPayload::Fill(fill) = &event.payload else { return HandlerOutcome::Ok };
                // The portfolio's own Fill handler (registered above) has
                // already applied this fill, so its running realized P&L
                // already reflects it.
                let realized_pnl = portfolio.borrow().portfolio.total_realized_pnl;
                trade_log.borrow_mut().on_fill(fill.clone(), realized_pnl);
                HandlerOutcome::Ok
            })?;
        }

        {
            let equity = equity_reporter.clone();
            bus.subscribe(EventKind::Metrics, move |event, _sink| {
                let EventPayload::Metrics(metrics) = &event.payload else { return HandlerOutcome::Ok };
                equity.borrow_mut().on_metrics(event.occurred_at, metrics);
                HandlerOutcome::Ok
            })?;
        }

        {
            let detailed = detailed_reporter.clone();
            bus.subscribe(EventKind::Metrics, move |event, _sink| {
                let EventPayload::Metrics(metrics) = &event.payload else { return HandlerOutcome::Ok };
                detailed.borrow_mut().on_metrics(metrics.clone());
                HandlerOutcome::Ok
            })?;
        }

        if let Some(tap) = event_tap {
            for kind in [
                EventKind::Market,
                EventKind::Signal,
                EventKind::Order,
                EventKind::Fill,
                EventKind::Metrics,
                EventKind::RiskRejection,
            ] {
                let tap = tap.clone();
                bus.subscribe(kind, move |event, _sink| {
                    // A disconnected receiver means the IPC writer has gone
                    // away; the run itself still completes normally.
                    let _ = tap.send(event.clone());
                    HandlerOutcome::Ok
                })?;
            }
        }

        Ok(Self {
            bus,
            config,
            feed,
            cancel,
            portfolio,
            equity_reporter,
            detailed_reporter,
            trade_log,
        })
    }

    /// Drives the feed to completion: publishes one `MarketEvent` per bar
    /// and drains the bus after each, checking cancellation before every
    /// feed step. A fatal handler error aborts the run immediately; a gap
    /// is logged and skipped rather than treated as an error.
    pub fn run(mut self) -> GbResult<EngineOutcome> {
        let mut bars_processed = 0usize;

        loop {
            if self.cancel.is_canceled() {
                return Err(GbError::Engine(EngineError::Canceled));
            }

            match self.feed.next()? {
                FeedEvent::End => break,
                FeedEvent::Heartbeat => continue,
                FeedEvent::Gap { symbol, expected } => {
                    warn!(%symbol, %expected, "feed gap, skipping slot");
                    continue;
                }
                FeedEvent::Bar(bar) => {
                    self.bus.publish(EventPayload::Market(bar));
                    self.bus.drain()?;
                    bars_processed += 1;
                    if bars_processed % self.config.progress_checkpoint_every == 0 {
                        info!(bars_processed, progress = self.feed.progress(), "run checkpoint");
                    }
                }
            }
        }

        // Feed exhaustion always yields a terminal metrics snapshot, even if
        // no fill ever published one (empty feed, or no signals triggered):
        // the reporters must still see initial cash as the final equity.
        let metrics = self.portfolio.borrow().to_metrics();
        self.bus.publish(EventPayload::Metrics(metrics));
        self.bus.drain()?;

        if let Some(trade_log) = &self.trade_log {
            trade_log.borrow().flush()?;
        }

        let final_metrics = self.detailed_reporter.borrow().metrics_history.last().cloned();
        let final_portfolio = self.portfolio.borrow().portfolio.clone();

        Ok(EngineOutcome {
            final_portfolio,
            final_metrics,
            equity_curve: self.equity_reporter.borrow().points.clone(),
            detailed: self.detailed_reporter.borrow().clone(),
            bars_processed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::HistoricalFeed;
    use crate::pipeline_strategy::MovingAverageStrategy;
    use chrono::Utc;
    use gb_types::{Bar, RiskChain, Resolution, Symbol};
    use rust_decimal_macros::dec;

    fn trending_bars(symbol: &Symbol) -> Vec<Bar> {
        let t0 = Utc::now();
        let closes = [dec!(100), dec!(100), dec!(100), dec!(100), dec!(120), dec!(130), dec!(140)];
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                Bar::new(
                    symbol.clone(),
                    t0 + chrono::Duration::days(i as i64),
                    *close,
                    *close,
                    *close,
                    *close,
                    dec!(10_000),
                    Resolution::Day,
                )
            })
            .collect()
    }

    #[test]
    fn deterministic_crossover_run_produces_fills_and_equity_curve() {
        let symbol = Symbol::equity("AAPL");
        let mut feed = HistoricalFeed::new(Resolution::Day);
        feed.add_symbol(symbol.clone(), trending_bars(&symbol)).unwrap();

        let portfolio = PortfolioStage::new(
            Portfolio::new("test".into(), dec!(100_000)),
            RiskChain::default(),
            crate::portfolio_stage::SizingPolicy { default_quantity: dec!(10) },
        );

        let engine = Engine::new(
            "run-1",
            Box::new(feed),
            vec![Box::new(MovingAverageStrategy::new("ma", 2, 4))],
            portfolio,
            ExecutionHandler::new(crate::execution::ExecutionConfig::default()),
            None,
            EngineConfig::default(),
            CancelToken::new(),
            None,
        )
        .unwrap();

        let outcome = engine.run().unwrap();
        assert_eq!(outcome.bars_processed, 7);
        assert!(!outcome.detailed.fills.is_empty());
        assert!(!outcome.equity_curve.is_empty());
    }

    #[test]
    fn canceled_run_returns_canceled_error() {
        let symbol = Symbol::equity("AAPL");
        let mut feed = HistoricalFeed::new(Resolution::Day);
        feed.add_symbol(symbol.clone(), trending_bars(&symbol)).unwrap();

        let portfolio = PortfolioStage::new(
            Portfolio::new("test".into(), dec!(100_000)),
            RiskChain::default(),
            crate::portfolio_stage::SizingPolicy::default(),
        );
        let cancel = CancelToken::new();
        cancel.cancel();

        let engine = Engine::new(
            "run-1",
            Box::new(feed),
            vec![],
            portfolio,
            ExecutionHandler::new(crate::execution::ExecutionConfig::default()),
            None,
            EngineConfig::default(),
            cancel,
            None,
        )
        .unwrap();

        assert!(engine.run().is_err());
    }
}
