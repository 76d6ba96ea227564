//! Pull-based market data feed: the engine's only source of `MarketEvent`s.
//!
//! Wraps [`crate::simulator::MarketSimulator`] rather than re-deriving its
//! chronological bar ordering: the simulator already does the BTreeMap
//! bookkeeping, this module just adapts its multi-symbol-per-tick shape into
//! the one-bar-at-a-time contract the engine run loop wants, and layers a
//! per-symbol gap check on top.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use gb_types::{Bar, GbResult, MarketEvent, Resolution, Symbol};

use crate::simulator::MarketSimulator;

/// One step of feed progress handed to the engine run loop.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Bar(Bar),
    /// No bar arrived for `symbol` within one resolution interval of the
    /// last one seen; `expected` is the slot that was skipped.
    Gap { symbol: Symbol, expected: DateTime<Utc> },
    /// The feed has no clock of its own to advance (a live feed between
    /// ticks); the engine should still check cancellation and move on.
    Heartbeat,
    End,
}

/// Pull interface a feed exposes to the engine run loop. Implementors own
/// their own cursor; `next` advances it by exactly one bar, or reports a
/// gap, heartbeat, or end.
pub trait DataFeed {
    fn next(&mut self) -> GbResult<FeedEvent>;
    fn progress(&self) -> f64;
    fn current_time(&self) -> Option<DateTime<Utc>>;
}

/// Historical feed backed by pre-loaded bars, replayed in deterministic
/// timestamp-then-symbol order.
pub struct HistoricalFeed {
    simulator: MarketSimulator,
    queue: VecDeque<Bar>,
    gap_queue: VecDeque<FeedEvent>,
    last_seen: HashMap<Symbol, DateTime<Utc>>,
    initialized: bool,
}

impl HistoricalFeed {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            simulator: MarketSimulator::new().with_resolution(resolution),
            queue: VecDeque::new(),
            gap_queue: VecDeque::new(),
            last_seen: HashMap::new(),
            initialized: false,
        }
    }

    pub fn add_symbol(&mut self, symbol: Symbol, bars: Vec<Bar>) -> GbResult<()> {
        self.simulator.add_data_feed(symbol, bars)
    }

    fn ensure_initialized(&mut self) -> GbResult<()> {
        if !self.initialized {
            self.simulator.initialize()?;
            self.initialized = true;
        }
        Ok(())
    }

    /// Records `bar` as the latest seen for its symbol, returning a `Gap`
    /// event if more than one interval elapsed since the previous bar.
    fn check_gap(&mut self, bar: &Bar) -> Option<FeedEvent> {
        let interval = bar.resolution.to_seconds().map(chrono::Duration::seconds)?;
        let prior = self.last_seen.insert(bar.symbol.clone(), bar.timestamp);
        match prior {
            Some(prev) if bar.timestamp - prev > interval * 2 => Some(FeedEvent::Gap {
                symbol: bar.symbol.clone(),
                expected: prev + interval,
            }),
            _ => None,
        }
    }
}

impl DataFeed for HistoricalFeed {
    fn next(&mut self) -> GbResult<FeedEvent> {
        self.ensure_initialized()?;

        if let Some(event) = self.gap_queue.pop_front() {
            return Ok(event);
        }

        if let Some(bar) = self.queue.pop_front() {
            if let Some(gap) = self.check_gap(&bar) {
                self.gap_queue.push_back(FeedEvent::Bar(bar));
                return Ok(gap);
            }
            return Ok(FeedEvent::Bar(bar));
        }

        let events = self.simulator.next_events()?;
        if events.is_empty() {
            return Ok(FeedEvent::End);
        }
        for event in events {
            if let MarketEvent::Bar(bar) = event.event {
                self.queue.push_back(bar);
            }
        }
        self.next()
    }

    fn progress(&self) -> f64 {
        self.simulator.progress()
    }

    fn current_time(&self) -> Option<DateTime<Utc>> {
        self.simulator.current_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_types::AssetClass;
    use rust_decimal::Decimal;

    fn bar(symbol: &Symbol, ts: DateTime<Utc>, close: i64) -> Bar {
        Bar::new(
            symbol.clone(),
            ts,
            Decimal::from(close),
            Decimal::from(close + 1),
            Decimal::from(close - 1),
            Decimal::from(close),
            Decimal::from(1000),
            Resolution::Day,
        )
    }

    #[test]
    fn replays_bars_in_timestamp_order_then_reports_end() {
        let symbol = Symbol::new("AAPL", "NASDAQ", AssetClass::Equity);
        let t0 = Utc::now();
        let bars = vec![
            bar(&symbol, t0, 100),
            bar(&symbol, t0 + chrono::Duration::days(1), 101),
        ];
        let mut feed = HistoricalFeed::new(Resolution::Day);
        feed.add_symbol(symbol, bars).unwrap();

        let first = feed.next().unwrap();
        assert!(matches!(first, FeedEvent::Bar(b) if b.close == Decimal::from(100)));
        let second = feed.next().unwrap();
        assert!(matches!(second, FeedEvent::Bar(b) if b.close == Decimal::from(101)));
        assert!(matches!(feed.next().unwrap(), FeedEvent::End));
    }

    #[test]
    fn detects_gap_past_one_interval() {
        let symbol = Symbol::new("AAPL", "NASDAQ", AssetClass::Equity);
        let t0 = Utc::now();
        let bars = vec![
            bar(&symbol, t0, 100),
            bar(&symbol, t0 + chrono::Duration::days(5), 110),
        ];
        let mut feed = HistoricalFeed::new(Resolution::Day);
        feed.add_symbol(symbol, bars).unwrap();

        assert!(matches!(feed.next().unwrap(), FeedEvent::Bar(_)));
        assert!(matches!(feed.next().unwrap(), FeedEvent::Gap { .. }));
        assert!(matches!(feed.next().unwrap(), FeedEvent::Bar(b) if b.close == Decimal::from(110)));
    }
}
