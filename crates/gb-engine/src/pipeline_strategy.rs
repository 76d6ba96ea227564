//! Kernel-native strategies: deterministic, I/O-free, stateful per symbol.
//!
//! Each holds its own rolling window per symbol and produces `SignalEvent`s
//! from bars; sizing and risk are the portfolio stage's job, never the
//! strategy's. Grounded on `gb_types::strategy`'s moving-average-crossover
//! and momentum calculations, restated against the bus's signal-first
//! pipeline instead of that trait's direct `PlaceOrder` actions.

use std::collections::{HashMap, VecDeque};

use gb_types::{Bar, GbResult, SignalDirection, SignalEvent, Symbol};
use rust_decimal::Decimal;

/// A strategy wired onto `EventKind::Market`. Must not touch external I/O
/// and must be a pure function of the bars it has seen; exposes a stable id
/// used as `SignalEvent::strategy_id` and, downstream, the dedupe key. `Err`
/// counts against the engine's strategy error budget (`EngineConfig`) rather
/// than aborting the run outright.
pub trait PipelineStrategy: Send {
    fn id(&self) -> &str;
    fn on_bar(&mut self, bar: &Bar) -> GbResult<Vec<SignalEvent>>;
}

#[derive(Debug, Clone, Default)]
struct RollingMean {
    values: VecDeque<Decimal>,
    capacity: usize,
}

impl RollingMean {
    fn new(capacity: usize) -> Self {
        Self { values: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, v: Decimal) {
        self.values.push_back(v);
        if self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    fn is_full(&self) -> bool {
        self.values.len() >= self.capacity
    }

    fn mean(&self) -> Decimal {
        if self.values.is_empty() {
            return Decimal::ZERO;
        }
        self.values.iter().sum::<Decimal>() / Decimal::from(self.values.len())
    }
}

/// Long when the fast SMA crosses above the slow SMA, exit when it crosses
/// back below. One crossover in, one out; no pyramiding.
pub struct MovingAverageStrategy {
    id: String,
    fast_period: usize,
    slow_period: usize,
    fast: HashMap<Symbol, RollingMean>,
    slow: HashMap<Symbol, RollingMean>,
    was_above: HashMap<Symbol, bool>,
}

impl MovingAverageStrategy {
    pub fn new(id: impl Into<String>, fast_period: usize, slow_period: usize) -> Self {
        Self {
            id: id.into(),
            fast_period,
            slow_period,
            fast: HashMap::new(),
            slow: HashMap::new(),
            was_above: HashMap::new(),
        }
    }
}

impl PipelineStrategy for MovingAverageStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_bar(&mut self, bar: &Bar) -> GbResult<Vec<SignalEvent>> {
        let fast = self
            .fast
            .entry(bar.symbol.clone())
            .or_insert_with(|| RollingMean::new(self.fast_period));
        fast.push(bar.close);
        let slow = self
            .slow
            .entry(bar.symbol.clone())
            .or_insert_with(|| RollingMean::new(self.slow_period));
        slow.push(bar.close);

        if !fast.is_full() || !slow.is_full() {
            return Ok(Vec::new());
        }

        let is_above = fast.mean() > slow.mean();
        // Pre-full state counts as "below": the first bar where both windows
        // are full is itself a valid crossover if the fast MA already leads.
        let was_above = self.was_above.get(&bar.symbol).copied().unwrap_or(false);
        self.was_above.insert(bar.symbol.clone(), is_above);

        Ok(if was_above != is_above {
            let direction = if is_above { SignalDirection::Long } else { SignalDirection::Exit };
            vec![SignalEvent {
                strategy_id: self.id.clone(),
                symbol: bar.symbol.clone(),
                direction,
                strength: Decimal::ONE,
                reason: format!("sma{}/sma{} crossover", self.fast_period, self.slow_period),
                target_weight: None,
            }]
        } else {
            Vec::new()
        })
    }
}

/// Long on a close above the prior `lookback`-bar high, exit on a close
/// below the prior `lookback`-bar low (a Donchian-channel breakout).
pub struct BreakoutStrategy {
    id: String,
    lookback: usize,
    highs: HashMap<Symbol, VecDeque<Decimal>>,
    lows: HashMap<Symbol, VecDeque<Decimal>>,
    in_position: HashMap<Symbol, bool>,
}

impl BreakoutStrategy {
    pub fn new(id: impl Into<String>, lookback: usize) -> Self {
        Self {
            id: id.into(),
            lookback,
            highs: HashMap::new(),
            lows: HashMap::new(),
            in_position: HashMap::new(),
        }
    }
}

impl PipelineStrategy for BreakoutStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_bar(&mut self, bar: &Bar) -> GbResult<Vec<SignalEvent>> {
        let highs = self.highs.entry(bar.symbol.clone()).or_default();
        let lows = self.lows.entry(bar.symbol.clone()).or_default();

        let prior_high = highs.iter().copied().reduce(Decimal::max);
        let prior_low = lows.iter().copied().reduce(Decimal::min);

        highs.push_back(bar.high);
        lows.push_back(bar.low);
        if highs.len() > self.lookback {
            highs.pop_front();
        }
        if lows.len() > self.lookback {
            lows.pop_front();
        }

        let (Some(prior_high), Some(prior_low)) = (prior_high, prior_low) else {
            return Ok(Vec::new());
        };

        let in_position = self.in_position.get(&bar.symbol).copied().unwrap_or(false);

        if !in_position && bar.close > prior_high {
            self.in_position.insert(bar.symbol.clone(), true);
            return Ok(vec![SignalEvent {
                strategy_id: self.id.clone(),
                symbol: bar.symbol.clone(),
                direction: SignalDirection::Long,
                strength: Decimal::ONE,
                reason: format!("breakout above {}-bar high {prior_high}", self.lookback),
                target_weight: None,
            }]);
        }

        if in_position && bar.close < prior_low {
            self.in_position.insert(bar.symbol.clone(), false);
            return Ok(vec![SignalEvent {
                strategy_id: self.id.clone(),
                symbol: bar.symbol.clone(),
                direction: SignalDirection::Exit,
                strength: Decimal::ONE,
                reason: format!("breakdown below {}-bar low {prior_low}", self.lookback),
                target_weight: None,
            }]);
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gb_types::Resolution;
    use rust_decimal_macros::dec;

    fn bar(symbol: &Symbol, close: Decimal) -> Bar {
        Bar::new(symbol.clone(), Utc::now(), close, close, close, close, dec!(1000), Resolution::Day)
    }

    #[test]
    fn moving_average_emits_nothing_until_both_windows_are_full() {
        let symbol = Symbol::equity("AAPL");
        let mut strat = MovingAverageStrategy::new("ma", 2, 3);
        assert!(strat.on_bar(&bar(&symbol, dec!(100))).unwrap().is_empty());
        assert!(strat.on_bar(&bar(&symbol, dec!(101))).unwrap().is_empty());
    }

    #[test]
    fn moving_average_emits_long_on_the_first_fully_formed_bar_when_fast_already_leads() {
        // Monotonically rising closes never produce a false->true transition
        // after the windows fill; the fast MA leads from the first full bar
        // onward, and that itself must count as the entry signal.
        let symbol = Symbol::equity("AAPL");
        let mut strat = MovingAverageStrategy::new("ma", 2, 4);
        let closes = [dec!(90), dec!(91), dec!(92), dec!(93)];
        let mut last = Vec::new();
        for close in closes {
            last = strat.on_bar(&bar(&symbol, close)).unwrap();
        }
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].direction, SignalDirection::Long);
    }

    #[test]
    fn moving_average_emits_long_then_exit_on_a_genuine_crossover() {
        let symbol = Symbol::equity("AAPL");
        let mut strat = MovingAverageStrategy::new("ma", 2, 4);
        let closes = [dec!(100), dec!(100), dec!(100), dec!(100), dec!(130), dec!(60)];
        let mut signals = Vec::new();
        for close in closes {
            signals.push(strat.on_bar(&bar(&symbol, close)).unwrap());
        }
        // First full bar: fast(100,100)=100 == slow(...)=100, not strictly
        // above, so no entry yet; bar 5 pushes the fast MA above the slow
        // one (Long), bar 6 pulls it back below (Exit).
        assert_eq!(signals[3].len(), 0);
        assert_eq!(signals[4].len(), 1);
        assert_eq!(signals[4][0].direction, SignalDirection::Long);
        assert_eq!(signals[5].len(), 1);
        assert_eq!(signals[5][0].direction, SignalDirection::Exit);
    }

    #[test]
    fn breakout_requires_full_lookback_before_signaling() {
        let symbol = Symbol::equity("AAPL");
        let mut strat = BreakoutStrategy::new("brk", 3);
        assert!(strat.on_bar(&bar(&symbol, dec!(100))).unwrap().is_empty());
        assert!(strat.on_bar(&bar(&symbol, dec!(101))).unwrap().is_empty());
    }

    #[test]
    fn breakout_emits_long_above_prior_high() {
        let symbol = Symbol::equity("AAPL");
        let mut strat = BreakoutStrategy::new("brk", 2);
        strat.on_bar(&bar(&symbol, dec!(100))).unwrap();
        strat.on_bar(&bar(&symbol, dec!(101))).unwrap();
        let signals = strat.on_bar(&bar(&symbol, dec!(110))).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, SignalDirection::Long);
    }
}
