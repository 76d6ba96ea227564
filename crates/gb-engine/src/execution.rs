//! Execution pipeline stage: resting order -> timed, costed fill.
//!
//! Orders queue per symbol until the next bar for that symbol arrives, at
//! which point fill timing, slippage, commission, a per-bar volume cap, and
//! limit/stop trigger rules decide what (if anything) fills.

use std::collections::{HashMap, VecDeque};

use gb_types::{Bar, Fill, Order, OrderType, Side, Symbol, TimeInForce};
use rust_decimal::Decimal;

/// Which bar price a fill is anchored to. `NextOpen` is the default: filling
/// against the same bar's close that produced the signal is look-ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillTiming {
    CurrentClose,
    NextOpen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlippageModel {
    None,
    /// A fixed fraction of price, worse for the order's direction (buys pay
    /// up, sells give back).
    FixedBps(Decimal),
}

#[derive(Debug, Clone, Copy)]
pub struct CommissionModel {
    pub per_share: Decimal,
    pub percentage: Decimal,
    pub minimum: Decimal,
}

impl CommissionModel {
    pub fn compute(&self, quantity: Decimal, price: Decimal) -> Decimal {
        let notional = quantity * price;
        (self.per_share * quantity + notional * self.percentage).max(self.minimum)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub fill_timing: FillTiming,
    pub slippage: SlippageModel,
    pub commission: CommissionModel,
    /// Cap on the fraction of a bar's volume one fill may consume; the
    /// remainder stays resting, subject to the order's time-in-force.
    pub max_volume_fraction: Decimal,
    /// Bars an order may rest unfilled before it is dropped as stale
    /// (GTC orders are exempt).
    pub staleness_bars: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fill_timing: FillTiming::NextOpen,
            slippage: SlippageModel::FixedBps(Decimal::new(5, 4)),
            commission: CommissionModel {
                per_share: Decimal::ZERO,
                percentage: Decimal::new(5, 4),
                minimum: Decimal::ZERO,
            },
            max_volume_fraction: Decimal::new(10, 2),
            staleness_bars: 5,
        }
    }
}

struct Resting {
    order: Order,
    bars_waited: u32,
}

/// Per-symbol resting-order book and fill simulator.
pub struct ExecutionHandler {
    config: ExecutionConfig,
    pending: HashMap<Symbol, VecDeque<Resting>>,
}

impl ExecutionHandler {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config, pending: HashMap::new() }
    }

    pub fn on_order(&mut self, order: Order) {
        self.pending.entry(order.symbol.clone()).or_default().push_back(Resting { order, bars_waited: 0 });
    }

    /// Processes one new bar for `bar.symbol`, returning zero or more fills
    /// for orders resting against it.
    pub fn on_market(&mut self, bar: &Bar) -> Vec<Fill> {
        let mut fills = Vec::new();
        let Some(queue) = self.pending.get_mut(&bar.symbol) else {
            return fills;
        };
        if queue.is_empty() {
            return fills;
        }

        let mut remaining_volume = bar.volume * self.config.max_volume_fraction;
        let mut still_resting = VecDeque::new();

        while let Some(mut resting) = queue.pop_front() {
            if remaining_volume <= Decimal::ZERO {
                still_resting.push_back(resting);
                continue;
            }

            let Some(base_price) = self.trigger_price(&resting.order, bar) else {
                resting.bars_waited += 1;
                if !self.is_stale(&resting.order, resting.bars_waited) {
                    still_resting.push_back(resting);
                }
                continue;
            };

            let fillable = resting.order.remaining_quantity.min(remaining_volume);
            if fillable <= Decimal::ZERO {
                still_resting.push_back(resting);
                continue;
            }
            remaining_volume -= fillable;

            let fill_price = self.apply_slippage(base_price, resting.order.side);
            let commission = self.config.commission.compute(fillable, fill_price);
            let fill = Fill::new(
                resting.order.id,
                resting.order.symbol.clone(),
                resting.order.side,
                fillable,
                fill_price,
                commission,
                resting.order.strategy_id.clone(),
            );
            resting.order.fill(fillable, fill_price);
            fills.push(fill);

            if resting.order.remaining_quantity > Decimal::ZERO {
                let keep = !matches!(resting.order.time_in_force, TimeInForce::IOC | TimeInForce::FOK);
                if keep {
                    resting.bars_waited += 1;
                    still_resting.push_back(resting);
                }
            }
        }

        *queue = still_resting;
        fills
    }

    /// The price a trigger (if any) fires at, before slippage. `None` means
    /// the order does not trigger against this bar and keeps resting.
    fn trigger_price(&self, order: &Order, bar: &Bar) -> Option<Decimal> {
        let base = match self.config.fill_timing {
            FillTiming::CurrentClose => bar.close,
            FillTiming::NextOpen => bar.open,
        };
        match &order.order_type {
            OrderType::Market => Some(base),
            OrderType::Limit { price } => match order.side {
                Side::Buy if bar.low <= *price => Some(base.min(*price)),
                Side::Sell if bar.high >= *price => Some(base.max(*price)),
                _ => None,
            },
            OrderType::Stop { stop_price } => match order.side {
                Side::Buy if bar.high >= *stop_price => Some(base.max(*stop_price)),
                Side::Sell if bar.low <= *stop_price => Some(base.min(*stop_price)),
                _ => None,
            },
            OrderType::StopLimit { stop_price, limit_price } => {
                let triggered = match order.side {
                    Side::Buy => bar.high >= *stop_price,
                    Side::Sell => bar.low <= *stop_price,
                };
                if !triggered {
                    return None;
                }
                match order.side {
                    Side::Buy if bar.low <= *limit_price => Some(base.min(*limit_price)),
                    Side::Sell if bar.high >= *limit_price => Some(base.max(*limit_price)),
                    _ => None,
                }
            }
        }
    }

    fn apply_slippage(&self, price: Decimal, side: Side) -> Decimal {
        match self.config.slippage {
            SlippageModel::None => price,
            SlippageModel::FixedBps(bps) => match side {
                Side::Buy => price * (Decimal::ONE + bps),
                Side::Sell => price * (Decimal::ONE - bps),
            },
        }
    }

    fn is_stale(&self, order: &Order, bars_waited: u32) -> bool {
        bars_waited >= self.config.staleness_bars && order.time_in_force != TimeInForce::GTC
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gb_types::{Order, Resolution};
    use rust_decimal_macros::dec;

    fn bar(symbol: &Symbol, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar::new(symbol.clone(), Utc::now(), open, high, low, close, dec!(10_000), Resolution::Day)
    }

    #[test]
    fn market_order_fills_at_next_open_with_buy_slippage() {
        let mut handler = ExecutionHandler::new(ExecutionConfig {
            fill_timing: FillTiming::NextOpen,
            slippage: SlippageModel::FixedBps(dec!(0.01)),
            ..ExecutionConfig::default()
        });
        let symbol = Symbol::equity("AAPL");
        let order = Order::market_order(symbol.clone(), Side::Buy, dec!(10), "s".into());
        handler.on_order(order);

        let fills = handler.on_market(&bar(&symbol, dec!(100), dec!(101), dec!(99), dec!(100.5)));
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, dec!(101.00));
    }

    #[test]
    fn limit_buy_does_not_trigger_above_its_price() {
        let mut handler = ExecutionHandler::new(ExecutionConfig::default());
        let symbol = Symbol::equity("AAPL");
        let order = Order::limit_order(symbol.clone(), Side::Buy, dec!(10), dec!(90), "s".into());
        handler.on_order(order);

        let fills = handler.on_market(&bar(&symbol, dec!(100), dec!(101), dec!(99), dec!(100)));
        assert!(fills.is_empty());
    }

    #[test]
    fn volume_cap_partially_fills_and_keeps_remainder_resting() {
        let mut handler = ExecutionHandler::new(ExecutionConfig {
            max_volume_fraction: dec!(0.01),
            ..ExecutionConfig::default()
        });
        let symbol = Symbol::equity("AAPL");
        let mut order = Order::market_order(symbol.clone(), Side::Buy, dec!(1000), "s".into());
        order.time_in_force = TimeInForce::GTC;
        handler.on_order(order);

        let fills = handler.on_market(&bar(&symbol, dec!(100), dec!(101), dec!(99), dec!(100)));
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, dec!(100));
        assert_eq!(handler.pending.get(&symbol).unwrap().len(), 1);
    }

    #[test]
    fn ioc_residual_is_dropped_not_kept_resting() {
        let mut handler = ExecutionHandler::new(ExecutionConfig {
            max_volume_fraction: dec!(0.01),
            ..ExecutionConfig::default()
        });
        let symbol = Symbol::equity("AAPL");
        let mut order = Order::market_order(symbol.clone(), Side::Buy, dec!(1000), "s".into());
        order.time_in_force = TimeInForce::IOC;
        handler.on_order(order);

        let fills = handler.on_market(&bar(&symbol, dec!(100), dec!(101), dec!(99), dec!(100)));
        assert_eq!(fills.len(), 1);
        assert!(handler.pending.get(&symbol).unwrap().is_empty());
    }
}
