//! Portfolio pipeline stage: signal -> sized order (pending risk chain), and
//! fill -> updated cash/positions/metrics. Wraps `gb_types::Portfolio`
//! and `gb_types::RiskChain` unchanged; this module only adds the sizing
//! arithmetic a bus-native portfolio stage needs that the teacher's
//! `Portfolio` never had to do on its own.

use std::collections::HashMap;

use gb_types::{
    Fill, MetricsEvent, Order, Portfolio, RiskChain, RiskContext, RiskDecision, RiskRejectionEvent,
    SignalDirection, SignalEvent, Side, Symbol,
};
use rust_decimal::Decimal;

/// How a signal's conviction (and optional `target_weight`) becomes order
/// quantity.
#[derive(Debug, Clone)]
pub struct SizingPolicy {
    /// Quantity used when a signal carries no `target_weight`, scaled by
    /// `SignalEvent::strength`.
    pub default_quantity: Decimal,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self { default_quantity: Decimal::ONE }
    }
}

pub enum PortfolioOutcome {
    Order(Order),
    Rejected(RiskRejectionEvent),
    NoOp,
}

pub struct PortfolioStage {
    pub portfolio: Portfolio,
    risk_chain: RiskChain,
    sizing: SizingPolicy,
    last_prices: HashMap<Symbol, Decimal>,
    /// Signed quantity of already-approved orders not yet reflected in
    /// `portfolio`'s filled position. Execution may take several bars to
    /// fill (or partially fill) a resting order, so the risk chain must see
    /// this alongside the filled position or a limit can be blown past by
    /// several orders simultaneously in flight.
    pending_quantity: HashMap<Symbol, Decimal>,
}

fn signed_quantity(side: Side, quantity: Decimal) -> Decimal {
    match side {
        Side::Buy => quantity,
        Side::Sell => -quantity,
    }
}

impl PortfolioStage {
    pub fn new(portfolio: Portfolio, risk_chain: RiskChain, sizing: SizingPolicy) -> Self {
        Self {
            portfolio,
            risk_chain,
            sizing,
            last_prices: HashMap::new(),
            pending_quantity: HashMap::new(),
        }
    }

    /// Records the latest mark for `symbol` and refreshes unrealized P&L
    /// and equity across the whole portfolio.
    pub fn on_market_price(&mut self, symbol: &Symbol, price: Decimal) {
        self.last_prices.insert(symbol.clone(), price);
        self.portfolio.update_market_prices(&self.last_prices);
    }

    /// Sizes the signal into an order, consults the risk chain, and reports
    /// the outcome: approved order, rejection (for the bridge/reporters to
    /// surface), or a silent no-op for a zero-strength or flat-exit signal.
    pub fn on_signal(&mut self, signal: &SignalEvent) -> PortfolioOutcome {
        if signal.strength <= Decimal::ZERO {
            return PortfolioOutcome::NoOp;
        }
        let Some(order) = self.build_order(signal) else {
            return PortfolioOutcome::NoOp;
        };

        let reference_price = self.last_prices.get(&signal.symbol).copied();
        let pending_quantity = self.pending_quantity.get(&signal.symbol).copied().unwrap_or(Decimal::ZERO);
        let ctx = RiskContext { portfolio: &self.portfolio, reference_price, pending_quantity };
        match self.risk_chain.evaluate(&order, &ctx) {
            RiskDecision::Approve => {
                self.add_pending(&order);
                PortfolioOutcome::Order(order)
            }
            RiskDecision::Modify(modified) => {
                self.add_pending(&modified);
                PortfolioOutcome::Order(modified)
            }
            RiskDecision::Reject(reason) => PortfolioOutcome::Rejected(RiskRejectionEvent {
                strategy_id: signal.strategy_id.clone(),
                symbol: signal.symbol.clone(),
                reason,
                rule: "risk_chain".into(),
            }),
        }
    }

    fn add_pending(&mut self, order: &Order) {
        *self.pending_quantity.entry(order.symbol.clone()).or_insert(Decimal::ZERO) +=
            signed_quantity(order.side, order.quantity);
    }

    fn build_order(&self, signal: &SignalEvent) -> Option<Order> {
        let position_qty = self
            .portfolio
            .get_position(&signal.symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO);

        let (side, quantity) = match signal.direction {
            SignalDirection::Exit => {
                if position_qty == Decimal::ZERO {
                    return None;
                }
                let side = if position_qty > Decimal::ZERO { Side::Sell } else { Side::Buy };
                (side, position_qty.abs())
            }
            SignalDirection::Long | SignalDirection::Short => {
                let quantity = match signal.target_weight {
                    Some(weight) => {
                        let price = self.last_prices.get(&signal.symbol).copied().unwrap_or(Decimal::ZERO);
                        if price <= Decimal::ZERO || self.portfolio.total_equity <= Decimal::ZERO {
                            self.sizing.default_quantity
                        } else {
                            (weight * self.portfolio.total_equity / price).abs()
                        }
                    }
                    None => self.sizing.default_quantity * signal.strength,
                };
                let side = if matches!(signal.direction, SignalDirection::Long) { Side::Buy } else { Side::Sell };
                (side, quantity)
            }
        };

        if quantity <= Decimal::ZERO {
            return None;
        }

        let mut order = Order::market_order(signal.symbol.clone(), side, quantity, signal.strategy_id.clone());
        order.metadata = serde_json::json!({ "signal_reason": signal.reason });
        Some(order)
    }

    /// Applies a fill to cash/positions and returns the resulting snapshot.
    /// Releases the filled quantity from the pending-order tracker: a
    /// partial fill releases only what it filled, leaving the order's
    /// remainder still counted as pending until it too fills.
    pub fn on_fill(&mut self, fill: &Fill) -> MetricsEvent {
        self.portfolio.apply_fill(fill);
        if let Some(pending) = self.pending_quantity.get_mut(&fill.symbol) {
            *pending -= signed_quantity(fill.side, fill.quantity);
        }
        self.to_metrics()
    }

    pub fn to_metrics(&self) -> MetricsEvent {
        let holdings = self.portfolio.positions.iter().map(|(s, p)| (s.clone(), p.quantity)).collect();
        MetricsEvent {
            equity: self.portfolio.total_equity,
            cash: self.portfolio.cash,
            realized_pnl: self.portfolio.total_realized_pnl,
            unrealized_pnl: self.portfolio.total_unrealized_pnl,
            holdings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_types::{MaxPositionRule, OrderStatus};
    use rust_decimal_macros::dec;

    fn stage(cash: Decimal, rules: RiskChain) -> PortfolioStage {
        PortfolioStage::new(Portfolio::new("test".into(), cash), rules, SizingPolicy { default_quantity: dec!(10) })
    }

    #[test]
    fn long_signal_produces_buy_order_when_approved() {
        let mut stage = stage(dec!(100_000), RiskChain::default());
        let symbol = Symbol::equity("AAPL");
        stage.on_market_price(&symbol, dec!(100));
        let outcome = stage.on_signal(&SignalEvent {
            strategy_id: "ma".into(),
            symbol,
            direction: SignalDirection::Long,
            strength: dec!(1),
            reason: "test".into(),
            target_weight: None,
        });
        match outcome {
            PortfolioOutcome::Order(order) => {
                assert_eq!(order.side, Side::Buy);
                assert_eq!(order.quantity, dec!(10));
                assert_eq!(order.status, OrderStatus::Pending);
            }
            _ => panic!("expected an order"),
        }
    }

    #[test]
    fn risk_chain_rejection_surfaces_as_rejection() {
        let chain = RiskChain::new(vec![Box::new(MaxPositionRule { limit: dec!(1) })]);
        let mut stage = stage(dec!(100_000), chain);
        let symbol = Symbol::equity("AAPL");
        stage.on_market_price(&symbol, dec!(100));
        let outcome = stage.on_signal(&SignalEvent {
            strategy_id: "ma".into(),
            symbol,
            direction: SignalDirection::Long,
            strength: dec!(1),
            reason: "test".into(),
            target_weight: None,
        });
        assert!(matches!(outcome, PortfolioOutcome::Rejected(_)));
    }

    #[test]
    fn max_position_counts_resting_orders_not_yet_filled() {
        // Two approved buy orders of 100 shares each, neither filled yet,
        // already exhaust a 200-share limit: a third must be rejected even
        // though the filled position is still zero.
        let chain = RiskChain::new(vec![Box::new(MaxPositionRule { limit: dec!(200) })]);
        let mut stage = stage(dec!(100_000), chain);
        let symbol = Symbol::equity("AAPL");
        stage.on_market_price(&symbol, dec!(100));

        let signal = SignalEvent {
            strategy_id: "ma".into(),
            symbol: symbol.clone(),
            direction: SignalDirection::Long,
            strength: dec!(10), // sizing: default_quantity(10) * strength(10) = 100
            reason: "test".into(),
            target_weight: None,
        };

        assert!(matches!(stage.on_signal(&signal), PortfolioOutcome::Order(_)));
        assert!(matches!(stage.on_signal(&signal), PortfolioOutcome::Order(_)));
        assert!(matches!(stage.on_signal(&signal), PortfolioOutcome::Rejected(_)));
    }

    #[test]
    fn a_fill_releases_its_quantity_from_the_pending_tracker() {
        let chain = RiskChain::new(vec![Box::new(MaxPositionRule { limit: dec!(150) })]);
        let mut stage = stage(dec!(100_000), chain);
        let symbol = Symbol::equity("AAPL");
        stage.on_market_price(&symbol, dec!(100));

        let first = SignalEvent {
            strategy_id: "ma".into(),
            symbol: symbol.clone(),
            direction: SignalDirection::Long,
            strength: dec!(10), // 10 * default_quantity(10) = 100
            reason: "test".into(),
            target_weight: None,
        };
        let order = match stage.on_signal(&first) {
            PortfolioOutcome::Order(order) => order,
            _ => panic!("expected an order"),
        };
        assert_eq!(order.quantity, dec!(100));

        stage.on_fill(&Fill::new(order.id, symbol.clone(), order.side, order.quantity, dec!(100), dec!(0), "ma".into()));

        // Filled position is now 100. If the fill hadn't released the
        // pending tracker, this 50-share order would see 100 (position) +
        // 100 (stale pending) + 50 (new) = 250 > 150 and be rejected; with
        // the release it correctly sees 100 + 0 + 50 = 150, right at the
        // limit, and is approved.
        let second = SignalEvent {
            strategy_id: "ma".into(),
            symbol,
            direction: SignalDirection::Long,
            strength: dec!(5), // 5 * default_quantity(10) = 50
            reason: "test".into(),
            target_weight: None,
        };
        assert!(matches!(stage.on_signal(&second), PortfolioOutcome::Order(_)));
    }

    #[test]
    fn exit_signal_with_no_position_is_a_noop() {
        let mut stage = stage(dec!(100_000), RiskChain::default());
        let symbol = Symbol::equity("AAPL");
        let outcome = stage.on_signal(&SignalEvent {
            strategy_id: "ma".into(),
            symbol,
            direction: SignalDirection::Exit,
            strength: dec!(1),
            reason: "test".into(),
            target_weight: None,
        });
        assert!(matches!(outcome, PortfolioOutcome::NoOp));
    }

    #[test]
    fn fill_updates_cash_and_returns_metrics() {
        let mut stage = stage(dec!(100_000), RiskChain::default());
        let symbol = Symbol::equity("AAPL");
        let fill = Fill::new(
            uuid::Uuid::new_v4(),
            symbol,
            Side::Buy,
            dec!(10),
            dec!(100),
            dec!(1),
            "ma".into(),
        );
        let metrics = stage.on_fill(&fill);
        assert_eq!(metrics.cash, dec!(98_999));
    }
}
