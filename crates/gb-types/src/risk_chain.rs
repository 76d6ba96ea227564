//! Pre-trade risk chain: an ordered list of rules consulted by the portfolio
//! before an approved signal becomes an `OrderEvent`.
//!
//! Distinct from [`crate::portfolio::RiskLimits`] (a parameter bag) and from
//! `gb-risk`'s continuous post-trade monitor: this chain runs synchronously,
//! inline in the bus dispatch, and can reject or modify an order before it is
//! ever published.

use rust_decimal::Decimal;

use crate::orders::{Order, OrderType, Side};
use crate::portfolio::Portfolio;

/// Outcome of one rule's evaluation. The chain short-circuits on the first
/// non-`Approve` result.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approve,
    Reject(String),
    Modify(Order),
}

/// Context a rule needs beyond the order itself: the portfolio as of the
/// last applied fill, the reference price (the last bar's close for the
/// order's symbol) used for notional and price-band checks, and the signed
/// quantity still resting in already-approved, not-yet-filled orders for
/// this symbol — without it, a rule like `MaxPositionRule` only ever sees
/// the last *filled* position and lets every bar's order through even while
/// several of them are simultaneously in flight against the same limit.
pub struct RiskContext<'a> {
    pub portfolio: &'a Portfolio,
    pub reference_price: Option<Decimal>,
    pub pending_quantity: Decimal,
}

/// One risk check in the chain. Implementors should be stateless or hold
/// only their own configured thresholds; portfolio state is read from the
/// context on every call, never cached.
pub trait RiskRule: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, order: &Order, ctx: &RiskContext) -> RiskDecision;
}

/// An ordered, short-circuiting chain of [`RiskRule`]s.
#[derive(Debug, Default)]
pub struct RiskChain {
    rules: Vec<Box<dyn RiskRule>>,
}

impl RiskChain {
    pub fn new(rules: Vec<Box<dyn RiskRule>>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: Box<dyn RiskRule>) {
        self.rules.push(rule);
    }

    /// Runs every rule in order, returning the first reject/modify, or
    /// `Approve` if every rule approves.
    pub fn evaluate(&self, order: &Order, ctx: &RiskContext) -> RiskDecision {
        for rule in &self.rules {
            match rule.check(order, ctx) {
                RiskDecision::Approve => continue,
                decision => return decision,
            }
        }
        RiskDecision::Approve
    }
}

fn signed_quantity(order: &Order) -> Decimal {
    match order.side {
        Side::Buy => order.quantity,
        Side::Sell => -order.quantity,
    }
}

fn post_fill_quantity(order: &Order, ctx: &RiskContext) -> Decimal {
    let current = ctx
        .portfolio
        .get_position(&order.symbol)
        .map(|p| p.quantity)
        .unwrap_or(Decimal::ZERO);
    current + ctx.pending_quantity + signed_quantity(order)
}

/// Rejects if the post-fill absolute quantity exceeds `limit`.
#[derive(Debug)]
pub struct MaxPositionRule {
    pub limit: Decimal,
}

impl RiskRule for MaxPositionRule {
    fn name(&self) -> &str {
        "max_position"
    }

    fn check(&self, order: &Order, ctx: &RiskContext) -> RiskDecision {
        let post_fill = post_fill_quantity(order, ctx).abs();
        if post_fill > self.limit {
            return RiskDecision::Reject(format!(
                "post-fill position {post_fill} exceeds max_position limit {}",
                self.limit
            ));
        }
        RiskDecision::Approve
    }
}

/// Rejects a buy if its notional plus estimated fees exceeds available cash.
#[derive(Debug)]
pub struct BuyingPowerRule {
    pub fee_rate: Decimal,
}

impl RiskRule for BuyingPowerRule {
    fn name(&self) -> &str {
        "buying_power"
    }

    fn check(&self, order: &Order, ctx: &RiskContext) -> RiskDecision {
        if order.side != Side::Buy {
            return RiskDecision::Approve;
        }
        let Some(price) = ctx.reference_price else {
            return RiskDecision::Approve;
        };
        let notional = order.quantity * price;
        let estimated_cost = notional + notional * self.fee_rate;
        let available = ctx.portfolio.get_available_cash();
        if estimated_cost > available {
            return RiskDecision::Reject(format!(
                "order cost {estimated_cost} exceeds available cash {available}"
            ));
        }
        RiskDecision::Approve
    }
}

/// Rejects if post-fill exposure to the symbol exceeds `max_fraction` of equity.
#[derive(Debug)]
pub struct ConcentrationRule {
    pub max_fraction: Decimal,
}

impl RiskRule for ConcentrationRule {
    fn name(&self) -> &str {
        "concentration"
    }

    fn check(&self, order: &Order, ctx: &RiskContext) -> RiskDecision {
        let Some(price) = ctx.reference_price else {
            return RiskDecision::Approve;
        };
        if ctx.portfolio.total_equity <= Decimal::ZERO {
            return RiskDecision::Approve;
        }
        let post_fill = post_fill_quantity(order, ctx).abs();
        let exposure = post_fill * price;
        let fraction = exposure / ctx.portfolio.total_equity;
        if fraction > self.max_fraction {
            return RiskDecision::Reject(format!(
                "post-fill concentration {fraction:.4} exceeds limit {}",
                self.max_fraction
            ));
        }
        RiskDecision::Approve
    }
}

/// Rejects if the order's reference price deviates from the last close by
/// more than `band` (a fraction). Market orders carry no explicit price and
/// always pass.
#[derive(Debug)]
pub struct PriceBandRule {
    pub band: Decimal,
}

impl RiskRule for PriceBandRule {
    fn name(&self) -> &str {
        "price_band"
    }

    fn check(&self, order: &Order, ctx: &RiskContext) -> RiskDecision {
        let order_price = match &order.order_type {
            OrderType::Limit { price } => *price,
            OrderType::Stop { stop_price } => *stop_price,
            OrderType::StopLimit { limit_price, .. } => *limit_price,
            OrderType::Market => return RiskDecision::Approve,
        };
        let Some(reference) = ctx.reference_price else {
            return RiskDecision::Approve;
        };
        if reference == Decimal::ZERO {
            return RiskDecision::Approve;
        }
        let deviation = (order_price - reference).abs() / reference;
        if deviation > self.band {
            return RiskDecision::Reject(format!(
                "order price {order_price} deviates {deviation:.4} from reference {reference}, exceeds band {}",
                self.band
            ));
        }
        RiskDecision::Approve
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Symbol;
    use rust_decimal_macros::dec;

    fn portfolio_with_cash(cash: Decimal) -> Portfolio {
        Portfolio::new("test".into(), cash)
    }

    fn market_order(symbol: Symbol, side: Side, qty: Decimal) -> Order {
        Order::market_order(symbol, side, qty, "strat".into())
    }

    #[test]
    fn max_position_rejects_over_limit() {
        let rule = MaxPositionRule { limit: dec!(200) };
        let portfolio = portfolio_with_cash(dec!(100_000));
        let ctx = RiskContext {
            portfolio: &portfolio,
            reference_price: Some(dec!(100)),
            pending_quantity: Decimal::ZERO,
        };
        let order = market_order(Symbol::equity("AAPL"), Side::Buy, dec!(300));
        assert!(matches!(rule.check(&order, &ctx), RiskDecision::Reject(_)));
    }

    #[test]
    fn max_position_approves_within_limit() {
        let rule = MaxPositionRule { limit: dec!(200) };
        let portfolio = portfolio_with_cash(dec!(100_000));
        let ctx = RiskContext {
            portfolio: &portfolio,
            reference_price: Some(dec!(100)),
            pending_quantity: Decimal::ZERO,
        };
        let order = market_order(Symbol::equity("AAPL"), Side::Buy, dec!(100));
        assert_eq!(rule.check(&order, &ctx), RiskDecision::Approve);
    }

    #[test]
    fn buying_power_rejects_insufficient_cash() {
        let rule = BuyingPowerRule { fee_rate: dec!(0) };
        let portfolio = portfolio_with_cash(dec!(1_000));
        let ctx = RiskContext {
            portfolio: &portfolio,
            reference_price: Some(dec!(100)),
            pending_quantity: Decimal::ZERO,
        };
        let order = market_order(Symbol::equity("AAPL"), Side::Buy, dec!(100));
        assert!(matches!(rule.check(&order, &ctx), RiskDecision::Reject(_)));
    }

    #[test]
    fn buying_power_ignores_sells() {
        let rule = BuyingPowerRule { fee_rate: dec!(0) };
        let portfolio = portfolio_with_cash(dec!(0));
        let ctx = RiskContext {
            portfolio: &portfolio,
            reference_price: Some(dec!(100)),
            pending_quantity: Decimal::ZERO,
        };
        let order = market_order(Symbol::equity("AAPL"), Side::Sell, dec!(100));
        assert_eq!(rule.check(&order, &ctx), RiskDecision::Approve);
    }

    #[test]
    fn concentration_rejects_over_fraction() {
        let rule = ConcentrationRule { max_fraction: dec!(0.25) };
        let mut portfolio = portfolio_with_cash(dec!(100_000));
        portfolio.total_equity = dec!(100_000);
        let ctx = RiskContext {
            portfolio: &portfolio,
            reference_price: Some(dec!(150)),
            pending_quantity: Decimal::ZERO,
        };
        // 200 shares * $150 = $30k -> 30% > 25%
        let order = market_order(Symbol::equity("AAPL"), Side::Buy, dec!(200));
        assert!(matches!(rule.check(&order, &ctx), RiskDecision::Reject(_)));
    }

    #[test]
    fn price_band_rejects_far_limit_price() {
        let rule = PriceBandRule { band: dec!(0.02) };
        let portfolio = portfolio_with_cash(dec!(100_000));
        let ctx = RiskContext {
            portfolio: &portfolio,
            reference_price: Some(dec!(100)),
            pending_quantity: Decimal::ZERO,
        };
        let order = Order::limit_order(Symbol::equity("AAPL"), Side::Buy, dec!(10), dec!(120), "strat".into());
        assert!(matches!(rule.check(&order, &ctx), RiskDecision::Reject(_)));
    }

    #[test]
    fn price_band_approves_market_orders_unconditionally() {
        let rule = PriceBandRule { band: dec!(0.0001) };
        let portfolio = portfolio_with_cash(dec!(100_000));
        let ctx = RiskContext {
            portfolio: &portfolio,
            reference_price: Some(dec!(100)),
            pending_quantity: Decimal::ZERO,
        };
        let order = market_order(Symbol::equity("AAPL"), Side::Buy, dec!(10));
        assert_eq!(rule.check(&order, &ctx), RiskDecision::Approve);
    }

    #[test]
    fn chain_short_circuits_on_first_reject() {
        let chain = RiskChain::new(vec![
            Box::new(MaxPositionRule { limit: dec!(50) }),
            Box::new(BuyingPowerRule { fee_rate: dec!(0) }),
        ]);
        let portfolio = portfolio_with_cash(dec!(0));
        let ctx = RiskContext {
            portfolio: &portfolio,
            reference_price: Some(dec!(100)),
            pending_quantity: Decimal::ZERO,
        };
        let order = market_order(Symbol::equity("AAPL"), Side::Buy, dec!(100));
        // Would fail both rules; chain should still just report one reject.
        assert!(matches!(chain.evaluate(&order, &ctx), RiskDecision::Reject(_)));
    }

    #[test]
    fn chain_approves_when_all_rules_pass() {
        let chain = RiskChain::new(vec![Box::new(MaxPositionRule { limit: dec!(1000) })]);
        let portfolio = portfolio_with_cash(dec!(100_000));
        let ctx = RiskContext {
            portfolio: &portfolio,
            reference_price: Some(dec!(100)),
            pending_quantity: Decimal::ZERO,
        };
        let order = market_order(Symbol::equity("AAPL"), Side::Buy, dec!(10));
        assert_eq!(chain.evaluate(&order, &ctx), RiskDecision::Approve);
    }
}
