//! Reporter chain: passive observers of fill/metrics events that accumulate
//! the artifacts a finished run exposes. None of these touch the bus
//! directly; `engine.rs` wires their methods into handler closures.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use gb_types::{Fill, GbError, GbResult, MetricsEvent};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
    pub cash: Decimal,
}

/// Accumulates one equity-curve point per metrics snapshot and derives max
/// drawdown from the accumulated curve.
#[derive(Debug, Default, Clone)]
pub struct EquityCurveReporter {
    pub points: Vec<EquityPoint>,
}

impl EquityCurveReporter {
    pub fn on_metrics(&mut self, at: DateTime<Utc>, metrics: &MetricsEvent) {
        self.points.push(EquityPoint { timestamp: at, equity: metrics.equity, cash: metrics.cash });
    }

    pub fn max_drawdown(&self) -> Decimal {
        let mut peak = Decimal::ZERO;
        let mut worst = Decimal::ZERO;
        for point in &self.points {
            if point.equity > peak {
                peak = point.equity;
            }
            if peak > Decimal::ZERO {
                let drawdown = (peak - point.equity) / peak;
                if drawdown > worst {
                    worst = drawdown;
                }
            }
        }
        worst
    }
}

/// Keeps every fill and the full metrics history for post-run inspection;
/// the orchestrator streams this to subscribers rather than this reporter
/// doing any I/O of its own.
#[derive(Debug, Default, Clone)]
pub struct DetailedReporter {
    pub fills: Vec<Fill>,
    pub metrics_history: Vec<MetricsEvent>,
}

impl DetailedReporter {
    pub fn on_fill(&mut self, fill: Fill) {
        self.fills.push(fill);
    }

    pub fn on_metrics(&mut self, metrics: MetricsEvent) {
        self.metrics_history.push(metrics);
    }
}

/// Writes a trade log as CSV at run completion. Each row carries the
/// realized P&L the portfolio held immediately after that fill was applied,
/// not the fill's own P&L in isolation — a partial close's realized P&L is
/// whatever the portfolio's running total was at that point.
#[derive(Debug)]
pub struct TradeLogReporter {
    run_id: String,
    path: PathBuf,
    rows: Vec<(Fill, Decimal)>,
}

impl TradeLogReporter {
    pub fn new(run_id: impl Into<String>, path: PathBuf) -> Self {
        Self { run_id: run_id.into(), path, rows: Vec::new() }
    }

    pub fn on_fill(&mut self, fill: Fill, realized_pnl: Decimal) {
        self.rows.push((fill, realized_pnl));
    }

    pub fn flush(&self) -> GbResult<()> {
        let mut writer = csv::Writer::from_path(&self.path)
            .map_err(|e| GbError::Internal(format!("trade log open failed: {e}")))?;
        writer
            .write_record([
                "run_id",
                "executed_at",
                "symbol",
                "side",
                "quantity",
                "price",
                "commission",
                "realized_pnl",
            ])
            .map_err(|e| GbError::Internal(format!("trade log write failed: {e}")))?;
        for (fill, realized_pnl) in &self.rows {
            writer
                .write_record([
                    self.run_id.clone(),
                    fill.executed_at.to_rfc3339(),
                    fill.symbol.to_string(),
                    format!("{:?}", fill.side),
                    fill.quantity.to_string(),
                    fill.price.to_string(),
                    fill.commission.to_string(),
                    realized_pnl.to_string(),
                ])
                .map_err(|e| GbError::Internal(format!("trade log write failed: {e}")))?;
        }
        writer.flush().map_err(|e| GbError::Internal(format!("trade log flush failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[test]
    fn max_drawdown_tracks_peak_to_trough() {
        let mut reporter = EquityCurveReporter::default();
        let now = Utc::now();
        let metrics = |equity: Decimal| MetricsEvent {
            equity,
            cash: equity,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            holdings: HashMap::new(),
        };
        reporter.on_metrics(now, &metrics(dec!(100_000)));
        reporter.on_metrics(now, &metrics(dec!(120_000)));
        reporter.on_metrics(now, &metrics(dec!(90_000)));
        assert_eq!(reporter.max_drawdown(), dec!(0.25));
    }

    #[test]
    fn trade_log_writes_a_header_and_one_row_per_fill() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        let mut reporter = TradeLogReporter::new("run-1", path.clone());
        reporter.on_fill(
            Fill::new(
                uuid::Uuid::new_v4(),
                gb_types::Symbol::equity("AAPL"),
                gb_types::Side::Buy,
                dec!(10),
                dec!(100),
                dec!(1),
                "ma".into(),
            ),
            dec!(0),
        );
        reporter.flush().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "run_id,executed_at,symbol,side,quantity,price,commission,realized_pnl");
        assert_eq!(lines.count(), 1);
    }
}
