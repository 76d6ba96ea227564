//! Minimal CSV-to-`Bar` loader for the `local_csv` data feed.
//!
//! `gb-data::loaders::BatchLoader::load_csv_file` is a stub (its real body
//! was removed along with a `polars` dependency and never replaced); rather
//! than resurrect that path, this reads bars directly with the `csv` crate,
//! since run assembly only ever needs a flat OHLCV sequence, not the
//! catalog/storage machinery `gb-data` wraps around it.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use gb_types::{Bar, DataError, GbError, GbResult, Resolution, Symbol};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

/// Reads a header row of `timestamp,open,high,low,close,volume` and returns
/// one `Bar` per data row, in file order.
pub fn load_bars(path: impl AsRef<Path>, symbol: &Symbol, resolution: Resolution) -> GbResult<Vec<Bar>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(GbError::Io)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut bars = Vec::new();
    for record in reader.deserialize() {
        let row: CsvRow = record.map_err(|e| {
            GbError::Data(DataError::LoadingFailed { message: format!("{}: {e}", path.display()) })
        })?;
        bars.push(Bar::new(symbol.clone(), row.timestamp, row.open, row.high, row.low, row.close, row.volume, resolution));
    }
    if bars.is_empty() {
        return Err(GbError::Data(DataError::LoadingFailed {
            message: format!("{}: no data rows", path.display()),
        }));
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_bars_in_file_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(file, "2024-01-01T00:00:00Z,100,101,99,100.5,1000").unwrap();
        writeln!(file, "2024-01-02T00:00:00Z,100.5,102,100,101.5,1200").unwrap();
        file.flush().unwrap();

        let symbol = Symbol::equity("AAPL");
        let bars = load_bars(file.path(), &symbol, Resolution::Day).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, Decimal::new(1015, 1));
    }

    #[test]
    fn missing_file_is_an_error() {
        let symbol = Symbol::equity("AAPL");
        assert!(load_bars("/nonexistent/path.csv", &symbol, Resolution::Day).is_err());
    }
}
