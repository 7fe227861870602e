//! Market observation window.
//!
//! Witnesses read a bounded, time-ordered sequence of bars. The window is
//! immutable once built and shared across witness tasks behind an `Arc`.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default maximum number of bars in a window.
pub const DEFAULT_WINDOW_CAPACITY: usize = 500;

/// A single price/volume bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl MarketBar {
    /// High-low range relative to close. `None` when close is zero.
    pub fn range_ratio(&self) -> Option<Decimal> {
        if self.close.is_zero() {
            return None;
        }
        Some((self.high - self.low) / self.close)
    }

    fn validate(&self) -> Result<()> {
        if self.low > self.high {
            return Err(CoreError::InvalidMarketWindow(format!(
                "bar at {} has low {} above high {}",
                self.timestamp, self.low, self.high
            )));
        }
        if self.volume.is_sign_negative() && !self.volume.is_zero() {
            return Err(CoreError::InvalidMarketWindow(format!(
                "bar at {} has negative volume",
                self.timestamp
            )));
        }
        Ok(())
    }
}

/// Ordered, bounded, read-only window of bars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketWindow {
    symbol: String,
    bars: Vec<MarketBar>,
}

impl MarketWindow {
    /// Build a window with the default capacity.
    pub fn new(symbol: impl Into<String>, bars: Vec<MarketBar>) -> Result<Self> {
        Self::with_capacity(symbol, bars, DEFAULT_WINDOW_CAPACITY)
    }

    /// Build a window, keeping only the most recent `capacity` bars.
    ///
    /// Rejects bars that are not strictly increasing in time.
    pub fn with_capacity(
        symbol: impl Into<String>,
        mut bars: Vec<MarketBar>,
        capacity: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(CoreError::InvalidMarketWindow(
                "capacity must be positive".to_string(),
            ));
        }
        for bar in &bars {
            bar.validate()?;
        }
        if let Some(pair) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(CoreError::InvalidMarketWindow(format!(
                "bars out of order: {} then {}",
                pair[0].timestamp, pair[1].timestamp
            )));
        }
        if bars.len() > capacity {
            bars.drain(..bars.len() - capacity);
        }

        Ok(Self {
            symbol: symbol.into(),
            bars,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[MarketBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn latest(&self) -> Option<&MarketBar> {
        self.bars.last()
    }

    /// The last `n` bars (fewer if the window is shorter).
    pub fn tail(&self, n: usize) -> &[MarketBar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }

    /// Close-to-close return over the last `lookback` bars.
    pub fn return_over(&self, lookback: usize) -> Option<Decimal> {
        if lookback == 0 || self.bars.len() <= lookback {
            return None;
        }
        let last = self.bars.last()?.close;
        let base = self.bars[self.bars.len() - 1 - lookback].close;
        if base.is_zero() {
            return None;
        }
        Some((last - base) / base)
    }

    /// Mean volume of the bars before the latest one, over `lookback` bars.
    pub fn mean_prior_volume(&self, lookback: usize) -> Option<Decimal> {
        if self.bars.len() < 2 || lookback == 0 {
            return None;
        }
        let prior = &self.bars[..self.bars.len() - 1];
        let start = prior.len().saturating_sub(lookback);
        let slice = &prior[start..];
        let total: Decimal = slice.iter().map(|b| b.volume).sum();
        Some(total / Decimal::from(slice.len()))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::bar;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rejects_out_of_order() {
        let bars = vec![bar(1, dec!(100), dec!(1)), bar(0, dec!(101), dec!(1))];
        assert!(MarketWindow::new("BTC", bars).is_err());
    }

    #[test]
    fn test_rejects_duplicate_timestamps() {
        let bars = vec![bar(0, dec!(100), dec!(1)), bar(0, dec!(101), dec!(1))];
        assert!(MarketWindow::new("BTC", bars).is_err());
    }

    #[test]
    fn test_capacity_keeps_latest() {
        let bars = (0..10).map(|i| bar(i, Decimal::from(100 + i), dec!(1))).collect();
        let window = MarketWindow::with_capacity("BTC", bars, 4).unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window.bars()[0].close, dec!(106));
        assert_eq!(window.latest().unwrap().close, dec!(109));
    }

    #[test]
    fn test_return_over() {
        let bars = vec![
            bar(0, dec!(100), dec!(1)),
            bar(1, dec!(105), dec!(1)),
            bar(2, dec!(110), dec!(1)),
        ];
        let window = MarketWindow::new("BTC", bars).unwrap();
        assert_eq!(window.return_over(2), Some(dec!(0.1)));
        assert_eq!(window.return_over(3), None);
    }

    #[test]
    fn test_mean_prior_volume() {
        let bars = vec![
            bar(0, dec!(100), dec!(10)),
            bar(1, dec!(100), dec!(20)),
            bar(2, dec!(100), dec!(90)),
        ];
        let window = MarketWindow::new("BTC", bars).unwrap();
        assert_eq!(window.mean_prior_volume(5), Some(dec!(15)));
    }
}
