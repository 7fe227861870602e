//! JSON-lines replay feed.
//!
//! Each non-empty line is one `MarketBar`. The feed keeps a rolling buffer and
//! yields a shared `MarketWindow` per accepted bar once enough history exists.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info, warn};
use warden_core::{MarketBar, MarketWindow};

use crate::error::{AppError, AppResult};

/// Replay feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Path to the JSON-lines bar file.
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Bars kept in each window.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Bars required before the first window is emitted.
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,
    /// Pause between cycles (ms). 0 replays as fast as possible.
    #[serde(default)]
    pub cycle_interval_ms: u64,
}

fn default_path() -> String {
    "data/bars.jsonl".to_string()
}

fn default_symbol() -> String {
    "BTC".to_string()
}

fn default_window_size() -> usize {
    120
}

fn default_min_bars() -> usize {
    21
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            symbol: default_symbol(),
            window_size: default_window_size(),
            min_bars: default_min_bars(),
            cycle_interval_ms: 0,
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.is_empty() {
            return Err("feed.symbol must not be empty".to_string());
        }
        if self.window_size == 0 {
            return Err("feed.window_size must be positive".to_string());
        }
        if self.min_bars == 0 || self.min_bars > self.window_size {
            return Err(format!(
                "feed.min_bars ({}) must be in 1..=window_size ({})",
                self.min_bars, self.window_size
            ));
        }
        Ok(())
    }
}

/// Replays bars from any async line source.
pub struct ReplayFeed<R> {
    lines: Lines<R>,
    symbol: String,
    capacity: usize,
    min_bars: usize,
    buffer: VecDeque<MarketBar>,
    line_no: usize,
    skipped: usize,
}

impl ReplayFeed<BufReader<File>> {
    /// Open the file named in `config`.
    pub async fn open(config: &FeedConfig) -> AppResult<Self> {
        let file = File::open(&config.path)
            .await
            .map_err(|e| AppError::Feed(format!("failed to open {}: {e}", config.path)))?;
        info!(path = %config.path, symbol = %config.symbol, "Replay feed opened");
        Ok(Self::from_reader(BufReader::new(file), config))
    }
}

impl<R: AsyncBufRead + Unpin> ReplayFeed<R> {
    pub fn from_reader(reader: R, config: &FeedConfig) -> Self {
        Self {
            lines: reader.lines(),
            symbol: config.symbol.clone(),
            capacity: config.window_size.max(1),
            min_bars: config.min_bars.max(1),
            buffer: VecDeque::with_capacity(config.window_size),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Next window, or `None` at end of input.
    ///
    /// Malformed JSON is an error. Bars that do not advance in time are
    /// skipped with a warning.
    pub async fn next_window(&mut self) -> AppResult<Option<Arc<MarketWindow>>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let bar: MarketBar = serde_json::from_str(line).map_err(|e| {
                AppError::Feed(format!("line {}: invalid bar: {e}", self.line_no))
            })?;

            if let Some(last) = self.buffer.back() {
                if bar.timestamp <= last.timestamp {
                    warn!(
                        line = self.line_no,
                        timestamp = %bar.timestamp,
                        "Out-of-order bar skipped"
                    );
                    self.skipped += 1;
                    continue;
                }
            }

            self.buffer.push_back(bar);
            while self.buffer.len() > self.capacity {
                self.buffer.pop_front();
            }
            if self.buffer.len() < self.min_bars {
                debug!(have = self.buffer.len(), need = self.min_bars, "Warming up");
                continue;
            }

            let window = MarketWindow::with_capacity(
                self.symbol.clone(),
                self.buffer.iter().cloned().collect(),
                self.capacity,
            )?;
            return Ok(Some(Arc::new(window)));
        }
        Ok(None)
    }

    /// Bars skipped for going backwards in time.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(minute: i64, close: &str) -> String {
        format!(
            r#"{{"timestamp":"2024-01-01T00:{minute:02}:00Z","open":"{close}","high":"{close}","low":"{close}","close":"{close}","volume":"1"}}"#
        )
    }

    fn config(window_size: usize, min_bars: usize) -> FeedConfig {
        FeedConfig {
            window_size,
            min_bars,
            ..FeedConfig::default()
        }
    }

    #[tokio::test]
    async fn test_warm_up_then_rolling_windows() {
        let input: String = (0..5).map(|i| line(i, "100") + "\n").collect();
        let mut feed = ReplayFeed::from_reader(input.as_bytes(), &config(3, 2));

        let mut lens = Vec::new();
        while let Some(window) = feed.next_window().await.unwrap() {
            lens.push(window.len());
        }
        assert_eq!(lens, vec![2, 3, 3, 3]);
    }

    #[tokio::test]
    async fn test_out_of_order_and_blank_lines_skipped() {
        let input = format!("{}\n\n{}\n{}\n", line(1, "100"), line(0, "99"), line(2, "101"));
        let mut feed = ReplayFeed::from_reader(input.as_bytes(), &config(10, 2));

        let window = feed.next_window().await.unwrap().unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(feed.skipped(), 1);
        assert!(feed.next_window().await.unwrap().is_none());
    }

    #[test]
    fn test_malformed_line_is_error() {
        let input = "not json\n";
        let mut feed = ReplayFeed::from_reader(input.as_bytes(), &config(10, 1));
        let err = tokio_test::block_on(feed.next_window()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_config_validation() {
        assert!(FeedConfig::default().validate().is_ok());
        assert!(config(3, 4).validate().is_err());
        assert!(config(0, 0).validate().is_err());
    }
}
