//! Configuration types shared by the synchronizer, middleware and server.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CandelaError;
use crate::market::{SeriesKey, Timeframe};

/// 2020-01-01 00:00:00 UTC.
pub const DEFAULT_START_MS: i64 = 1_577_836_800_000;

/// Exclusive end of the range every series must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetEnd {
    /// Track the live edge: the start of the bucket currently in progress.
    #[default]
    Now,
    /// A fixed cutoff in milliseconds since the epoch.
    Fixed(i64),
}

/// What to do with a series that parses but stops short of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RebuildPolicy {
    /// Append from the candle after the stored tail.
    #[default]
    Resume,
    /// Delete the series and rebuild it from the target start.
    AlwaysRebuild,
}

/// How the background worker repeats sync passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Run exactly one pass over all symbols, then stop.
    Once,
    /// Keep checking each symbol when it is next due, never more often than `min_interval`.
    Poll {
        /// Lower bound between two checks of the same symbol.
        min_interval: Duration,
    },
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::Poll {
            min_interval: Duration::from_secs(30),
        }
    }
}

/// Fixed-delay retry configuration for transient upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before retrying the same page, in milliseconds.
    pub delay_ms: u64,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            delay_ms: 5_000,
            jitter_percent: 0,
        }
    }
}

/// Client-side request budget over a fixed window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Maximum number of requests within a single window.
    pub limit: u64,
    /// Duration of the accounting window.
    pub window: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: 1_200,
            window: Duration::from_secs(60),
        }
    }
}

/// Snapshot of a quota budget at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaState {
    /// Configured maximum units per window.
    pub limit: u64,
    /// Remaining units available in the current window.
    pub remaining: u64,
    /// Time remaining until the current window resets.
    pub reset_in: Duration,
}

/// Everything the synchronizer needs to know about what to mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Exchange pairs in `BASE/QUOTE` form.
    pub symbols: Vec<String>,
    /// Timeframe fetched from the exchange.
    pub timeframe: Timeframe,
    /// Inclusive start of the target range (ms since epoch).
    pub start_ms: i64,
    /// Exclusive end of the target range.
    pub end: TargetEnd,
    /// Coarser timeframes regenerated from the base series after each sync.
    pub derived: Vec<Timeframe>,
    /// Rows buffered in memory before a flush to the store.
    pub flush_rows: usize,
    /// Slack between the stored tail and the target end still considered complete.
    pub tolerance_ms: i64,
    /// Candles requested per exchange call.
    pub page_limit: usize,
    /// Retry delay for transient upstream failures.
    pub backoff: BackoffConfig,
    /// Handling of valid-but-stale series.
    pub rebuild_policy: RebuildPolicy,
    /// One-shot or continuous polling.
    pub mode: SyncMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            timeframe: Timeframe::M1,
            start_ms: DEFAULT_START_MS,
            end: TargetEnd::Now,
            derived: Vec::new(),
            flush_rows: 50_000,
            tolerance_ms: 120_000,
            page_limit: 1_000,
            backoff: BackoffConfig::default(),
            rebuild_policy: RebuildPolicy::Resume,
            mode: SyncMode::default(),
        }
    }
}

impl SyncConfig {
    /// Key of the base series for `symbol`.
    #[must_use]
    pub fn base_key(&self, symbol: &str) -> SeriesKey {
        SeriesKey::new(symbol, self.timeframe)
    }

    /// Every series this configuration publishes: base first, then derived, per symbol.
    #[must_use]
    pub fn series_keys(&self) -> Vec<SeriesKey> {
        let mut out = Vec::with_capacity(self.symbols.len() * (1 + self.derived.len()));
        for symbol in &self.symbols {
            out.push(self.base_key(symbol));
            for tf in &self.derived {
                out.push(SeriesKey::new(symbol.clone(), *tf));
            }
        }
        out
    }

    /// Check the configuration for values the synchronizer cannot work with.
    ///
    /// # Errors
    /// Returns `InvalidArg` for an empty symbol list, duplicate symbols or file
    /// names, derived timeframes that do not tile the base timeframe, an empty
    /// fixed range, zero page or flush sizes, or a tolerance outside
    /// `[0, 10 × base duration)`.
    pub fn validate(&self) -> Result<(), CandelaError> {
        if self.symbols.is_empty() {
            return Err(CandelaError::InvalidArg("no symbols configured".into()));
        }
        let mut files: HashMap<String, &str> = HashMap::new();
        for symbol in &self.symbols {
            let key = self.base_key(symbol);
            if key.base_asset().is_empty() {
                return Err(CandelaError::InvalidArg(format!(
                    "symbol '{symbol}' has no base asset"
                )));
            }
            if let Some(prev) = files.insert(key.file_name(), symbol) {
                return Err(CandelaError::InvalidArg(format!(
                    "symbols '{prev}' and '{symbol}' map to the same file {}",
                    key.file_name()
                )));
            }
        }
        for tf in &self.derived {
            if *tf == self.timeframe || !tf.is_multiple_of(self.timeframe) {
                return Err(CandelaError::InvalidArg(format!(
                    "derived timeframe {tf} is not a coarser multiple of {}",
                    self.timeframe
                )));
            }
        }
        if let TargetEnd::Fixed(end) = self.end
            && end <= self.start_ms
        {
            return Err(CandelaError::InvalidArg(format!(
                "target end {end} is not after start {}",
                self.start_ms
            )));
        }
        if self.page_limit == 0 || self.flush_rows == 0 {
            return Err(CandelaError::InvalidArg(
                "page_limit and flush_rows must be positive".into(),
            ));
        }
        if self.tolerance_ms < 0 || self.tolerance_ms >= 10 * self.timeframe.duration_ms() {
            return Err(CandelaError::InvalidArg(format!(
                "tolerance {}ms is outside [0, 10 x {})",
                self.tolerance_ms, self.timeframe
            )));
        }
        Ok(())
    }
}
