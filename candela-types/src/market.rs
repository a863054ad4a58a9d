//! Market data primitives: candles, timeframes and series identifiers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CandelaError;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;
// 1970-01-01 was a Thursday; weekly buckets start on Monday.
const WEEK_OFFSET_MS: i64 = 3 * DAY_MS;

/// One OHLCV record for a fixed time bucket.
///
/// `timestamp_ms` is the bucket opening instant (UTC, milliseconds since the epoch)
/// and is the natural key of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket opening instant in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// First traded price in the bucket.
    pub open: Decimal,
    /// Highest traded price in the bucket.
    pub high: Decimal,
    /// Lowest traded price in the bucket.
    pub low: Decimal,
    /// Last traded price in the bucket.
    pub close: Decimal,
    /// Traded base-asset volume in the bucket.
    pub volume: Decimal,
}

impl Candle {
    /// Construct a candle from its fields.
    #[must_use]
    pub const fn new(
        timestamp_ms: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp_ms,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Bucket opening instant as a UTC datetime, if representable.
    #[must_use]
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

/// Bucket duration of a series.
///
/// The set mirrors the intervals exchanges commonly serve natively. Labels use the
/// compact `1m` / `4h` / `1d` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[non_exhaustive]
pub enum Timeframe {
    /// One minute.
    M1,
    /// Three minutes.
    M3,
    /// Five minutes.
    M5,
    /// Fifteen minutes.
    M15,
    /// Thirty minutes.
    M30,
    /// One hour.
    H1,
    /// Two hours.
    H2,
    /// Four hours.
    H4,
    /// Six hours.
    H6,
    /// Eight hours.
    H8,
    /// Twelve hours.
    H12,
    /// One day.
    D1,
    /// Three days.
    D3,
    /// One week, starting Monday 00:00 UTC.
    W1,
}

impl Timeframe {
    /// Every supported timeframe, shortest first.
    pub const ALL: &'static [Self] = &[
        Self::M1,
        Self::M3,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H2,
        Self::H4,
        Self::H6,
        Self::H8,
        Self::H12,
        Self::D1,
        Self::D3,
        Self::W1,
    ];

    /// Bucket length in milliseconds.
    #[must_use]
    pub const fn duration_ms(self) -> i64 {
        match self {
            Self::M1 => MINUTE_MS,
            Self::M3 => 3 * MINUTE_MS,
            Self::M5 => 5 * MINUTE_MS,
            Self::M15 => 15 * MINUTE_MS,
            Self::M30 => 30 * MINUTE_MS,
            Self::H1 => HOUR_MS,
            Self::H2 => 2 * HOUR_MS,
            Self::H4 => 4 * HOUR_MS,
            Self::H6 => 6 * HOUR_MS,
            Self::H8 => 8 * HOUR_MS,
            Self::H12 => 12 * HOUR_MS,
            Self::D1 => DAY_MS,
            Self::D3 => 3 * DAY_MS,
            Self::W1 => WEEK_MS,
        }
    }

    /// Compact label, e.g. `1m` or `4h`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H8 => "8h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::D3 => "3d",
            Self::W1 => "1w",
        }
    }

    /// Floor `ts_ms` to the start of the bucket that contains it.
    ///
    /// Buckets are aligned to the Unix epoch, except weekly buckets which start on
    /// Monday 00:00 UTC.
    #[must_use]
    pub const fn align_down(self, ts_ms: i64) -> i64 {
        let step = self.duration_ms();
        match self {
            Self::W1 => (ts_ms + WEEK_OFFSET_MS).div_euclid(step) * step - WEEK_OFFSET_MS,
            _ => ts_ms.div_euclid(step) * step,
        }
    }

    /// True when every bucket of `self` is an exact union of `base` buckets.
    #[must_use]
    pub const fn is_multiple_of(self, base: Self) -> bool {
        let (d, b) = (self.duration_ms(), base.duration_ms());
        if d % b != 0 {
            return false;
        }
        // Monday-aligned weeks only tile epoch-aligned bases up to one day.
        match self {
            Self::W1 => b <= DAY_MS,
            _ => true,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = CandelaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|tf| tf.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| CandelaError::InvalidArg(format!("unsupported timeframe '{s}'")))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = CandelaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.label().to_string()
    }
}

/// Identifies one `(symbol, timeframe)` series and its file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Exchange pair in `BASE/QUOTE` form, e.g. `BTC/USDT`.
    pub symbol: String,
    /// Bucket duration of the series.
    pub timeframe: Timeframe,
}

impl SeriesKey {
    /// Build a key for `symbol` at `timeframe`.
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }

    /// Lowercased alphanumeric base asset, e.g. `btc` for `BTC/USDT`.
    #[must_use]
    pub fn base_asset(&self) -> String {
        self.symbol
            .split('/')
            .next()
            .unwrap_or_default()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect()
    }

    /// File name of the series, e.g. `btc1m.csv`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}{}.csv", self.base_asset(), self.timeframe.label())
    }

    /// The same symbol at another timeframe.
    #[must_use]
    pub fn with_timeframe(&self, timeframe: Timeframe) -> Self {
        Self {
            symbol: self.symbol.clone(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// How a store write treats existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    /// Replace any existing content and write a header row.
    Create,
    /// Add rows after the existing content, without a header.
    Append,
}
