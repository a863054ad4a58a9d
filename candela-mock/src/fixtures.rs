//! Deterministic candle generators.

use candela_core::{Candle, Timeframe};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

/// Milliseconds since the epoch for a UTC calendar minute.
///
/// # Panics
/// Panics on an invalid date; intended for test fixtures only.
#[must_use]
pub fn utc_ms(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid fixture date");
    Utc.from_utc_datetime(&naive).timestamp_millis()
}

/// A well-formed candle whose prices derive from its timestamp.
///
/// Prices are in whole cents so aggregation results are easy to predict.
#[must_use]
pub fn candle_at(ts_ms: i64) -> Candle {
    let minute = ts_ms.div_euclid(60_000);
    let open = Decimal::new(1_000_000 + minute.rem_euclid(10_000), 2);
    let close = Decimal::new(1_000_000 + (minute + 3).rem_euclid(10_000), 2);
    let high = open.max(close) + Decimal::new(25, 2);
    let low = open.min(close) - Decimal::new(25, 2);
    let volume = Decimal::new(100 + minute.rem_euclid(97), 3);
    Candle::new(ts_ms, open, high, low, close, volume)
}

/// `count` contiguous candles of `timeframe` starting at `start_ms`.
#[must_use]
pub fn series(start_ms: i64, timeframe: Timeframe, count: usize) -> Vec<Candle> {
    let step = timeframe.duration_ms();
    (0..count)
        .map(|i| candle_at(start_ms + i64::try_from(i).unwrap_or(i64::MAX) * step))
        .collect()
}

/// Contiguous candles covering `[start_ms, end_ms)`.
#[must_use]
pub fn range(start_ms: i64, end_ms: i64, timeframe: Timeframe) -> Vec<Candle> {
    let step = timeframe.duration_ms();
    let mut out = Vec::new();
    let mut ts = timeframe.align_down(start_ms);
    if ts < start_ms {
        ts += step;
    }
    while ts < end_ms {
        out.push(candle_at(ts));
        ts += step;
    }
    out
}
