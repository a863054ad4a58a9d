// Shared fixtures for the synchronizer integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use candela::{BackoffConfig, Candela, CandelaBuilder, SyncMode, TargetEnd};
use candela_core::CsvStore;
use candela_mock::MockExchange;
use candela_mock::fixtures::utc_ms;
use tempfile::TempDir;

pub const BTC: &str = "BTC/USDT";
pub const ETH: &str = "ETH/USDT";

/// 2024-01-01 00:00 UTC, a month before the mock exchange's default clock.
pub fn t0() -> i64 {
    utc_ms(2024, 1, 1, 0, 0)
}

pub const fn minutes(n: i64) -> i64 {
    n * 60_000
}

pub fn temp_store() -> (TempDir, Arc<CsvStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(CsvStore::create(dir.path()).expect("store root"));
    (dir, store)
}

/// Builder wired to `mock` and `store`, starting at `t0()` and ending at `t0() + end_min`.
pub fn builder(mock: &Arc<MockExchange>, store: &Arc<CsvStore>, end_min: i64) -> CandelaBuilder {
    Candela::builder()
        .client(mock.clone())
        .store(store.clone())
        .start_ms(t0())
        .end(TargetEnd::Fixed(t0() + minutes(end_min)))
        .backoff(BackoffConfig {
            delay_ms: 10,
            jitter_percent: 0,
        })
        .mode(SyncMode::Once)
}

pub fn timestamps(candles: &[candela::Candle]) -> Vec<i64> {
    candles.iter().map(|c| c.timestamp_ms).collect()
}
