//! In-memory exchange client for tests.
//!
//! `MockExchange` serves candles from per-symbol fixture series, records every
//! request, and can be scripted to fail, stall, or misbehave on upcoming calls.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use candela_core::{CandelaError, Candle, ExchangeClient, Timeframe};
use tokio::sync::Mutex;

pub mod fixtures;

/// Clock reading of a fresh [`MockExchange`]: 2024-02-01 00:00 UTC.
pub const DEFAULT_NOW_MS: i64 = 1_706_745_600_000;

/// One recorded `fetch_candles` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Requested symbol.
    pub symbol: String,
    /// Requested timeframe.
    pub timeframe: Timeframe,
    /// Requested start (inclusive).
    pub since_ms: i64,
    /// Requested page size.
    pub limit: usize,
}

/// Instruction for how the next call for a symbol should behave.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Fail immediately with the provided error.
    Fail(CandelaError),
    /// Sleep before answering normally.
    Delay(Duration),
    /// Return exactly these candles, ignoring the stored series.
    Page(Vec<Candle>),
    /// Hang indefinitely (simulate a stalled connection).
    Hang,
}

#[derive(Default)]
struct InternalState {
    series: HashMap<String, BTreeMap<i64, Candle>>,
    scripts: HashMap<String, VecDeque<MockBehavior>>,
    calls: Vec<MockCall>,
}

/// Deterministic exchange double.
pub struct MockExchange {
    state: Mutex<InternalState>,
    now_ms: AtomicI64,
    page_cap: Option<usize>,
    stale_overlap: usize,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchange {
    /// Empty exchange whose clock reads 2024-02-01 00:00 UTC.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InternalState::default()),
            now_ms: AtomicI64::new(DEFAULT_NOW_MS),
            page_cap: None,
            stale_overlap: 0,
        }
    }

    /// Serve `candles` for `symbol`. Timestamps replace existing ones.
    #[must_use]
    pub fn with_series(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        let entry = self
            .state
            .get_mut()
            .series
            .entry(symbol.to_string())
            .or_default();
        for c in candles {
            entry.insert(c.timestamp_ms, c);
        }
        self
    }

    /// Set the clock reported by `current_time_ms`.
    #[must_use]
    pub fn with_now(self, now_ms: i64) -> Self {
        self.now_ms.store(now_ms, Ordering::SeqCst);
        self
    }

    /// Never return more than `cap` candles per page, whatever the request asks for.
    #[must_use]
    pub const fn with_page_cap(mut self, cap: usize) -> Self {
        self.page_cap = Some(cap);
        self
    }

    /// Prepend `n` candles from before `since_ms` to every page (a misbehaving upstream).
    #[must_use]
    pub const fn with_stale_overlap(mut self, n: usize) -> Self {
        self.stale_overlap = n;
        self
    }

    /// Move the clock.
    pub fn set_now(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Add candles to a symbol after construction (e.g. new live data).
    pub async fn extend_series(&self, symbol: &str, candles: Vec<Candle>) {
        let mut guard = self.state.lock().await;
        let entry = guard.series.entry(symbol.to_string()).or_default();
        for c in candles {
            entry.insert(c.timestamp_ms, c);
        }
    }

    /// Queue a behavior consumed by the next call for `symbol`.
    pub async fn push_behavior(&self, symbol: &str, behavior: MockBehavior) {
        let mut guard = self.state.lock().await;
        guard
            .scripts
            .entry(symbol.to_string())
            .or_default()
            .push_back(behavior);
    }

    /// Every request received so far, in order.
    pub async fn calls(&self) -> Vec<MockCall> {
        self.state.lock().await.calls.clone()
    }

    /// Requests received for `symbol`.
    pub async fn calls_for(&self, symbol: &str) -> Vec<MockCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.symbol == symbol)
            .cloned()
            .collect()
    }

    /// Forget recorded requests.
    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    fn name(&self) -> &'static str {
        "candela-mock"
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, CandelaError> {
        let behavior = {
            let mut guard = self.state.lock().await;
            guard.calls.push(MockCall {
                symbol: symbol.to_string(),
                timeframe,
                since_ms,
                limit,
            });
            guard.scripts.get_mut(symbol).and_then(VecDeque::pop_front)
        };

        match behavior {
            Some(MockBehavior::Fail(err)) => return Err(err),
            Some(MockBehavior::Page(page)) => return Ok(page),
            Some(MockBehavior::Hang) => std::future::pending::<()>().await,
            Some(MockBehavior::Delay(d)) => tokio::time::sleep(d).await,
            None => {}
        }

        let guard = self.state.lock().await;
        let Some(series) = guard.series.get(symbol) else {
            return Err(CandelaError::InvalidArg(format!("unknown symbol {symbol}")));
        };
        let take = self.page_cap.map_or(limit, |cap| cap.min(limit));
        let mut page: Vec<Candle> = series
            .range(..since_ms)
            .rev()
            .take(self.stale_overlap)
            .map(|(_, c)| c.clone())
            .collect();
        page.reverse();
        page.extend(series.range(since_ms..).take(take).map(|(_, c)| c.clone()));
        Ok(page)
    }

    fn current_time_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
