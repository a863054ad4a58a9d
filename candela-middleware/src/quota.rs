//! Quota-aware client wrapper.
//!
//! Paces upstream calls to at most `limit` per `window`. When the budget is spent
//! the wrapper waits for the next window instead of failing, so the fetcher never
//! sees a self-inflicted error.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use candela_core::{CandelaError, Candle, ExchangeClient, Middleware, Timeframe};
use candela_types::{QuotaConfig, QuotaState};
use tokio::time::Instant;

/// Wrapper that enforces a fixed-window request budget.
pub struct QuotaAwareClient {
    inner: Arc<dyn ExchangeClient>,
    runtime: Mutex<QuotaRuntime>,
}

struct QuotaRuntime {
    limit: u64,
    calls_made_in_window: u64,
    last_reset: Instant,
    window: Duration,
}

impl QuotaRuntime {
    fn roll_window(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_reset);
        if elapsed >= self.window {
            self.calls_made_in_window = 0;
            // Keep windows aligned to regular boundaries even with gaps in usage.
            let windows_passed = elapsed.as_nanos() / self.window.as_nanos().max(1);
            let boundary_offset = Duration::from_nanos(
                (windows_passed * self.window.as_nanos())
                    .try_into()
                    .unwrap_or(u64::MAX),
            );
            self.last_reset += boundary_offset;
        }
    }

    fn reset_in(&self, now: Instant) -> Duration {
        self.window
            .saturating_sub(now.duration_since(self.last_reset))
    }
}

impl QuotaAwareClient {
    /// Create a new quota-aware wrapper around an existing client.
    pub fn new(inner: Arc<dyn ExchangeClient>, config: QuotaConfig) -> Self {
        Self {
            inner,
            runtime: Mutex::new(QuotaRuntime {
                limit: config.limit.max(1),
                calls_made_in_window: 0,
                last_reset: Instant::now(),
                window: config.window,
            }),
        }
    }

    /// Snapshot of the current budget.
    pub fn state(&self) -> QuotaState {
        let mut rt = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        rt.roll_window(now);
        QuotaState {
            limit: rt.limit,
            remaining: rt.limit.saturating_sub(rt.calls_made_in_window),
            reset_in: rt.reset_in(now),
        }
    }

    /// Consume one unit of budget if available.
    ///
    /// # Errors
    /// Returns `CandelaError::QuotaExceeded` when the window budget is exhausted;
    /// `reset_in_ms` is the time until the next window opens.
    pub fn should_allow_call(&self) -> Result<(), CandelaError> {
        let mut rt = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        rt.roll_window(now);

        if rt.calls_made_in_window < rt.limit {
            rt.calls_made_in_window += 1;
            return Ok(());
        }

        let err = CandelaError::QuotaExceeded {
            remaining: 0,
            reset_in_ms: rt.reset_in(now).as_millis().try_into().unwrap_or(u64::MAX),
        };
        drop(rt);
        Err(err)
    }

    /// Spend the rest of the current window after the upstream pushed back.
    fn exhaust_window(&self) {
        let mut rt = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        rt.roll_window(Instant::now());
        rt.calls_made_in_window = rt.limit;
    }

    async fn acquire(&self) {
        loop {
            match self.should_allow_call() {
                Ok(()) => return,
                Err(CandelaError::QuotaExceeded { reset_in_ms, .. }) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        connector = self.inner.name(),
                        wait_ms = reset_in_ms,
                        "request budget spent; waiting for next window"
                    );
                    tokio::time::sleep(Duration::from_millis(reset_in_ms.max(1))).await;
                }
                Err(_) => return,
            }
        }
    }
}

#[async_trait]
impl ExchangeClient for QuotaAwareClient {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, CandelaError> {
        self.acquire().await;
        let result = self
            .inner
            .fetch_candles(symbol, timeframe, since_ms, limit)
            .await;
        if let Err(CandelaError::RateLimitExceeded { .. }) = &result {
            self.exhaust_window();
        }
        result
    }

    fn current_time_ms(&self) -> i64 {
        self.inner.current_time_ms()
    }
}

/// Middleware config for constructing a [`QuotaAwareClient`].
pub struct QuotaMiddleware {
    /// Budget applied by the wrapper.
    pub config: QuotaConfig,
}

impl QuotaMiddleware {
    /// Wrap clients with `config`.
    #[must_use]
    pub const fn new(config: QuotaConfig) -> Self {
        Self { config }
    }
}

impl Middleware for QuotaMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn ExchangeClient>) -> Arc<dyn ExchangeClient> {
        Arc::new(QuotaAwareClient::new(inner, self.config))
    }

    fn name(&self) -> &'static str {
        "QuotaAwareClient"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "limit": self.config.limit,
            "window_ms": self.config.window.as_millis(),
        })
    }
}
