use async_trait::async_trait;

use crate::{CandelaError, Candle, Timeframe};

/// Upstream source of candle history.
///
/// This is the only surface the synchronizer needs from an exchange. Implementations
/// map provider failures onto [`CandelaError`] so that [`CandelaError::is_transient`]
/// tells the fetcher whether a page can be retried.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Stable connector name used in logs and error values.
    fn name(&self) -> &'static str;

    /// Fetch up to `limit` candles for `symbol` starting at `since_ms` (inclusive).
    ///
    /// Candles are returned in ascending timestamp order. An empty vector means the
    /// upstream has no data at or after `since_ms` within one page.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, CandelaError>;

    /// Current wall-clock time in milliseconds as seen by this client.
    fn current_time_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
