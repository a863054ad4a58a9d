//! Paginated candle fetching.
//!
//! A [`Paginator`] walks `[since_ms, until_ms)` one exchange page at a time and
//! yields strictly increasing, de-duplicated pages. Transient upstream failures are
//! retried on the same page after the configured backoff; anything else ends the
//! sequence with the error.

use std::sync::Arc;
use std::time::Duration;

use candela_core::{BackoffConfig, CandelaError, Candle, ExchangeClient, Timeframe};
use futures::Stream;

use crate::backoff::retry_delay;

/// Cursor-driven page walker over one symbol.
pub struct Paginator {
    client: Arc<dyn ExchangeClient>,
    symbol: String,
    timeframe: Timeframe,
    cursor: i64,
    until_ms: i64,
    page_limit: usize,
    backoff: BackoffConfig,
    retries: u64,
    done: bool,
}

impl Paginator {
    /// Walk `[since_ms, until_ms)` in pages of at most `page_limit` candles.
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        since_ms: i64,
        until_ms: i64,
        page_limit: usize,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            client,
            symbol: symbol.into(),
            timeframe,
            cursor: since_ms,
            until_ms,
            page_limit: page_limit.max(1),
            backoff,
            retries: 0,
            done: false,
        }
    }

    /// Timestamp the next request will start from.
    #[must_use]
    pub const fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Number of transient failures retried so far.
    #[must_use]
    pub const fn retries(&self) -> u64 {
        self.retries
    }

    fn page_width_ms(&self) -> i64 {
        i64::try_from(self.page_limit)
            .unwrap_or(i64::MAX)
            .saturating_mul(self.timeframe.duration_ms())
    }

    /// Fetch the next non-empty page, or `None` once the range is exhausted.
    ///
    /// # Errors
    /// Returns the first non-transient error reported by the exchange. The paginator
    /// is finished afterwards.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Candle>>, CandelaError> {
        loop {
            if self.done || self.cursor >= self.until_ms {
                self.done = true;
                return Ok(None);
            }

            let page = match self.fetch_with_retry().await {
                Ok(page) => page,
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            };

            if page.is_empty() {
                // Upstream gap: skip a full page width.
                self.cursor = self.cursor.saturating_add(self.page_width_ms());
                continue;
            }

            let cursor = self.cursor;
            let until = self.until_ms;
            let mut in_range = page
                .into_iter()
                .filter(|c| c.timestamp_ms < until)
                .peekable();
            if in_range.peek().is_none() {
                // Live edge: everything returned lies at or past the target end.
                self.done = true;
                return Ok(None);
            }

            let mut kept: Vec<Candle> = Vec::new();
            let mut last: Option<i64> = None;
            for c in in_range {
                if c.timestamp_ms < cursor || last.is_some_and(|prev| c.timestamp_ms <= prev) {
                    continue;
                }
                last = Some(c.timestamp_ms);
                kept.push(c);
            }

            match last {
                Some(ts) => {
                    let next = ts.saturating_add(self.timeframe.duration_ms());
                    self.cursor = if next > cursor {
                        next
                    } else {
                        cursor.saturating_add(self.page_width_ms())
                    };
                    return Ok(Some(kept));
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        symbol = %self.symbol,
                        cursor,
                        "page held only stale candles; forcing cursor forward"
                    );
                    self.cursor = cursor.saturating_add(self.page_width_ms());
                }
            }
        }
    }

    async fn fetch_with_retry(&mut self) -> Result<Vec<Candle>, CandelaError> {
        loop {
            match self
                .client
                .fetch_candles(&self.symbol, self.timeframe, self.cursor, self.page_limit)
                .await
            {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() => {
                    self.retries += 1;
                    let mut delay = retry_delay(&self.backoff);
                    if let CandelaError::RateLimitExceeded { window_ms, .. } = &e {
                        delay = delay.max(Duration::from_millis(*window_ms));
                    }
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        symbol = %self.symbol,
                        cursor = self.cursor,
                        error = %e,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "transient fetch failure; retrying page"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Turn the paginator into a lazy stream of pages.
    ///
    /// The stream yields at most one error and ends after it.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Candle>, CandelaError>> + Send {
        futures::stream::unfold(self, |mut pager| async move {
            match pager.next_page().await {
                Ok(Some(page)) => Some((Ok(page), pager)),
                Ok(None) => None,
                Err(e) => Some((Err(e), pager)),
            }
        })
    }
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("client", &self.client.name())
            .field("symbol", &self.symbol)
            .field("timeframe", &self.timeframe)
            .field("cursor", &self.cursor)
            .field("until_ms", &self.until_ms)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
