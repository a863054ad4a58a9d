use std::sync::Arc;
use std::time::Duration;

use candela_core::{
    BackoffConfig, CandelaError, ExchangeClient, QuotaConfig, RebuildPolicy, SeriesStore,
    SyncConfig, SyncMode, TargetEnd, Timeframe,
};
use candela_middleware::ClientBuilder;

use crate::catalog::Catalog;

/// Synchronizer that mirrors exchange candles into a series store.
pub struct Candela {
    pub(crate) client: Arc<dyn ExchangeClient>,
    pub(crate) store: Arc<dyn SeriesStore>,
    pub(crate) cfg: SyncConfig,
}

impl Candela {
    /// Start configuring a synchronizer.
    #[must_use]
    pub fn builder() -> CandelaBuilder {
        CandelaBuilder::new()
    }

    /// Validated configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    /// Exchange client (including any middleware layers).
    #[must_use]
    pub fn client(&self) -> Arc<dyn ExchangeClient> {
        Arc::clone(&self.client)
    }

    /// Backing store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn SeriesStore> {
        Arc::clone(&self.store)
    }

    /// Read-only publication view over the same store and configuration.
    #[must_use]
    pub fn catalog(&self) -> Catalog {
        Catalog::new(Arc::clone(&self.store), &self.cfg)
    }
}

impl std::fmt::Debug for Candela {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candela")
            .field("client", &self.client.name())
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`Candela`] synchronizer.
pub struct CandelaBuilder {
    client: Option<Arc<dyn ExchangeClient>>,
    quota: Option<QuotaConfig>,
    store: Option<Arc<dyn SeriesStore>>,
    cfg: SyncConfig,
}

impl Default for CandelaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CandelaBuilder {
    /// Create a builder with default sync settings.
    ///
    /// Defaults: 1m base timeframe from 2020-01-01, live end, 50 000-row flushes,
    /// 1 000-candle pages, 2 minute tolerance, fixed 5 s retry delay, resume on
    /// stale data, and a 30 s poll interval. A client, a store, and at least one
    /// symbol must be supplied.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: None,
            quota: None,
            store: None,
            cfg: SyncConfig::default(),
        }
    }

    /// Replace the whole configuration at once (e.g. loaded from the environment).
    #[must_use]
    pub fn config(mut self, cfg: SyncConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Exchange client to fetch from.
    #[must_use]
    pub fn client(mut self, client: Arc<dyn ExchangeClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Pace the client to `limit` calls per `window` by wrapping it on `build`.
    ///
    /// Use this when the client was not already built with a quota layer.
    #[must_use]
    pub fn quota(mut self, cfg: QuotaConfig) -> Self {
        self.quota = Some(cfg);
        self
    }

    /// Store that owns the series files.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SeriesStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Symbols to mirror, in `BASE/QUOTE` form.
    #[must_use]
    pub fn symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cfg.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Base timeframe fetched from the exchange.
    #[must_use]
    pub const fn timeframe(mut self, tf: Timeframe) -> Self {
        self.cfg.timeframe = tf;
        self
    }

    /// First timestamp of every series.
    #[must_use]
    pub const fn start_ms(mut self, start_ms: i64) -> Self {
        self.cfg.start_ms = start_ms;
        self
    }

    /// Exclusive end of every series.
    #[must_use]
    pub const fn end(mut self, end: TargetEnd) -> Self {
        self.cfg.end = end;
        self
    }

    /// Coarser timeframes regenerated from the base series.
    #[must_use]
    pub fn derived(mut self, tfs: impl IntoIterator<Item = Timeframe>) -> Self {
        self.cfg.derived = tfs.into_iter().collect();
        self
    }

    /// Rows accumulated in memory before a durable write.
    #[must_use]
    pub const fn flush_rows(mut self, rows: usize) -> Self {
        self.cfg.flush_rows = rows;
        self
    }

    /// Staleness accepted before a series counts as incomplete.
    #[must_use]
    pub const fn tolerance(mut self, tolerance: Duration) -> Self {
        self.cfg.tolerance_ms = duration_ms(tolerance);
        self
    }

    /// Candles requested per exchange call.
    #[must_use]
    pub const fn page_limit(mut self, limit: usize) -> Self {
        self.cfg.page_limit = limit;
        self
    }

    /// Delay and jitter applied between retries of a transient failure.
    #[must_use]
    pub const fn backoff(mut self, cfg: BackoffConfig) -> Self {
        self.cfg.backoff = cfg;
        self
    }

    /// How stale but valid series are brought up to date.
    #[must_use]
    pub const fn rebuild_policy(mut self, policy: RebuildPolicy) -> Self {
        self.cfg.rebuild_policy = policy;
        self
    }

    /// Single pass or continuous polling.
    #[must_use]
    pub const fn mode(mut self, mode: SyncMode) -> Self {
        self.cfg.mode = mode;
        self
    }

    /// Build the synchronizer.
    ///
    /// # Errors
    /// Returns `InvalidArg` when no client or store was supplied, or when the
    /// configuration fails [`SyncConfig::validate`].
    pub fn build(self) -> Result<Candela, CandelaError> {
        let Some(raw) = self.client else {
            return Err(CandelaError::InvalidArg(
                "no exchange client configured; add one via client(...)".into(),
            ));
        };
        let Some(store) = self.store else {
            return Err(CandelaError::InvalidArg(
                "no series store configured; add one via store(...)".into(),
            ));
        };
        self.cfg.validate()?;

        let client = match self.quota {
            Some(q) => ClientBuilder::new(raw).with_quota(&q).build(),
            None => raw,
        };
        Ok(Candela {
            client,
            store,
            cfg: self.cfg,
        })
    }
}

const fn duration_ms(d: Duration) -> i64 {
    let ms = d.as_millis();
    if ms > i64::MAX as u128 {
        i64::MAX
    } else {
        ms as i64
    }
}
