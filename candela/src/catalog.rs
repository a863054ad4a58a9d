//! Read-only publication view over the mirrored series.
//!
//! The catalog only ever exposes files that belong to a configured
//! `(symbol, timeframe)` pair; arbitrary names under the data directory are not
//! reachable through it.

use std::path::PathBuf;
use std::sync::Arc;

use candela_core::{
    CandelaError, SeriesKey, SeriesStore, SyncConfig, TailProbe, Timeframe, derive,
    store::encode_csv,
};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};

use crate::sync::run_blocking;

const SYNTHESIZED_CACHE_ENTRIES: u64 = 64;

/// One configured series and what the store currently holds for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Symbol in `BASE/QUOTE` form.
    pub symbol: String,
    /// Series timeframe.
    pub timeframe: Timeframe,
    /// File name under the data directory.
    pub file_name: String,
    /// `true` for the fetched base series, `false` for a derived one.
    pub base: bool,
    /// Whether the file exists.
    pub present: bool,
    /// File size in bytes (0 when absent).
    pub size: u64,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
    /// Timestamp of the last stored candle, when the tail is readable.
    pub last_timestamp_ms: Option<i64>,
}

/// Lookup and on-demand synthesis over the configured series.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn SeriesStore>,
    symbols: Vec<String>,
    base_tf: Timeframe,
    derived: Vec<Timeframe>,
    synthesized: Cache<(String, i64), Arc<Vec<u8>>>,
}

impl Catalog {
    /// Catalog over `store` for the symbols and timeframes in `cfg`.
    #[must_use]
    pub fn new(store: Arc<dyn SeriesStore>, cfg: &SyncConfig) -> Self {
        Self {
            store,
            symbols: cfg.symbols.clone(),
            base_tf: cfg.timeframe,
            derived: cfg.derived.clone(),
            synthesized: Cache::builder()
                .max_capacity(SYNTHESIZED_CACHE_ENTRIES)
                .build(),
        }
    }

    /// Timeframe of the fetched base series.
    #[must_use]
    pub const fn base_timeframe(&self) -> Timeframe {
        self.base_tf
    }

    /// Configured symbol matching `symbol` case-insensitively.
    #[must_use]
    pub fn find_symbol(&self, symbol: &str) -> Option<&str> {
        self.symbols
            .iter()
            .find(|s| s.eq_ignore_ascii_case(symbol))
            .map(String::as_str)
    }

    fn keys(&self) -> impl Iterator<Item = (SeriesKey, bool)> + '_ {
        self.symbols.iter().flat_map(|symbol| {
            std::iter::once((SeriesKey::new(symbol.clone(), self.base_tf), true)).chain(
                self.derived
                    .iter()
                    .map(move |tf| (SeriesKey::new(symbol.clone(), *tf), false)),
            )
        })
    }

    fn configured_key(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<SeriesKey, CandelaError> {
        let symbol = self
            .find_symbol(symbol)
            .ok_or_else(|| CandelaError::not_found(format!("symbol {symbol}")))?;
        Ok(SeriesKey::new(symbol, timeframe))
    }

    /// Every configured series with its on-disk state.
    ///
    /// # Errors
    /// Returns `Storage` when the data directory cannot be listed.
    pub async fn list(&self) -> Result<Vec<CatalogEntry>, CandelaError> {
        let keys: Vec<(SeriesKey, bool)> = self.keys().collect();
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || -> Result<Vec<CatalogEntry>, CandelaError> {
            let stored = store.list()?;
            Ok(keys
                .into_iter()
                .map(|(key, base)| {
                    let file_name = key.file_name();
                    let meta = stored.iter().find(|s| s.file_name == file_name);
                    let last_timestamp_ms = match meta {
                        Some(_) => store.probe_last_timestamp(&key),
                        None => None,
                    };
                    CatalogEntry {
                        symbol: key.symbol.clone(),
                        timeframe: key.timeframe,
                        file_name,
                        base,
                        present: meta.is_some(),
                        size: meta.map_or(0, |m| m.size),
                        modified: meta.and_then(|m| m.modified),
                        last_timestamp_ms,
                    }
                })
                .collect())
        })
        .await
        .map_err(|e| CandelaError::Other(format!("catalog listing failed: {e}")))?
    }

    /// Path of the published file for `(symbol, timeframe)`.
    ///
    /// # Errors
    /// Returns `NotFound` for unconfigured pairs and for files not yet written.
    pub fn open(&self, symbol: &str, timeframe: Timeframe) -> Result<PathBuf, CandelaError> {
        let key = self.configured_key(symbol, timeframe)?;
        if timeframe != self.base_tf && !self.derived.contains(&timeframe) {
            return Err(CandelaError::not_found(key.to_string()));
        }
        self.store
            .path(&key)
            .ok_or_else(|| CandelaError::not_found(key.file_name()))
    }

    /// Path of a published file by its name, e.g. `btc1m.csv`.
    ///
    /// # Errors
    /// Returns `NotFound` when the name is not a configured series or is absent.
    pub fn open_file(&self, file_name: &str) -> Result<PathBuf, CandelaError> {
        let key = self
            .keys()
            .map(|(k, _)| k)
            .find(|k| k.file_name() == file_name)
            .ok_or_else(|| CandelaError::not_found(file_name))?;
        self.store
            .path(&key)
            .ok_or_else(|| CandelaError::not_found(file_name))
    }

    /// CSV bytes for `(symbol, timeframe)` derived from the stored base series.
    ///
    /// Results are cached per base tail, so repeated requests between syncs reuse
    /// the same bytes.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown symbols or a missing base series, `InvalidArg`
    /// when `timeframe` cannot be derived from the base, and `Storage` when the base
    /// series is unreadable.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "candela::catalog::synthesize", skip(self), err)
    )]
    pub async fn synthesize(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Arc<Vec<u8>>, CandelaError> {
        let base = self.configured_key(symbol, self.base_tf)?;
        if timeframe == self.base_tf || !timeframe.is_multiple_of(self.base_tf) {
            return Err(CandelaError::InvalidArg(format!(
                "cannot derive {timeframe} from {}",
                self.base_tf
            )));
        }
        let target = base.with_timeframe(timeframe);
        let base_tf = self.base_tf;

        let probe =
            run_blocking(Arc::clone(&self.store), base.clone(), |s, k| Ok(s.probe(k))).await?;
        let last = match probe {
            TailProbe::Missing => return Err(CandelaError::not_found(base.file_name())),
            TailProbe::Corrupt(reason) => {
                return Err(CandelaError::storage(base.file_name(), reason));
            }
            TailProbe::Last(ts) => ts,
        };

        let cache_key = (target.file_name(), last);
        if let Some(hit) = self.synthesized.get(&cache_key).await {
            return Ok(hit);
        }

        let bytes = run_blocking(Arc::clone(&self.store), base, move |s, k| {
            let candles = s.read_full(k)?;
            encode_csv(&derive(&candles, base_tf, timeframe)?)
        })
        .await?;
        let bytes = Arc::new(bytes);
        self.synthesized.insert(cache_key, Arc::clone(&bytes)).await;
        Ok(bytes)
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("symbols", &self.symbols)
            .field("base_tf", &self.base_tf)
            .field("derived", &self.derived)
            .finish_non_exhaustive()
    }
}
