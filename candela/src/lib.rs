//! Candela keeps local OHLCV candle files in sync with an exchange.
//!
//! Overview
//! - A [`Paginator`] walks a time range one exchange page at a time, retrying
//!   transient failures on the same page and skipping upstream gaps.
//! - [`Candela::run_pass`] brings every configured symbol up to the target end:
//!   it probes only the tail of each stored series, resumes exactly one bucket after
//!   the last stored candle, writes in crash-atomic batches, and regenerates coarser
//!   derived timeframes afterwards.
//! - [`Candela::spawn`] runs passes in the background, either once or on a poll
//!   schedule driven by when each live series next becomes stale.
//! - [`Catalog`] is the read-only publication view over the mirrored files.
//! - [`ProcessLock`] keeps a second process from writing the same data directory.
//!
//! Key behaviors and trade-offs
//! - Stale but valid files are resumed; only a corrupt tail (partial final row,
//!   header-only file, unparseable row) triggers a delete and rebuild of that series.
//!   `RebuildPolicy::AlwaysRebuild` is available as a conservative fallback.
//! - A live end is the start of the bucket in progress, so an unfinished candle is
//!   never written.
//! - Errors are contained per symbol: a failing symbol keeps the rows it already
//!   fetched and the pass continues with the next one.
//!
//! Examples
//! ```rust,ignore
//! use std::sync::Arc;
//! use candela::Candela;
//! use candela_binance::BinanceClient;
//! use candela_core::{CsvStore, Timeframe};
//!
//! let candela = Candela::builder()
//!     .client(BinanceClient::rate_limited().build())
//!     .store(Arc::new(CsvStore::create("data")?))
//!     .symbols(["BTC/USDT", "ETH/USDT"])
//!     .derived([Timeframe::H1, Timeframe::D1])
//!     .build()?;
//! let report = candela.run_pass().await;
//! ```
#![warn(missing_docs)]

pub(crate) mod backoff;
mod catalog;
mod core;
/// Paginated candle fetching.
pub mod fetch;
mod lock;
mod schedule;
mod sync;

pub use backoff::jitter_wait;
pub use catalog::{Catalog, CatalogEntry};
pub use crate::core::{Candela, CandelaBuilder};
pub use fetch::Paginator;
pub use lock::{LOCK_FILE_NAME, ProcessLock};
pub use schedule::SyncHandle;

pub use candela_core::{
    BackoffConfig, CandelaError, Candle, PassReport, QuotaConfig, RebuildPolicy, SeriesKey,
    SymbolOutcome, SymbolReport, SyncConfig, SyncMode, SyncPhase, SyncState, TargetEnd, Timeframe,
};
