//! Candela data transfer objects: candles, timeframes, configuration, reports and errors.
#![warn(missing_docs)]

mod config;
/// Error types shared across the workspace.
pub mod error;
mod market;
mod reports;

pub use config::{
    BackoffConfig, DEFAULT_START_MS, QuotaConfig, QuotaState, RebuildPolicy, SyncConfig,
    SyncMode, TargetEnd,
};
pub use error::CandelaError;
pub use market::{Candle, SeriesKey, Timeframe, WriteMode};
pub use reports::{PassReport, SymbolOutcome, SymbolReport, SyncPhase, SyncState};

pub use rust_decimal::Decimal;
