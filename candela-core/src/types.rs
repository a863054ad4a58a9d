//! Re-export of foundational types from `candela-types`.
// Consolidated re-exports so downstream crates can depend on `candela-core` only

pub use candela_types::{
    BackoffConfig, CandelaError, Candle, DEFAULT_START_MS, Decimal, PassReport, QuotaConfig,
    QuotaState, RebuildPolicy, SeriesKey, SymbolOutcome, SymbolReport, SyncConfig, SyncMode,
    SyncPhase, SyncState, TargetEnd, Timeframe, WriteMode,
};
