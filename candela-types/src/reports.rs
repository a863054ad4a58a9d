//! Report envelopes produced by the synchronizer.

use serde::{Deserialize, Serialize};

use crate::error::CandelaError;
use crate::market::Timeframe;

/// Coverage of a stored series relative to its sync target.
///
/// Computed on demand from the series' last timestamp; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// The series reaches the target end within tolerance.
    Complete,
    /// No prior data exists.
    Empty,
    /// Data exists but stops short; fetching must resume at the carried timestamp.
    Partial(i64),
    /// The stored file could not be trusted; carries the probe's reason.
    Corrupt(String),
}

/// Per-symbol phase of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Store not yet probed.
    NotStarted,
    /// Pulling pages into the in-memory batch.
    Fetching,
    /// Writing the batch to the store.
    Flushing,
    /// Terminal for this pass.
    Done,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "not_started",
            Self::Fetching => "fetching",
            Self::Flushing => "flushing",
            Self::Done => "done",
        })
    }
}

/// What happened to one symbol's base series during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolOutcome {
    /// Already complete; no network calls were made.
    Skipped,
    /// Fetched and stored new rows.
    Synced {
        /// Rows written to the store during this pass.
        rows: usize,
        /// Number of store writes.
        flushes: usize,
        /// Whether the series was (re)created from the target start.
        created: bool,
    },
    /// The symbol failed; rows fetched before the failure were still flushed.
    Failed {
        /// Phase in which the failure surfaced.
        phase: SyncPhase,
        /// Rows written before the failure.
        rows: usize,
        /// Cause of the failure.
        error: CandelaError,
    },
}

/// Summary of one symbol within a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolReport {
    /// Exchange pair in `BASE/QUOTE` form.
    pub symbol: String,
    /// Coverage observed when the symbol was probed.
    pub initial_state: SyncState,
    /// Result of the base-series sync.
    pub outcome: SymbolOutcome,
    /// Derived timeframes regenerated after the base sync.
    pub derived: Vec<Timeframe>,
    /// Non-fatal issues (derived regeneration failures, recovered corruption).
    pub warnings: Vec<CandelaError>,
}

impl SymbolReport {
    /// True when the base series ended the pass in a failed state.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.outcome, SymbolOutcome::Failed { .. })
    }

    /// Rows written to the base series during the pass.
    #[must_use]
    pub const fn rows_written(&self) -> usize {
        match self.outcome {
            SymbolOutcome::Skipped => 0,
            SymbolOutcome::Synced { rows, .. } | SymbolOutcome::Failed { rows, .. } => rows,
        }
    }
}

/// Summary of one sequential sweep over all configured symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PassReport {
    /// Target end used for every symbol in this pass (exclusive, ms since epoch).
    pub target_end_ms: i64,
    /// One entry per configured symbol, in configuration order.
    pub symbols: Vec<SymbolReport>,
}

impl PassReport {
    /// Reports for symbols that failed.
    pub fn failures(&self) -> impl Iterator<Item = &SymbolReport> {
        self.symbols.iter().filter(|r| r.is_failed())
    }

    /// Total rows written across all symbols.
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.symbols.iter().map(SymbolReport::rows_written).sum()
    }
}
