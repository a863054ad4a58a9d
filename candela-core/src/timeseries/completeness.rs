use crate::store::TailProbe;
use crate::{SyncState, TargetEnd, Timeframe};

/// Classify a series by its last stored timestamp against the target end.
///
/// - `None` → [`SyncState::Empty`]
/// - `last >= target_end_ms - tolerance_ms` → [`SyncState::Complete`]
/// - otherwise → [`SyncState::Partial`] carrying `last + timeframe_ms`, the exact
///   timestamp fetching must resume from.
#[must_use]
pub const fn assess(
    last: Option<i64>,
    target_end_ms: i64,
    timeframe_ms: i64,
    tolerance_ms: i64,
) -> SyncState {
    match last {
        None => SyncState::Empty,
        Some(ts) if ts >= target_end_ms - tolerance_ms => SyncState::Complete,
        Some(ts) => SyncState::Partial(ts + timeframe_ms),
    }
}

/// Same as [`assess`] but starting from a store probe; corruption passes through.
#[must_use]
pub fn assess_probe(
    probe: &TailProbe,
    target_end_ms: i64,
    timeframe_ms: i64,
    tolerance_ms: i64,
) -> SyncState {
    match probe {
        TailProbe::Missing => SyncState::Empty,
        TailProbe::Corrupt(reason) => SyncState::Corrupt(reason.clone()),
        TailProbe::Last(ts) => assess(Some(*ts), target_end_ms, timeframe_ms, tolerance_ms),
    }
}

/// Resolve the exclusive target end for a pass started at `now_ms`.
///
/// The end never passes the start of the bucket currently in progress, so an
/// unfinished candle is never stored, even when a fixed end lies in the future.
#[must_use]
pub const fn resolve_end(end: TargetEnd, timeframe: Timeframe, now_ms: i64) -> i64 {
    let live = timeframe.align_down(now_ms);
    match end {
        TargetEnd::Now => live,
        TargetEnd::Fixed(ms) if ms < live => ms,
        TargetEnd::Fixed(_) => live,
    }
}

/// Earliest wall-clock instant at which a live series ending at `last` stops being complete.
///
/// With a live end of `align_down(now)`, the series is complete while
/// `align_down(now) <= last + tolerance`; the first instant past that is the start of
/// the bucket following the one containing `last + tolerance`.
#[must_use]
pub const fn next_check_ms(last: i64, timeframe: Timeframe, tolerance_ms: i64) -> i64 {
    timeframe.align_down(last + tolerance_ms) + timeframe.duration_ms()
}
