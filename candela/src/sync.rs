//! Per-symbol synchronization passes.

use std::sync::Arc;

use candela_core::{
    CandelaError, Candle, PassReport, RebuildPolicy, SeriesKey, SeriesStore, SymbolOutcome,
    SymbolReport, SyncPhase, SyncState, TailProbe, Timeframe, WriteMode, assess_probe, derive,
    resolve_end,
};

use crate::core::Candela;
use crate::fetch::Paginator;

/// Running tally of what a symbol sync has written.
struct Progress {
    mode: WriteMode,
    rows: usize,
    flushes: usize,
    created: bool,
}

impl Candela {
    /// Resolve the exclusive target end for a pass started now.
    #[must_use]
    pub fn target_end_ms(&self) -> i64 {
        resolve_end(
            self.cfg.end,
            self.cfg.timeframe,
            self.client.current_time_ms(),
        )
    }

    /// Run one sequential pass over every configured symbol.
    ///
    /// Failures are contained per symbol and reported; the pass never aborts early.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "candela::run_pass", skip(self), fields(symbols = self.cfg.symbols.len()))
    )]
    pub async fn run_pass(&self) -> PassReport {
        let target_end_ms = self.target_end_ms();
        let mut symbols = Vec::with_capacity(self.cfg.symbols.len());
        for symbol in &self.cfg.symbols {
            symbols.push(self.sync_symbol(symbol, target_end_ms).await);
        }
        let report = PassReport {
            target_end_ms,
            symbols,
        };
        #[cfg(feature = "tracing")]
        tracing::info!(
            target_end_ms,
            rows = report.rows_written(),
            failed = report.failures().count(),
            "sync pass finished"
        );
        report
    }

    /// Bring one symbol's base series (and its derived series) up to `target_end_ms`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "candela::sync_symbol", skip(self), fields(timeframe = %self.cfg.timeframe))
    )]
    pub async fn sync_symbol(&self, symbol: &str, target_end_ms: i64) -> SymbolReport {
        let key = self.cfg.base_key(symbol);
        let tf = self.cfg.timeframe;

        let probe = match self.on_store(&key, |s, k| Ok(s.probe(k))).await {
            Ok(p) => p,
            Err(e) => {
                log_not_started(symbol, &e);
                return failed(symbol, SyncState::Empty, SyncPhase::NotStarted, 0, e);
            }
        };
        let initial_state =
            assess_probe(&probe, target_end_ms, tf.duration_ms(), self.cfg.tolerance_ms);
        let mut report = SymbolReport {
            symbol: symbol.to_string(),
            initial_state: initial_state.clone(),
            outcome: SymbolOutcome::Skipped,
            derived: Vec::new(),
            warnings: Vec::new(),
        };

        let plan = match initial_state {
            SyncState::Complete => None,
            SyncState::Empty => Some((WriteMode::Create, self.cfg.start_ms)),
            SyncState::Partial(resume_from) => match self.cfg.rebuild_policy {
                RebuildPolicy::AlwaysRebuild => {
                    if let Err(e) = self.on_store(&key, |s, k| s.delete(k)).await {
                        log_not_started(symbol, &e);
                        report.outcome = failed_outcome(SyncPhase::NotStarted, 0, e);
                        return report;
                    }
                    Some((WriteMode::Create, self.cfg.start_ms))
                }
                _ => Some((WriteMode::Append, resume_from)),
            },
            SyncState::Corrupt(reason) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(symbol, file = %key.file_name(), reason = %reason, "corrupt series; rebuilding");
                report.warnings.push(CandelaError::storage(key.file_name(), &reason));
                if let Err(e) = self.on_store(&key, |s, k| s.delete(k)).await {
                    log_not_started(symbol, &e);
                    report.outcome = failed_outcome(SyncPhase::NotStarted, 0, e);
                    return report;
                }
                Some((WriteMode::Create, self.cfg.start_ms))
            }
        };

        if let Some((mode, since_ms)) = plan {
            let last_stored = match (&probe, mode) {
                (TailProbe::Last(ts), WriteMode::Append) => Some(*ts),
                _ => None,
            };
            report.outcome = self
                .fill(&key, mode, since_ms, target_end_ms, last_stored)
                .await;
        }

        if !report.is_failed() {
            self.refresh_derived(&key, report.rows_written() > 0, &mut report)
                .await;
        }
        report
    }

    /// Fetch `[since_ms, target_end_ms)` and write it through the store in batches.
    async fn fill(
        &self,
        key: &SeriesKey,
        mode: WriteMode,
        since_ms: i64,
        target_end_ms: i64,
        last_stored: Option<i64>,
    ) -> SymbolOutcome {
        let mut pager = Paginator::new(
            Arc::clone(&self.client),
            key.symbol.clone(),
            key.timeframe,
            since_ms,
            target_end_ms,
            self.cfg.page_limit,
            self.cfg.backoff,
        );
        let mut progress = Progress {
            mode,
            rows: 0,
            flushes: 0,
            created: false,
        };
        let mut batch: Vec<Candle> = Vec::with_capacity(self.cfg.flush_rows.min(65_536));
        let mut last_seen = last_stored;

        #[cfg(feature = "tracing")]
        tracing::debug!(symbol = %key.symbol, phase = %SyncPhase::Fetching, cursor = since_ms, mode = ?mode, "fetching");

        loop {
            match pager.next_page().await {
                Ok(Some(page)) => {
                    for candle in page {
                        if last_seen.is_some_and(|prev| candle.timestamp_ms <= prev) {
                            continue;
                        }
                        last_seen = Some(candle.timestamp_ms);
                        batch.push(candle);
                        if batch.len() >= self.cfg.flush_rows
                            && let Err(e) = self.flush(key, &mut batch, &mut progress).await
                        {
                            return failed_outcome(SyncPhase::Flushing, progress.rows, e);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(
                        symbol = %key.symbol,
                        phase = %SyncPhase::Fetching,
                        rows = progress.rows + batch.len(),
                        cursor = pager.cursor(),
                        error = %e,
                        "fetch failed; keeping rows fetched so far"
                    );
                    // Fetched rows are valid and contiguous, so persist them first.
                    if let Err(flush_err) = self.flush(key, &mut batch, &mut progress).await {
                        return failed_outcome(SyncPhase::Flushing, progress.rows, flush_err);
                    }
                    return failed_outcome(SyncPhase::Fetching, progress.rows, e);
                }
            }
        }

        if let Err(e) = self.flush(key, &mut batch, &mut progress).await {
            return failed_outcome(SyncPhase::Flushing, progress.rows, e);
        }
        #[cfg(feature = "tracing")]
        tracing::info!(
            symbol = %key.symbol,
            phase = %SyncPhase::Done,
            rows = progress.rows,
            flushes = progress.flushes,
            cursor = pager.cursor(),
            "series up to date"
        );
        SymbolOutcome::Synced {
            rows: progress.rows,
            flushes: progress.flushes,
            created: progress.created,
        }
    }

    async fn flush(
        &self,
        key: &SeriesKey,
        batch: &mut Vec<Candle>,
        progress: &mut Progress,
    ) -> Result<(), CandelaError> {
        if batch.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(batch);
        let n = rows.len();
        let mode = progress.mode;
        self.on_store(key, move |s, k| s.write(k, &rows, mode))
            .await
            .inspect_err(|_e| {
                #[cfg(feature = "tracing")]
                tracing::error!(symbol = %key.symbol, phase = %SyncPhase::Flushing, rows = n, error = %_e, "flush failed");
            })?;
        progress.rows += n;
        progress.flushes += 1;
        if mode == WriteMode::Create {
            progress.created = true;
            progress.mode = WriteMode::Append;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(symbol = %key.symbol, phase = %SyncPhase::Flushing, rows = n, total = progress.rows, "flushed batch");
        Ok(())
    }

    /// Regenerate derived series when the base changed or a derived file is missing.
    async fn refresh_derived(&self, base: &SeriesKey, base_changed: bool, report: &mut SymbolReport) {
        if self.cfg.derived.is_empty() {
            return;
        }
        let derived = self.cfg.derived.clone();
        let base_tf = base.timeframe;
        let results = self
            .on_store(base, move |s, k| {
                let missing = derived
                    .iter()
                    .any(|tf| s.path(&k.with_timeframe(*tf)).is_none());
                if !(base_changed || missing) || s.path(k).is_none() {
                    return Ok(Vec::new());
                }
                let candles = s.read_full(k)?;
                Ok(regenerate(s, k, &candles, base_tf, &derived))
            })
            .await;

        match results {
            Ok(per_tf) => {
                for (tf, res) in per_tf {
                    match res {
                        Ok(()) => report.derived.push(tf),
                        Err(e) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(symbol = %base.symbol, timeframe = %tf, error = %e, "derived series not regenerated");
                            report.warnings.push(e);
                        }
                    }
                }
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(symbol = %base.symbol, error = %e, "base series unreadable; derived series left as is");
                report.warnings.push(e);
            }
        }
    }

    /// Run a store operation for `key` on the blocking pool.
    pub(crate) async fn on_store<T, F>(&self, key: &SeriesKey, op: F) -> Result<T, CandelaError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SeriesStore, &SeriesKey) -> Result<T, CandelaError> + Send + 'static,
    {
        run_blocking(Arc::clone(&self.store), key.clone(), op).await
    }
}

pub(crate) async fn run_blocking<T, F>(
    store: Arc<dyn SeriesStore>,
    key: SeriesKey,
    op: F,
) -> Result<T, CandelaError>
where
    T: Send + 'static,
    F: FnOnce(&dyn SeriesStore, &SeriesKey) -> Result<T, CandelaError> + Send + 'static,
{
    let file = key.file_name();
    tokio::task::spawn_blocking(move || op(store.as_ref(), &key))
        .await
        .map_err(|e| CandelaError::storage(file, format!("store task failed: {e}")))?
}

fn regenerate(
    store: &dyn SeriesStore,
    base: &SeriesKey,
    candles: &[Candle],
    base_tf: Timeframe,
    targets: &[Timeframe],
) -> Vec<(Timeframe, Result<(), CandelaError>)> {
    targets
        .iter()
        .map(|tf| {
            let res = derive(candles, base_tf, *tf)
                .and_then(|out| store.write(&base.with_timeframe(*tf), &out, WriteMode::Create));
            (*tf, res)
        })
        .collect()
}

fn log_not_started(_symbol: &str, _error: &CandelaError) {
    #[cfg(feature = "tracing")]
    tracing::error!(symbol = _symbol, phase = %SyncPhase::NotStarted, error = %_error, "symbol sync failed");
}

fn failed_outcome(phase: SyncPhase, rows: usize, error: CandelaError) -> SymbolOutcome {
    SymbolOutcome::Failed { phase, rows, error }
}

fn failed(
    symbol: &str,
    initial_state: SyncState,
    phase: SyncPhase,
    rows: usize,
    error: CandelaError,
) -> SymbolReport {
    SymbolReport {
        symbol: symbol.to_string(),
        initial_state,
        outcome: failed_outcome(phase, rows, error),
        derived: Vec::new(),
        warnings: Vec::new(),
    }
}
