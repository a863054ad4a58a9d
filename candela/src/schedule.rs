//! Background driver for sync passes.
//!
//! `SyncMode::Once` runs a single pass. `SyncMode::Poll` tracks when each symbol
//! next needs attention: live series come due when the wall clock moves past
//! [`next_check_ms`], complete fixed-range series are never checked again, and
//! symbols that failed retry after the poll interval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use candela_core::{
    PassReport, SymbolReport, SyncMode, SyncState, TailProbe, TargetEnd, TaskHandle, assess,
    next_check_ms,
};
use tokio::sync::{oneshot, watch};

use crate::core::Candela;

/// Handle to a running synchronizer task.
///
/// `stop().await` finishes the current store write and exits; dropping the handle
/// aborts the task.
#[derive(Debug)]
pub struct SyncHandle {
    task: TaskHandle,
    reports: watch::Receiver<Option<Arc<PassReport>>>,
}

impl SyncHandle {
    /// Ask the task to stop and wait for it.
    pub async fn stop(self) {
        self.task.stop().await;
    }

    /// Wait for the task to finish on its own.
    pub async fn join(self) {
        self.task.join().await;
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Most recent round report, if any round has completed.
    #[must_use]
    pub fn latest_report(&self) -> Option<Arc<PassReport>> {
        self.reports.borrow().clone()
    }

    /// Receiver notified after every completed round.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<PassReport>>> {
        self.reports.clone()
    }
}

/// When a symbol should next be synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Due {
    At(i64),
    Never,
}

impl Candela {
    /// Run the configured sync mode on a background task.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> SyncHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (report_tx, report_rx) = watch::channel(None);
        let join = tokio::spawn(async move {
            match self.cfg.mode {
                SyncMode::Once => {
                    tokio::select! {
                        _ = &mut stop_rx => {}
                        report = self.run_pass() => {
                            report_tx.send_replace(Some(Arc::new(report)));
                        }
                    }
                }
                SyncMode::Poll { min_interval } => {
                    self.poll(min_interval, &mut stop_rx, &report_tx).await;
                }
            }
            #[cfg(feature = "tracing")]
            tracing::info!("synchronizer stopped");
        });
        SyncHandle {
            task: TaskHandle::new(join, stop_tx),
            reports: report_rx,
        }
    }

    async fn poll(
        &self,
        min_interval: Duration,
        stop_rx: &mut oneshot::Receiver<()>,
        reports: &watch::Sender<Option<Arc<PassReport>>>,
    ) {
        let mut due: HashMap<String, Due> = HashMap::new();
        loop {
            let now = self.client.current_time_ms();
            let pending: Vec<&String> = self
                .cfg
                .symbols
                .iter()
                .filter(|s| match due.get(s.as_str()) {
                    None => true,
                    Some(Due::At(at)) => *at <= now,
                    Some(Due::Never) => false,
                })
                .collect();

            if !pending.is_empty() {
                let target_end_ms = self.target_end_ms();
                let round = async {
                    let mut symbols = Vec::with_capacity(pending.len());
                    for symbol in &pending {
                        symbols.push(self.sync_symbol(symbol, target_end_ms).await);
                    }
                    symbols
                };
                let symbols = tokio::select! {
                    _ = &mut *stop_rx => return,
                    symbols = round => symbols,
                };
                for report in &symbols {
                    let next = self.next_due(report, min_interval).await;
                    due.insert(report.symbol.clone(), next);
                }
                #[cfg(feature = "tracing")]
                tracing::info!(
                    synced = symbols.len(),
                    rows = symbols.iter().map(SymbolReport::rows_written).sum::<usize>(),
                    "poll round finished"
                );
                reports.send_replace(Some(Arc::new(PassReport {
                    target_end_ms,
                    symbols,
                })));
            }

            let Some(earliest) = due
                .values()
                .filter_map(|d| match d {
                    Due::At(at) => Some(*at),
                    Due::Never => None,
                })
                .min()
            else {
                // Every series covers its fixed range.
                return;
            };
            let now = self.client.current_time_ms();
            let wait = Duration::from_millis(u64::try_from(earliest - now).unwrap_or(0))
                .max(min_interval);
            #[cfg(feature = "tracing")]
            tracing::debug!(wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX), "sleeping until next due symbol");
            tokio::select! {
                _ = &mut *stop_rx => return,
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn next_due(&self, report: &SymbolReport, min_interval: Duration) -> Due {
        let now = self.client.current_time_ms();
        let interval_ms = i64::try_from(min_interval.as_millis()).unwrap_or(i64::MAX);
        let retry = Due::At(now.saturating_add(interval_ms));
        if report.is_failed() {
            return retry;
        }
        let key = self.cfg.base_key(&report.symbol);
        let Ok(TailProbe::Last(last)) = self.on_store(&key, |s, k| Ok(s.probe(k))).await else {
            return retry;
        };
        let tf = self.cfg.timeframe;
        match self.cfg.end {
            TargetEnd::Now => Due::At(next_check_ms(last, tf, self.cfg.tolerance_ms)),
            TargetEnd::Fixed(end) => {
                if assess(Some(last), end, tf.duration_ms(), self.cfg.tolerance_ms)
                    == SyncState::Complete
                {
                    Due::Never
                } else {
                    retry
                }
            }
        }
    }
}
