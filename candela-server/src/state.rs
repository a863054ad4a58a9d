use std::sync::Arc;

use candela::{Catalog, PassReport};
use tokio::sync::watch;

/// Shared state handed to every route via `axum::extract::State`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Read-only view over the published series.
    pub catalog: Catalog,
    /// Latest pass report from the background synchronizer, when one is running.
    pub reports: Option<watch::Receiver<Option<Arc<PassReport>>>>,
}

impl AppState {
    /// State without a running synchronizer; `/health` reports no pass.
    #[must_use]
    pub fn new(catalog: Catalog) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            reports: None,
        })
    }

    /// State that follows the synchronizer's pass reports.
    #[must_use]
    pub fn with_reports(
        catalog: Catalog,
        reports: watch::Receiver<Option<Arc<PassReport>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            reports: Some(reports),
        })
    }

    /// Most recent pass report, if any pass has finished.
    pub fn latest_report(&self) -> Option<Arc<PassReport>> {
        self.reports.as_ref().and_then(|rx| rx.borrow().clone())
    }
}
