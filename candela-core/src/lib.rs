//! candela-core
//!
//! Contracts and pure algorithms shared across the Candela workspace.
//!
//! - `connector`: the `ExchangeClient` trait every upstream implements.
//! - `middleware`: the `Middleware` trait used to wrap clients.
//! - `store`: the `SeriesStore` contract and its CSV implementation.
//! - `timeseries`: completeness assessment and resampling.
//! - `task`: a handle for background tasks with graceful stop.
//!
//! Async runtime (Tokio)
//! ---------------------
//! `task::TaskHandle` wraps `tokio::task::JoinHandle<()>` and uses a
//! `tokio::sync::oneshot::Sender<()>` for cooperative shutdown, so code that
//! spawns the synchronizer must run under a Tokio 1.x runtime.
//!
#![warn(missing_docs)]

/// The narrow exchange contract the synchronizer depends on.
pub mod connector;
/// Middleware trait implemented by client wrappers.
pub mod middleware;
/// Durable candle series storage.
pub mod store;
/// Background task handle used by the scheduler.
pub mod task;
/// Completeness assessment and resampling.
pub mod timeseries;
pub mod types;

pub use connector::ExchangeClient;
pub use middleware::Middleware;
pub use store::{CsvStore, SeriesStore, StoredSeries, TailProbe};
pub use task::TaskHandle;
pub use timeseries::completeness::{assess, assess_probe, next_check_ms, resolve_end};
pub use timeseries::resample::{Resampler, derive};
pub use types::*;
