//! Durable candle series storage.
//!
//! A [`SeriesStore`] owns the bytes of every series on disk. The synchronizer only
//! ever asks for the tail of a series ([`SeriesStore::probe`]) and writes whole
//! batches; full reads are reserved for resampling and publication.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CandelaError, Candle, SeriesKey, WriteMode};

mod csv_store;

pub use csv_store::{CsvStore, HEADER, encode_csv};

/// Result of a bounded tail read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TailProbe {
    /// No file exists for the series.
    Missing,
    /// The file exists but its tail cannot be trusted.
    Corrupt(String),
    /// Timestamp of the last complete row.
    Last(i64),
}

/// Metadata for one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSeries {
    /// File name relative to the store root.
    pub file_name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when the platform reports it.
    pub modified: Option<DateTime<Utc>>,
}

/// Storage contract for candle series.
///
/// All operations are synchronous; async callers run them on the blocking pool.
/// Every operation touches only the files belonging to its `SeriesKey`.
pub trait SeriesStore: Send + Sync {
    /// Inspect only a bounded tail window of the series. Never fails.
    fn probe(&self, key: &SeriesKey) -> TailProbe;

    /// Last stored timestamp, or `None` when the series is missing or corrupt.
    fn probe_last_timestamp(&self, key: &SeriesKey) -> Option<i64> {
        match self.probe(key) {
            TailProbe::Last(ts) => Some(ts),
            TailProbe::Missing | TailProbe::Corrupt(_) => None,
        }
    }

    /// Write a batch atomically: either all rows become visible or none do.
    ///
    /// # Errors
    /// Returns `Data` for batches that are not strictly increasing or do not start
    /// after the stored tail on append, and `Storage` for I/O failures.
    fn write(&self, key: &SeriesKey, candles: &[Candle], mode: WriteMode)
    -> Result<(), CandelaError>;

    /// Load the entire series.
    ///
    /// # Errors
    /// Returns `NotFound` when the series does not exist and `Storage` when a row
    /// cannot be read.
    fn read_full(&self, key: &SeriesKey) -> Result<Vec<Candle>, CandelaError>;

    /// Remove the series; a missing series is not an error.
    ///
    /// # Errors
    /// Returns `Storage` when the file exists but cannot be removed.
    fn delete(&self, key: &SeriesKey) -> Result<(), CandelaError>;

    /// Location of the series file, if it exists.
    fn path(&self, key: &SeriesKey) -> Option<PathBuf>;

    /// Every series file currently held by the store.
    ///
    /// # Errors
    /// Returns `Storage` when the store root cannot be listed.
    fn list(&self) -> Result<Vec<StoredSeries>, CandelaError>;
}
