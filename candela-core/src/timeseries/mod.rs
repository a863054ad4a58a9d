//! Time-series utilities shared by the synchronizer and the publication layer.
//!
//! Modules include:
//! - `completeness`: classify a stored series against its sync target
//! - `resample`: aggregate base candles into coarser timeframes
/// Completeness assessment and next-check scheduling.
pub mod completeness;
/// Bucket aggregation from a base timeframe to a coarser one.
pub mod resample;
