use crate::{CandelaError, Candle, Timeframe};

/// Streaming bucket aggregator.
///
/// Feed base candles in ascending order with [`Resampler::push`]; a finished
/// derived candle is returned each time a candle opens a new bucket. Call
/// [`Resampler::finish`] to flush the last open bucket.
#[derive(Debug, Clone)]
pub struct Resampler {
    target: Timeframe,
    current: Option<Candle>,
    last_ts: Option<i64>,
}

impl Resampler {
    /// Aggregator producing `target` candles.
    #[must_use]
    pub const fn new(target: Timeframe) -> Self {
        Self {
            target,
            current: None,
            last_ts: None,
        }
    }

    /// Add one base candle.
    ///
    /// # Errors
    /// Returns `Data` if `candle` is not strictly after the previously pushed one.
    pub fn push(&mut self, candle: &Candle) -> Result<Option<Candle>, CandelaError> {
        if let Some(prev) = self.last_ts
            && candle.timestamp_ms <= prev
        {
            return Err(CandelaError::Data(format!(
                "resampler input not increasing: {} after {prev}",
                candle.timestamp_ms
            )));
        }
        self.last_ts = Some(candle.timestamp_ms);

        let bucket = self.target.align_down(candle.timestamp_ms);
        match self.current.as_mut() {
            Some(agg) if agg.timestamp_ms == bucket => {
                if candle.high > agg.high {
                    agg.high = candle.high;
                }
                if candle.low < agg.low {
                    agg.low = candle.low;
                }
                agg.close = candle.close;
                agg.volume += candle.volume;
                Ok(None)
            }
            _ => {
                let opened = Candle {
                    timestamp_ms: bucket,
                    ..candle.clone()
                };
                Ok(self.current.replace(opened))
            }
        }
    }

    /// Flush the bucket still being accumulated, if any.
    #[must_use]
    pub fn finish(self) -> Option<Candle> {
        self.current
    }
}

/// Aggregate `base` candles of timeframe `base_tf` into `target` buckets.
///
/// Buckets are aligned to `target`'s epoch boundaries (Monday for weeks). Each
/// non-empty bucket yields one candle: first open, max high, min low, last close,
/// summed volume, stamped with the bucket start. Empty buckets are omitted. Input is
/// sorted defensively and duplicate timestamps keep their first occurrence.
///
/// # Errors
/// Returns `InvalidArg` when `target` is not a coarser multiple of `base_tf`.
pub fn derive(
    base: &[Candle],
    base_tf: Timeframe,
    target: Timeframe,
) -> Result<Vec<Candle>, CandelaError> {
    if target == base_tf || !target.is_multiple_of(base_tf) {
        return Err(CandelaError::InvalidArg(format!(
            "cannot derive {target} from {base_tf}"
        )));
    }

    let mut sorted: Vec<&Candle> = base.iter().collect();
    if !sorted.is_sorted_by_key(|c| c.timestamp_ms) {
        sorted.sort_by_key(|c| c.timestamp_ms);
    }
    sorted.dedup_by_key(|c| c.timestamp_ms);

    let mut resampler = Resampler::new(target);
    let mut out = Vec::with_capacity(
        base.len() / usize::try_from(target.duration_ms() / base_tf.duration_ms()).unwrap_or(1)
            + 1,
    );
    for c in sorted {
        if let Some(done) = resampler.push(c)? {
            out.push(done);
        }
    }
    out.extend(resampler.finish());
    Ok(out)
}
