use std::time::Duration;

use candela_core::BackoffConfig;
use rand::Rng;

/// Apply random jitter on top of a base delay.
///
/// With `jitter_percent == 0` the base delay is returned unchanged.
#[must_use]
pub fn jitter_wait(base_ms: u64, jitter_percent: u32) -> u64 {
    if jitter_percent == 0 {
        return base_ms;
    }
    let jitter_range = std::cmp::max(1, base_ms.saturating_mul(u64::from(jitter_percent)) / 100);
    let mut rng = rand::rng();
    base_ms + rng.random_range(0..jitter_range)
}

/// Delay to sleep before retrying a transient failure.
#[must_use]
pub fn retry_delay(cfg: &BackoffConfig) -> Duration {
    Duration::from_millis(jitter_wait(cfg.delay_ms, u32::from(cfg.jitter_percent)))
}
