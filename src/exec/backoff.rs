// src/exec/backoff.rs

//! Delay policy between fetch attempts of the same job.

use std::time::Duration;

/// Base delay used by [`JobExecutor`](super::JobExecutor) unless overridden.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);

/// Longest single pause between two attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Delay before the next attempt, given how many attempts already failed.
///
/// ```text
/// failed 1  -> immediate
/// failed 2  -> base
/// failed 3  -> base * 2
/// failed n  -> base * 2^(n-2), capped at MAX_RETRY_DELAY
/// ```
pub fn retry_delay(base: Duration, failed_attempts: u32) -> Duration {
    match failed_attempts {
        0 | 1 => Duration::ZERO,
        n => {
            let factor = 1u32 << (n - 2).min(16);
            base.saturating_mul(factor).min(MAX_RETRY_DELAY)
        }
    }
}
