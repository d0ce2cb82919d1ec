//! Retry schedule for queued mail.
//!
//! A message that failed `n` times becomes eligible again at
//! `modified + RETRY_SEQUENCE[n] * interval`. The first entry is negative so
//! a message with no prior attempt is retried as soon as it is one interval
//! old.

use std::time::{Duration, SystemTime};

use super::SpoolError;

/// Base retry unit and scan cadence (3 minutes).
pub const RETRY_INTERVAL: Duration = Duration::from_secs(3 * 60);

/// Interval multipliers indexed by attempt count.
pub const RETRY_SEQUENCE: [i64; 21] = [
    -1, 0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233, 377, 610, 987, 1597, 2584, 4181,
];

/// Multiplier for `attempt`, or `None` once retries are exhausted.
///
/// An attempt count equal to the table length reuses the last entry.
pub fn multiplier(attempt: usize) -> Option<i64> {
    if attempt > RETRY_SEQUENCE.len() {
        return None;
    }
    RETRY_SEQUENCE
        .get(attempt)
        .or_else(|| RETRY_SEQUENCE.last())
        .copied()
}

/// Earliest time a message last modified at `modified` may be retried.
pub fn next_retry(
    modified: SystemTime,
    attempt: usize,
    interval: Duration,
) -> Result<SystemTime, SpoolError> {
    let multiplier =
        multiplier(attempt).ok_or(SpoolError::ExhaustedRetries { attempts: attempt })?;
    let factor = u32::try_from(multiplier.unsigned_abs()).unwrap_or(u32::MAX);
    let offset = interval.saturating_mul(factor);

    let next = if multiplier < 0 {
        modified.checked_sub(offset)
    } else {
        modified.checked_add(offset)
    };
    Ok(next.unwrap_or(modified))
}
