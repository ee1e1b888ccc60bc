//! Common time and speed helpers for bump_core.

use bump_traits::Clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Longest single sleep taken by worker loops before re-checking shutdown.
pub const SHUTDOWN_SLICE: Duration = Duration::from_millis(50);

/// Transit speed in cm/s for an object crossing `separation_cm` in
/// `elapsed_ticks` ticks of length `tick`.
///
/// Returns `None` for a zero elapsed time.
#[inline]
pub fn transit_speed_cm_s(separation_cm: f32, elapsed_ticks: u64, tick: Duration) -> Option<f32> {
    let secs = elapsed_ticks as f64 * tick.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    Some((f64::from(separation_cm) / secs) as f32)
}

/// Clamp a duration to whole milliseconds in u64.
#[inline]
pub fn duration_ms(d: Duration) -> u64 {
    (d.as_millis().min(u128::from(u64::MAX))) as u64
}

/// Sleep for `total` on `clock` in slices, returning early once `shutdown` is set.
/// Returns true if the full duration elapsed.
pub fn sleep_unless_shutdown(
    clock: &(dyn Clock + Send + Sync),
    total: Duration,
    shutdown: &AtomicBool,
) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(SHUTDOWN_SLICE);
        clock.sleep(slice);
        remaining -= slice;
    }
    !shutdown.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_is_separation_over_time() {
        let v = transit_speed_cm_s(10.0, 40, Duration::from_millis(1)).unwrap();
        assert!((v - 250.0).abs() < 1e-3);
    }

    #[test]
    fn zero_elapsed_has_no_speed() {
        assert_eq!(transit_speed_cm_s(10.0, 0, Duration::from_millis(1)), None);
    }

    #[test]
    fn sliced_sleep_covers_total_on_manual_clock() {
        let clock = bump_traits::clock::ManualClock::auto_advance();
        let flag = AtomicBool::new(false);
        let epoch = clock.now();
        assert!(sleep_unless_shutdown(&clock, Duration::from_millis(175), &flag));
        assert_eq!(clock.ms_since(epoch), 175);
    }

    #[test]
    fn sliced_sleep_stops_on_shutdown() {
        let clock = bump_traits::clock::ManualClock::auto_advance();
        let flag = AtomicBool::new(true);
        assert!(!sleep_unless_shutdown(&clock, Duration::from_secs(5), &flag));
    }
}
