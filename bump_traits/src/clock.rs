use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction for polling, debounce and dwell timing.
///
/// - now(): returns a monotonic Instant
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - ms_since(): helper to compute elapsed milliseconds from an epoch Instant
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        (dur.as_millis().min(u128::from(u64::MAX))) as u64
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-clock"))]
mod manual {
    use super::*;
    use std::sync::{Arc, Condvar, Mutex};

    #[derive(Debug, Default)]
    struct State {
        offset: Duration,
        sleepers: usize,
    }

    /// Deterministic clock whose time only moves when told to.
    ///
    /// now() = origin + offset
    ///
    /// In blocking mode `sleep(d)` parks the calling thread until another
    /// thread advances the clock past the wake-up time. In auto-advance mode
    /// `sleep(d)` advances the clock by `d` and returns at once.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        origin: Instant,
        auto_advance: bool,
        state: Arc<(Mutex<State>, Condvar)>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ManualClock {
        /// Blocking mode: sleepers wait for `advance`.
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                auto_advance: false,
                state: Arc::new((Mutex::new(State::default()), Condvar::new())),
            }
        }

        /// Auto-advance mode: `sleep` moves time forward immediately.
        pub fn auto_advance() -> Self {
            Self {
                auto_advance: true,
                ..Self::new()
            }
        }

        /// Advance the clock by the given duration and wake sleepers whose deadline passed.
        pub fn advance(&self, d: Duration) {
            let (lock, cvar) = &*self.state;
            if let Ok(mut st) = lock.lock() {
                st.offset = st.offset.saturating_add(d);
            }
            cvar.notify_all();
        }

        /// Set the absolute offset relative to origin.
        pub fn set_offset(&self, d: Duration) {
            let (lock, cvar) = &*self.state;
            if let Ok(mut st) = lock.lock() {
                st.offset = d;
            }
            cvar.notify_all();
        }

        /// Current offset from the origin.
        pub fn elapsed(&self) -> Duration {
            let (lock, _) = &*self.state;
            lock.lock().map(|st| st.offset).unwrap_or(Duration::ZERO)
        }

        /// Number of threads currently parked in `sleep`.
        pub fn sleepers(&self) -> usize {
            let (lock, _) = &*self.state;
            lock.lock().map(|st| st.sleepers).unwrap_or(0)
        }

        /// Wait (in real time) until at least `n` threads are parked in `sleep`.
        /// Returns false if `timeout` elapses first.
        pub fn wait_for_sleepers(&self, n: usize, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            while self.sleepers() < n {
                if Instant::now() >= deadline {
                    return false;
                }
                thread::sleep(Duration::from_millis(1));
            }
            true
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            if d.is_zero() {
                return;
            }
            if self.auto_advance {
                self.advance(d);
                return;
            }
            let (lock, cvar) = &*self.state;
            let Ok(mut st) = lock.lock() else {
                return;
            };
            let wake_at = st.offset.saturating_add(d);
            st.sleepers += 1;
            while st.offset < wake_at {
                st = match cvar.wait(st) {
                    Ok(g) => g,
                    Err(_) => return,
                };
            }
            st.sleepers -= 1;
        }
    }
}
