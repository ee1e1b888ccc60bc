use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait while `condition` holds, up to `timeout`, returning how long it held.
///
/// A zero `poll_interval` busy-spins, which is what echo pulse timing needs;
/// anything larger sleeps between polls.
pub fn wait_while_with_timeout(
    mut condition: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Duration> {
    let start = Instant::now();
    let deadline = start + timeout;
    while condition() {
        if Instant::now() >= deadline {
            return Err(HwError::EchoTimeout);
        }
        if poll_interval.is_zero() {
            std::hint::spin_loop();
        } else {
            std::thread::sleep(poll_interval);
        }
    }
    Ok(start.elapsed())
}

/// Round-trip echo time in microseconds per centimetre of distance
/// (speed of sound ~343 m/s, there and back).
pub const ECHO_US_PER_CM: f32 = 58.0;

/// Convert an echo pulse width into a one-way distance in centimetres.
#[inline]
pub fn echo_to_cm(echo: Duration) -> f32 {
    echo.as_micros() as f32 / ECHO_US_PER_CM
}
