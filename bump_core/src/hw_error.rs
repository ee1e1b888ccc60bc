//! Maps `Box<dyn Error>` from trait boundaries to typed `BumpError`.
//!
//! The traits in `bump_traits` use `Box<dyn Error + Send + Sync>` so any
//! device or collaborator can plug in; this module converts those to our
//! typed error enum, with an optional feature-gated path for
//! `bump_hardware::HwError` downcasting.

use crate::error::BumpError;

/// Map a sensor/servo boundary error to a typed `BumpError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> BumpError {
    #[cfg(feature = "hardware-errors")]
    {
        use bump_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::EchoTimeout => BumpError::Timeout,
                HwError::OutOfRange { .. } => BumpError::NoObject,
                HwError::Radio(msg) => BumpError::Radio(msg.clone()),
                other => BumpError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") {
        BumpError::Timeout
    } else if lower.contains("no object") || lower.contains("out of range") {
        BumpError::NoObject
    } else {
        BumpError::Hardware(s)
    }
}

/// Map a radio boundary error; everything the radio reports is a radio fault.
pub fn map_radio_error(e: &(dyn std::error::Error + 'static)) -> BumpError {
    match map_hw_error(e) {
        BumpError::Radio(msg) => BumpError::Radio(msg),
        other => BumpError::Radio(other.to_string()),
    }
}
