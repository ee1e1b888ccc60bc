pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Point distance sensor on one side of the measured road segment.
pub trait RangeSensor {
    /// Measure distance to the nearest object in centimetres.
    /// Objects farther than `max_cm` may be reported as a fault.
    fn measure_cm(&mut self, max_cm: f32)
    -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Hobby servo driven by a pulse-width modulated signal.
pub trait Servo {
    fn set_pulse_width_us(
        &mut self,
        pulse_us: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Short-range radio able to broadcast or scan advertisement payloads.
///
/// Configuration calls complete asynchronously; the radio reports completion
/// and scan results as [`RadioEvent`]s on the event queue it was created with.
pub trait Radio {
    fn configure_advertisement(
        &mut self,
        payload: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn start_advertising(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn configure_scan(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn start_scanning(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Asynchronous notifications from the radio stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// The advertisement payload has been accepted; broadcasting is not resumed implicitly.
    AdvertisementConfigured,
    AdvertisingStarted { ok: bool },
    /// Scan parameters have been accepted; scanning is not started implicitly.
    ScanConfigured,
    ScanStarted { ok: bool },
    /// Raw advertisement data received from any nearby transmitter.
    ScanResult { data: Vec<u8> },
}

/// Outbound half of the connectivity collaborator (e.g. an MQTT session).
pub trait TelemetrySink {
    fn publish(
        &mut self,
        topic: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
