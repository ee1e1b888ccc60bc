//! Test and helper mocks for bump_core

use std::sync::{Arc, Mutex};

/// A range sensor that always fails; drives the sensor-down path.
pub struct NoopSensor;

impl bump_traits::RangeSensor for NoopSensor {
    fn measure_cm(
        &mut self,
        _max_cm: f32,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop sensor")))
    }
}

/// Telemetry sink that keeps every `(topic, payload)` it is handed.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    published: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl bump_traits::TelemetrySink for MemorySink {
    fn publish(
        &mut self,
        topic: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Ok(mut p) = self.published.lock() {
            p.push((topic.to_string(), payload.to_string()));
        }
        Ok(())
    }
}

/// Servo that accepts `ok_pulses` commands and then fails every one after.
#[derive(Debug, Clone)]
pub struct FailingServo {
    remaining: Arc<Mutex<usize>>,
}

impl FailingServo {
    pub fn after(ok_pulses: usize) -> Self {
        Self {
            remaining: Arc::new(Mutex::new(ok_pulses)),
        }
    }
}

impl bump_traits::Servo for FailingServo {
    fn set_pulse_width_us(
        &mut self,
        _pulse_us: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut left = self
            .remaining
            .lock()
            .map_err(|_| std::io::Error::other("servo mock poisoned"))?;
        if *left == 0 {
            return Err(Box::new(std::io::Error::other("servo stalled")));
        }
        *left -= 1;
        Ok(())
    }
}
