use std::time::Duration;

use crate::error::{HwError, Result};

/// Standard 50 Hz servo frame.
const FRAME: Duration = Duration::from_millis(20);

/// Servo signal generated with rppal software PWM on a plain GPIO.
pub struct PwmServo {
    pin: rppal::gpio::OutputPin,
}

impl PwmServo {
    pub fn new(signal_pin: u8) -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(signal_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        Ok(Self { pin })
    }

    pub fn set_pulse_width_us(&mut self, pulse_us: u32) -> Result<()> {
        if !(500..=2500).contains(&pulse_us) {
            return Err(HwError::PulseOutOfRange(pulse_us));
        }
        self.pin
            .set_pwm(FRAME, Duration::from_micros(u64::from(pulse_us)))
            .map_err(|e| HwError::Gpio(e.to_string()))
    }
}
