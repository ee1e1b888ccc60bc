use std::time::Duration;
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::{ECHO_US_PER_CM, echo_to_cm, wait_while_with_timeout};

/// HC-SR04 style ultrasonic ranger: 10 us trigger pulse, echo pulse width
/// proportional to distance.
pub struct HcSr04 {
    trigger: rppal::gpio::OutputPin,
    echo: rppal::gpio::InputPin,
    echo_start_timeout: Duration,
}

impl HcSr04 {
    pub fn new(trigger_pin: u8, echo_pin: u8) -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut trigger = gpio
            .get(trigger_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        let echo = gpio
            .get(echo_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input();
        trigger.set_low();
        Ok(Self {
            trigger,
            echo,
            echo_start_timeout: Duration::from_millis(10),
        })
    }

    pub fn measure_cm(&mut self, max_cm: f32) -> Result<f32> {
        self.trigger.set_high();
        std::thread::sleep(Duration::from_micros(10));
        self.trigger.set_low();

        let echo = &self.echo;
        // Wait for the echo line to rise
        wait_while_with_timeout(|| echo.is_low(), self.echo_start_timeout, Duration::ZERO)?;

        let max_echo = Duration::from_micros((max_cm.max(0.0) * ECHO_US_PER_CM) as u64);
        let width = wait_while_with_timeout(|| echo.is_high(), max_echo, Duration::ZERO)
            .map_err(|_| HwError::OutOfRange { max_cm })?;

        let cm = echo_to_cm(width);
        trace!(cm, echo_us = width.as_micros() as u64, "hcsr04 echo");
        Ok(cm)
    }
}
