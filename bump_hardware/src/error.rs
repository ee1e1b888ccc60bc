use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("ultrasonic echo timeout")]
    EchoTimeout,
    #[error("no object within {max_cm} cm")]
    OutOfRange { max_cm: f32 },
    #[error("sensor read failed")]
    NoReading,
    #[error("servo pulse {0} us outside 500..=2500")]
    PulseOutOfRange(u32),
    #[error("radio not ready: {0}")]
    Radio(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
