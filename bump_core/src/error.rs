use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BumpError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("no object within sensor range")]
    NoObject,
    #[error("radio error: {0}")]
    Radio(String),
    #[error("telemetry publish failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing servo")]
    MissingServo,
    #[error("identity name must be exactly {expected} ASCII bytes, got {got:?}")]
    InvalidIdentity { expected: usize, got: String },
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
