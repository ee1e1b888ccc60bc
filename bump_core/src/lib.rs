#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Speed-bump control logic (hardware-agnostic).
//!
//! All device access goes through the traits in `bump_traits`: two
//! `RangeSensor`s, a `Servo`, a `Radio` and a `TelemetrySink`.
//!
//! ## Architecture
//!
//! - **Estimation**: edge-triggered A-to-B transit timing (`estimator`) run by
//!   a poll thread, with periodic aggregation into telemetry (`monitor`,
//!   `telemetry`)
//! - **Broadcast channel**: 18-byte advertisement codec (`payload`) and the
//!   advertiser/scanner event loops (`channel`)
//! - **Actuation**: debounced deploy/retract state machine with auto-retract
//!   (`actuator`, `trajectory`)
//! - **Nodes**: owned per-role contexts wiring it all together (`node`)
//!
//! Time is measured in milliseconds from a `bump_traits::Clock`, so every
//! timing path can be driven by a manual clock in tests.

pub mod actuator;
pub mod channel;
pub mod config;
pub mod conversions;
pub mod error;
pub mod estimator;
pub mod hw_error;
pub mod mocks;
pub mod monitor;
pub mod node;
pub mod payload;
pub mod remote;
pub mod telemetry;
pub mod trajectory;
pub mod util;
pub mod worker;

pub use actuator::{Actuator, ActuatorEvent, Phase, Reject, RetractCause, Transition};
pub use channel::{Advertiser, Role, Scanner};
pub use config::Settings;
pub use error::{BuildError, BumpError, Result};
pub use node::{ActuatorNode, ActuatorParts, SensorNode, SensorParts};
pub use payload::{AdvertisementPayload, CommandCode, DecodeError, Identity, decode, encode};
pub use telemetry::TelemetryReport;
