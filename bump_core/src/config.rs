//! Runtime configuration for the estimator, broadcast channel, actuator and
//! telemetry. Defaults carry the reference deployment constants.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorCfg {
    /// Sensor poll period (ms)
    pub poll_ms: u64,
    /// Distance between sensor A and sensor B along the road (cm)
    pub separation_cm: f32,
    /// Readings below this count as a detection (cm)
    pub proximity_cm: f32,
    /// Pending starts older than this are discarded (ms)
    pub max_transit_ms: u64,
    /// Samples kept per aggregation interval
    pub capacity: usize,
    /// Speeds above this request a deploy (cm/s)
    pub deploy_threshold_cm_s: f32,
    /// Consecutive faults before a sensor is reported down
    pub fault_after: u32,
}

impl Default for EstimatorCfg {
    fn default() -> Self {
        Self {
            poll_ms: 50,
            separation_cm: 10.0,
            proximity_cm: 60.0,
            max_transit_ms: 2000,
            capacity: 100,
            deploy_threshold_cm_s: 50.0,
            fault_after: 3,
        }
    }
}

impl EstimatorCfg {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub data: String,
    pub command: String,
    pub upgrade: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            data: "/device/data".into(),
            command: "/device/bump".into(),
            upgrade: "/device/upgrade".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryCfg {
    pub interval_ms: u64,
    pub device_id: String,
    pub firmware_version: String,
    pub topics: Topics,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            device_id: "sensor_1".into(),
            firmware_version: env!("CARGO_PKG_VERSION").into(),
            topics: Topics::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastCfg {
    pub transient_dwell_ms: u64,
}

impl Default for BroadcastCfg {
    fn default() -> Self {
        Self {
            transient_dwell_ms: 2000,
        }
    }
}

impl BroadcastCfg {
    pub fn transient_dwell(&self) -> Duration {
        Duration::from_millis(self.transient_dwell_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorCfg {
    /// Minimum spacing between accepted transitions (ms)
    pub min_delay_ms: u64,
    /// Settle delay after each 1 degree step (ms)
    pub settle_ms: u64,
    /// Auto-retract dwell after a deploy completes (ms)
    pub dwell_ms: u64,
    pub min_pulse_us: u32,
    pub max_pulse_us: u32,
    pub max_angle_deg: u16,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            min_delay_ms: 50,
            settle_ms: 1,
            dwell_ms: 10_000,
            min_pulse_us: 500,
            max_pulse_us: 2500,
            max_angle_deg: 180,
        }
    }
}

/// Everything a node needs at runtime, assembled from the TOML config.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub identity_name: String,
    pub estimator: EstimatorCfg,
    pub telemetry: TelemetryCfg,
    pub broadcast: BroadcastCfg,
    pub actuator: ActuatorCfg,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            identity_name: crate::payload::DEFAULT_NAME.into(),
            estimator: EstimatorCfg::default(),
            telemetry: TelemetryCfg::default(),
            broadcast: BroadcastCfg::default(),
            actuator: ActuatorCfg::default(),
        }
    }
}
