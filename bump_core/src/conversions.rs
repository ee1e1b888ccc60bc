//! Conversions from `bump_config` (TOML schema) into runtime configs.

use crate::config::{ActuatorCfg, BroadcastCfg, EstimatorCfg, Settings, TelemetryCfg, Topics};

impl From<&bump_config::EstimatorCfg> for EstimatorCfg {
    fn from(e: &bump_config::EstimatorCfg) -> Self {
        Self {
            poll_ms: e.poll_ms,
            separation_cm: e.separation_cm,
            proximity_cm: e.proximity_cm,
            max_transit_ms: e.max_transit_ms,
            capacity: e.capacity,
            deploy_threshold_cm_s: e.deploy_threshold_cm_s,
            fault_after: e.fault_after,
        }
    }
}

impl From<&bump_config::BroadcastCfg> for BroadcastCfg {
    fn from(b: &bump_config::BroadcastCfg) -> Self {
        Self {
            transient_dwell_ms: b.transient_dwell_ms,
        }
    }
}

impl From<&bump_config::ActuatorCfg> for ActuatorCfg {
    fn from(a: &bump_config::ActuatorCfg) -> Self {
        Self {
            min_delay_ms: a.min_delay_ms,
            settle_ms: a.settle_ms,
            dwell_ms: a.dwell_ms,
            min_pulse_us: a.min_pulse_us,
            max_pulse_us: a.max_pulse_us,
            max_angle_deg: a.max_angle_deg,
        }
    }
}

impl From<&bump_config::Config> for TelemetryCfg {
    fn from(c: &bump_config::Config) -> Self {
        Self {
            interval_ms: c.telemetry.interval_ms,
            device_id: c.node.device_id.clone(),
            firmware_version: c.node.firmware_version.clone(),
            topics: Topics {
                data: c.telemetry.data_topic.clone(),
                command: c.telemetry.command_topic.clone(),
                upgrade: c.telemetry.upgrade_topic.clone(),
            },
        }
    }
}

impl From<&bump_config::Config> for Settings {
    fn from(c: &bump_config::Config) -> Self {
        Self {
            identity_name: c.identity.name.clone(),
            estimator: (&c.estimator).into(),
            telemetry: c.into(),
            broadcast: (&c.broadcast).into(),
            actuator: (&c.actuator).into(),
        }
    }
}
