//! Periodic telemetry record and its JSON wire shape.

use serde::{Deserialize, Serialize};

use crate::config::TelemetryCfg;
use crate::error::{BumpError, Result};
use crate::estimator::{Side, WindowSummary};

/// One aggregation interval as published on the telemetry topic:
///
/// ```json
/// {"device":"sensor_1","version":"0.1.0","data":{"avg_speed":250.0,...}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    #[serde(rename = "device")]
    pub device_id: String,
    #[serde(rename = "version")]
    pub firmware_version: String,
    pub data: TelemetryData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryData {
    pub avg_speed: f32,
    pub max_speed: f32,
    pub min_speed: f32,
    #[serde(rename = "num_cars")]
    pub sample_count: usize,
    pub sensor_1_up: bool,
    pub sensor_2_up: bool,
    pub degraded: bool,
    pub dropped: u32,
}

impl TelemetryReport {
    pub fn from_summary(cfg: &TelemetryCfg, summary: &WindowSummary) -> Self {
        Self {
            device_id: cfg.device_id.clone(),
            firmware_version: cfg.firmware_version.clone(),
            data: TelemetryData {
                avg_speed: summary.avg_speed,
                max_speed: summary.max_speed,
                min_speed: summary.min_speed,
                sample_count: summary.count,
                sensor_1_up: summary.sensor_up(Side::A),
                sensor_2_up: summary.sensor_up(Side::B),
                degraded: summary.degraded(),
                dropped: summary.dropped,
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| eyre::Report::new(BumpError::Telemetry(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_wire_keys() {
        let summary = WindowSummary {
            min_speed: 100.0,
            max_speed: 250.0,
            avg_speed: 175.0,
            count: 2,
            sensor_up: [true, false],
            dropped: 0,
        };
        let report = TelemetryReport::from_summary(&TelemetryCfg::default(), &summary);
        let v: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(v["device"], "sensor_1");
        assert_eq!(v["data"]["num_cars"], 2);
        assert_eq!(v["data"]["sensor_2_up"], false);
        assert_eq!(v["data"]["degraded"], true);
        assert_eq!(v["data"]["max_speed"], 250.0);
    }
}
