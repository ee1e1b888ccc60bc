#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and sensor trace parsing for the speed-bump nodes.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The trace CSV loader enforces headers and monotonic timestamps; it feeds
//!   the simulated range sensors.
use serde::Deserialize;

/// Sensor trace CSV schema.
///
/// Expected headers:
/// t_ms,sensor_a_cm,sensor_b_cm
///
/// An empty cell is a failed read on that sensor.
///
/// Example:
/// t_ms,sensor_a_cm,sensor_b_cm
/// 0,400,400
/// 100,20,400
/// 140,400,20
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    pub t_ms: u64,
    pub sensor_a_cm: Option<f32>,
    pub sensor_b_cm: Option<f32>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Measures speed, publishes telemetry and advertises commands.
    #[default]
    Sensor,
    /// Scans for commands and drives the servo.
    Actuator,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeCfg {
    pub device_id: String,
    pub firmware_version: String,
    pub role: Role,
}

impl Default for NodeCfg {
    fn default() -> Self {
        Self {
            device_id: "sensor_1".into(),
            firmware_version: env!("CARGO_PKG_VERSION").into(),
            role: Role::Sensor,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IdentityCfg {
    /// Complete local name carried in every advertisement (exactly 10 ASCII bytes).
    pub name: String,
}

impl Default for IdentityCfg {
    fn default() -> Self {
        Self {
            name: "Speed Bump".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pins {
    pub sensor_a_trigger: u8,
    pub sensor_a_echo: u8,
    pub sensor_b_trigger: u8,
    pub sensor_b_echo: u8,
    pub servo: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            sensor_a_trigger: 5,
            sensor_a_echo: 18,
            sensor_b_trigger: 19,
            sensor_b_echo: 21,
            servo: 26,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EstimatorCfg {
    /// Sensor poll period (ms)
    pub poll_ms: u64,
    /// Distance between the two sensors along the road (cm)
    pub separation_cm: f32,
    /// A reading closer than this counts as a detection (cm)
    pub proximity_cm: f32,
    /// Pending starts older than this are discarded (ms)
    pub max_transit_ms: u64,
    /// Samples kept per telemetry interval
    pub capacity: usize,
    /// Speeds above this trigger a deploy (cm/s)
    pub deploy_threshold_cm_s: f32,
    /// Consecutive failed reads before a sensor is reported down
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelemetryCfg {
    pub interval_ms: u64,
    pub data_topic: String,
    pub command_topic: String,
    pub upgrade_topic: String,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            data_topic: "/device/data".into(),
            command_topic: "/device/bump".into(),
            upgrade_topic: "/device/upgrade".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BroadcastCfg {
    /// How long a deploy/retract advertisement is held before reverting to idle (ms)
    pub transient_dwell_ms: u64,
}

impl Default for BroadcastCfg {
    fn default() -> Self {
        Self {
            transient_dwell_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ActuatorCfg {
    /// Minimum time between accepted transitions (ms)
    pub min_delay_ms: u64,
    /// Settle delay after each 1 degree step (ms)
    pub settle_ms: u64,
    /// Time a deployed bump stays up before retracting on its own (ms)
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

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub node: NodeCfg,
    pub identity: IdentityCfg,
    pub pins: Pins,
    pub estimator: EstimatorCfg,
    pub telemetry: TelemetryCfg,
    pub broadcast: BroadcastCfg,
    pub actuator: ActuatorCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read a sensor trace from any CSV source.
pub fn read_trace<R: std::io::Read>(source: R) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read trace CSV headers: {}", e))?
        .clone();
    let expected = ["t_ms", "sensor_a_cm", "sensor_b_cm"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "trace CSV must have headers 't_ms,sensor_a_cm,sensor_b_cm', got: {}",
            actual.join(",")
        );
    }

    let mut rows: Vec<TraceRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if let Some(prev) = rows.last()
            && row.t_ms < prev.t_ms
        {
            eyre::bail!(
                "trace timestamps must not decrease (row {}: {} < {})",
                idx + 2,
                row.t_ms,
                prev.t_ms
            );
        }
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("trace CSV has no rows");
    }
    Ok(rows)
}

pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;
    read_trace(file)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Node
        if self.node.device_id.trim().is_empty() {
            eyre::bail!("node.device_id must not be empty");
        }

        // Identity
        let name = &self.identity.name;
        if !name.is_ascii() || name.len() != 10 {
            eyre::bail!("identity.name must be exactly 10 ASCII characters");
        }

        // Estimator
        let est = &self.estimator;
        if est.poll_ms == 0 {
            eyre::bail!("estimator.poll_ms must be >= 1");
        }
        if !(est.separation_cm.is_finite() && est.separation_cm > 0.0) {
            eyre::bail!("estimator.separation_cm must be > 0");
        }
        if !(est.proximity_cm.is_finite() && est.proximity_cm > 0.0) {
            eyre::bail!("estimator.proximity_cm must be > 0");
        }
        if est.max_transit_ms <= est.poll_ms {
            eyre::bail!("estimator.max_transit_ms must be greater than estimator.poll_ms");
        }
        if est.capacity == 0 {
            eyre::bail!("estimator.capacity must be >= 1");
        }
        if !(est.deploy_threshold_cm_s.is_finite() && est.deploy_threshold_cm_s > 0.0) {
            eyre::bail!("estimator.deploy_threshold_cm_s must be > 0");
        }
        if est.fault_after == 0 {
            eyre::bail!("estimator.fault_after must be >= 1");
        }

        // Telemetry
        if self.telemetry.interval_ms < est.poll_ms {
            eyre::bail!("telemetry.interval_ms must be >= estimator.poll_ms");
        }
        for (key, topic) in [
            ("data_topic", &self.telemetry.data_topic),
            ("command_topic", &self.telemetry.command_topic),
            ("upgrade_topic", &self.telemetry.upgrade_topic),
        ] {
            if topic.trim().is_empty() {
                eyre::bail!("telemetry.{key} must not be empty");
            }
        }

        // Broadcast
        if self.broadcast.transient_dwell_ms == 0 {
            eyre::bail!("broadcast.transient_dwell_ms must be >= 1");
        }

        // Actuator
        let act = &self.actuator;
        if act.min_pulse_us >= act.max_pulse_us {
            eyre::bail!("actuator.min_pulse_us must be below actuator.max_pulse_us");
        }
        if act.min_pulse_us < 500 || act.max_pulse_us > 2500 {
            eyre::bail!("actuator pulse range must lie within 500..=2500 us");
        }
        if act.max_angle_deg == 0 || act.max_angle_deg > 180 {
            eyre::bail!("actuator.max_angle_deg must be in 1..=180");
        }
        if act.dwell_ms <= act.min_delay_ms {
            eyre::bail!("actuator.dwell_ms must exceed actuator.min_delay_ms");
        }
        if act.settle_ms > 1000 {
            eyre::bail!("actuator.settle_ms is unreasonably large (>1s per degree)");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
