//! In-process simulation: a sensor node and an actuator node sharing a
//! loopback radio, fed by a sensor trace or by synthetic vehicles.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bump_config::TraceRow;
use bump_core::config::Settings;
use bump_core::{ActuatorNode, ActuatorParts, BumpError, SensorNode, SensorParts};
use bump_hardware::{LoopbackAir, LoopbackRadio, OPEN_ROAD_CM, SensorScript, SimulatedRangeSensor, SimulatedServo};
use bump_traits::clock::{Clock, MonotonicClock};
use crossbeam_channel as xch;

use crate::output::{EventTally, StdoutSink, print_event};

/// Per-poll readings for sensor A and sensor B.
pub type Scripts = (Vec<Option<f32>>, Vec<Option<f32>>);

const DEFAULT_VEHICLE_CM_S: f32 = 250.0;
/// Open-road polls before the first vehicle arrives.
const LEAD_POLLS: usize = 2;
const SLICE: Duration = Duration::from_millis(50);

/// Resample a trace onto the poll grid, holding the latest row at each poll.
/// Polls before the first row see open road.
pub fn trace_to_scripts(rows: &[TraceRow], poll_ms: u64) -> Scripts {
    let poll_ms = poll_ms.max(1);
    let Some(last) = rows.last() else {
        return (Vec::new(), Vec::new());
    };
    let polls = last.t_ms / poll_ms + 1;
    let mut a = Vec::new();
    let mut b = Vec::new();
    let mut idx = 0;
    let mut current: Option<&TraceRow> = None;
    for poll in 0..polls {
        let t = poll * poll_ms;
        while idx < rows.len() && rows[idx].t_ms <= t {
            current = Some(&rows[idx]);
            idx += 1;
        }
        match current {
            Some(row) => {
                a.push(row.sensor_a_cm);
                b.push(row.sensor_b_cm);
            }
            None => {
                a.push(Some(OPEN_ROAD_CM));
                b.push(Some(OPEN_ROAD_CM));
            }
        }
    }
    (a, b)
}

/// One vehicle per speed, each crossing A and then B `separation_cm` later,
/// separated by `gap_polls` of open road.
pub fn vehicle_scripts(speeds: &[f32], separation_cm: f32, poll_ms: u64, gap_polls: usize) -> Scripts {
    const NEAR_CM: f32 = 20.0;
    let poll_ms = poll_ms.max(1) as f32;
    let defaults = [DEFAULT_VEHICLE_CM_S];
    let speeds = if speeds.is_empty() { &defaults[..] } else { speeds };

    let mut a = vec![Some(OPEN_ROAD_CM); LEAD_POLLS];
    let mut b = a.clone();
    for &speed in speeds {
        let transit_ms = if speed > 0.0 {
            separation_cm / speed * 1000.0
        } else {
            f32::INFINITY
        };
        // At least one poll between the two edges; slow vehicles may never reach B
        let polls = (transit_ms / poll_ms).round().max(1.0);
        let polls = if polls.is_finite() { polls as usize } else { usize::MAX / 4 };
        let span = polls.saturating_add(1).min(gap_polls.max(1) * 4 + 1);

        for i in 0..span {
            a.push(Some(if i == 0 { NEAR_CM } else { OPEN_ROAD_CM }));
            b.push(Some(if i == polls { NEAR_CM } else { OPEN_ROAD_CM }));
        }
        a.extend(std::iter::repeat_n(Some(OPEN_ROAD_CM), gap_polls));
        b.extend(std::iter::repeat_n(Some(OPEN_ROAD_CM), gap_polls));
    }
    (a, b)
}

fn scripted_sensor(readings: Vec<Option<f32>>) -> SimulatedRangeSensor {
    let script = SensorScript::new();
    script.extend(readings);
    SimulatedRangeSensor::with_script(script)
}

pub fn run(
    cfg: &bump_config::Config,
    trace: Option<&Path>,
    vehicles: &[f32],
    duration_ms: u64,
    json: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    let settings = Settings::from(cfg);
    let poll_ms = settings.estimator.poll_ms;
    let (script_a, script_b) = match trace {
        Some(path) => {
            let rows = bump_config::load_trace_csv(path)
                .map_err(|e| BumpError::Config(e.to_string()))?;
            tracing::info!(rows = rows.len(), path = %path.display(), "trace loaded");
            trace_to_scripts(&rows, poll_ms)
        }
        None => {
            // Leave room for the deploy, the dwell and the debounce between vehicles
            let quiet_ms = settings.actuator.dwell_ms
                + settings.broadcast.transient_dwell_ms
                + settings.actuator.min_delay_ms;
            let gap_polls = usize::try_from(quiet_ms / poll_ms.max(1) + 1).unwrap_or(usize::MAX);
            vehicle_scripts(vehicles, settings.estimator.separation_cm, poll_ms, gap_polls)
        }
    };

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let air = LoopbackAir::new();

    let (ev_tx, ev_rx) = xch::unbounded();
    let (act_radio_tx, act_radio_rx) = xch::unbounded();
    let actuator = ActuatorNode::start(
        &settings,
        ActuatorParts {
            servo: SimulatedServo::new(),
            radio: LoopbackRadio::new(air.clone(), act_radio_tx),
            radio_events: act_radio_rx,
            clock: clock.clone(),
            events: Some(ev_tx),
        },
    )?;
    let sink = StdoutSink::new(json);
    let (sen_radio_tx, sen_radio_rx) = xch::unbounded();
    let sensor = SensorNode::start(
        &settings,
        SensorParts {
            sensor_a: scripted_sensor(script_a),
            sensor_b: scripted_sensor(script_b),
            radio: LoopbackRadio::new(air.clone(), sen_radio_tx),
            radio_events: sen_radio_rx,
            sink: sink.clone(),
            clock,
        },
    )?;

    let mut tally = EventTally::default();
    let deadline = Instant::now() + Duration::from_millis(duration_ms);
    while !shutdown.load(Ordering::SeqCst) {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        match ev_rx.recv_timeout(left.min(SLICE)) {
            Ok(ev) => {
                print_event(&ev, json);
                tally.record(&ev);
            }
            Err(xch::RecvTimeoutError::Timeout) => {}
            Err(xch::RecvTimeoutError::Disconnected) => break,
        }
    }

    let scanned = actuator
        .scanner()
        .stats()
        .matched
        .load(Ordering::Relaxed);
    drop(sensor);
    drop(actuator);
    tracing::info!(?tally, scanned, "simulation finished");

    if json {
        println!(
            "{}",
            serde_json::json!({
                "kind": "summary",
                "deployments": tally.deployments,
                "retractions": tally.retractions,
                "rejections": tally.rejections,
                "faults": tally.faults,
                "frames_matched": scanned,
                "telemetry": sink.published(),
            })
        );
    } else {
        println!(
            "simulation complete: deployments={} retractions={} telemetry={}",
            tally.deployments,
            tally.retractions,
            sink.published()
        );
    }
    Ok(())
}
