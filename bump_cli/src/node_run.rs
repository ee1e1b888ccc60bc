//! `sensor` and `actuator` subcommands: one node each, driven from stdin.
//!
//! No Bluetooth backend is available, so both roles broadcast on the
//! in-process loopback air. The sensor prints every frame it advertises; the
//! actuator accepts frames as hex lines on stdin.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bump_core::channel::RadioEventLoop;
use bump_core::config::Settings;
use bump_core::remote::RemoteMessage;
use bump_core::{ActuatorNode, ActuatorParts, BumpError, SensorNode, SensorParts};
use bump_hardware::{LoopbackAir, LoopbackRadio};
use bump_traits::clock::{Clock, MonotonicClock};
use bump_traits::{Radio, RadioEvent, RangeSensor, Servo};
use crossbeam_channel as xch;

use crate::codec_cmd::parse_hex;
use crate::output::{EventTally, StdoutSink, print_event};

const SLICE: Duration = Duration::from_millis(50);

/// Forward stdin lines to a channel; the channel closes at EOF.
fn stdin_lines() -> eyre::Result<xch::Receiver<String>> {
    let (tx, rx) = xch::unbounded();
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim().to_string();
                if !line.is_empty() && tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    fn new(duration_ms: Option<u64>) -> Self {
        Self {
            at: duration_ms.map(|ms| Instant::now() + Duration::from_millis(ms)),
        }
    }

    fn expired(&self, shutdown: &AtomicBool) -> bool {
        shutdown.load(Ordering::SeqCst) || self.at.is_some_and(|at| Instant::now() >= at)
    }
}

fn warn_loopback_only() {
    tracing::warn!("no Bluetooth backend in this build; advertisements stay on the in-process loopback");
}

pub fn run_sensor(
    cfg: &bump_config::Config,
    trace: Option<&Path>,
    duration_ms: Option<u64>,
    json: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    #[cfg(feature = "hardware")]
    if trace.is_none() {
        let hw = |e: bump_hardware::error::HwError| bump_core::hw_error::map_hw_error(&e);
        let p = &cfg.pins;
        let a = bump_hardware::HardwareRangeSensor::new(p.sensor_a_trigger, p.sensor_a_echo).map_err(hw)?;
        let b = bump_hardware::HardwareRangeSensor::new(p.sensor_b_trigger, p.sensor_b_echo).map_err(hw)?;
        return drive_sensor(cfg, a, b, duration_ms, json, shutdown);
    }

    let settings = Settings::from(cfg);
    let (script_a, script_b) = match trace {
        Some(path) => {
            let rows = bump_config::load_trace_csv(path).map_err(|e| BumpError::Config(e.to_string()))?;
            crate::simulate::trace_to_scripts(&rows, settings.estimator.poll_ms)
        }
        None => (Vec::new(), Vec::new()),
    };
    let a = bump_hardware::SimulatedRangeSensor::new();
    a.script().extend(script_a);
    let b = bump_hardware::SimulatedRangeSensor::new();
    b.script().extend(script_b);
    drive_sensor(cfg, a, b, duration_ms, json, shutdown)
}

fn drive_sensor<A, B>(
    cfg: &bump_config::Config,
    sensor_a: A,
    sensor_b: B,
    duration_ms: Option<u64>,
    json: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<()>
where
    A: RangeSensor + Send + 'static,
    B: RangeSensor + Send + 'static,
{
    warn_loopback_only();
    let settings = Settings::from(cfg);
    let air = LoopbackAir::new();

    // Echo what goes on the air
    let (listen_tx, listen_rx) = xch::unbounded();
    let mut listener = LoopbackRadio::new(air.clone(), listen_tx);
    listener.configure_scan().map_err(|e| BumpError::Radio(e.to_string()))?;
    listener.start_scanning().map_err(|e| BumpError::Radio(e.to_string()))?;
    let _echo = RadioEventLoop::spawn(listen_rx, move |ev| {
        if let RadioEvent::ScanResult { data } = ev {
            let hex: String = data.iter().map(|b| format!("{b:02x}")).collect();
            let command = data.last().and_then(|b| bump_core::CommandCode::try_from(*b).ok());
            let name = command.map_or("?", |c| c.as_str());
            if json {
                println!("{}", serde_json::json!({ "kind": "advertised", "command": name, "payload": hex }));
            } else {
                println!("advertised {name} {hex}");
            }
        }
    })?;

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let (radio_tx, radio_rx) = xch::unbounded();
    let sink = StdoutSink::new(json);
    let node = SensorNode::start(
        &settings,
        SensorParts {
            sensor_a,
            sensor_b,
            radio: LoopbackRadio::new(air, radio_tx),
            radio_events: radio_rx,
            sink: sink.clone(),
            clock,
        },
    )?;

    let mut lines = stdin_lines()?;
    let deadline = Deadline::new(duration_ms);
    while !deadline.expired(shutdown) {
        match lines.recv_timeout(SLICE) {
            Ok(line) => {
                let (topic, body) = line.split_once(char::is_whitespace).unwrap_or((line.as_str(), ""));
                match node.handle_remote(topic, body) {
                    Some(RemoteMessage::Command(command)) => println!("remote {command}"),
                    Some(RemoteMessage::FirmwareUpdate(artifact)) => {
                        println!("firmware update offered: {artifact}");
                    }
                    None => tracing::debug!(%topic, "remote message ignored"),
                }
            }
            Err(xch::RecvTimeoutError::Timeout) => {}
            Err(xch::RecvTimeoutError::Disconnected) => lines = xch::never(),
        }
    }
    drop(node);
    tracing::info!(reports = sink.published(), "sensor node stopped");
    Ok(())
}

pub fn run_actuator(
    cfg: &bump_config::Config,
    duration_ms: Option<u64>,
    json: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    #[cfg(feature = "hardware")]
    {
        let servo = bump_hardware::HardwareServo::new(cfg.pins.servo)
            .map_err(|e| bump_core::hw_error::map_hw_error(&e))?;
        drive_actuator(cfg, servo, duration_ms, json, shutdown)
    }
    #[cfg(not(feature = "hardware"))]
    {
        drive_actuator(cfg, bump_hardware::SimulatedServo::new(), duration_ms, json, shutdown)
    }
}

fn drive_actuator<V>(
    cfg: &bump_config::Config,
    servo: V,
    duration_ms: Option<u64>,
    json: bool,
    shutdown: &AtomicBool,
) -> eyre::Result<()>
where
    V: Servo + Send + 'static,
{
    warn_loopback_only();
    let settings = Settings::from(cfg);
    let air = LoopbackAir::new();
    let (ev_tx, ev_rx) = xch::unbounded();
    let (radio_tx, radio_rx) = xch::unbounded();
    let node = ActuatorNode::start(
        &settings,
        ActuatorParts {
            servo,
            radio: LoopbackRadio::new(air.clone(), radio_tx),
            radio_events: radio_rx,
            clock: Arc::new(MonotonicClock::new()),
            events: Some(ev_tx),
        },
    )?;

    let lines = stdin_lines()?;
    let mut tally = EventTally::default();
    let deadline = Deadline::new(duration_ms);
    while !deadline.expired(shutdown) {
        for line in lines.try_iter() {
            match parse_hex(&line) {
                Ok(frame) => air.inject(&frame),
                Err(e) => tracing::warn!(error = %e, "stdin line is not a frame"),
            }
        }
        match ev_rx.recv_timeout(SLICE) {
            Ok(ev) => {
                print_event(&ev, json);
                tally.record(&ev);
            }
            Err(xch::RecvTimeoutError::Timeout) => {}
            Err(xch::RecvTimeoutError::Disconnected) => break,
        }
    }

    let stats = node.scanner().stats();
    tracing::info!(
        matched = stats.matched.load(Ordering::Relaxed),
        ignored = stats.ignored.load(Ordering::Relaxed),
        dropped = stats.dropped.load(Ordering::Relaxed),
        ?tally,
        "actuator node stopped"
    );
    Ok(())
}
