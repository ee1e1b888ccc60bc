//! Per-role node contexts.
//!
//! Each node owns everything it runs; nothing is global. Construction order
//! is radio stack, command channel, actuator, estimator.

use std::sync::Arc;

use bump_traits::{Clock, Radio, RadioEvent, RangeSensor, Servo, TelemetrySink};
use crossbeam_channel as xch;

use crate::actuator::{Actuator, ActuatorEvent};
use crate::channel::{Advertiser, RadioEventLoop, Role, Scanner, shared_radio};
use crate::config::{Settings, Topics};
use crate::error::Result;
use crate::monitor::{Aggregator, SharedWindow, SpeedMonitor, TransitPoller, shared_window};
use crate::payload::{CommandCode, Identity};
use crate::remote::RemoteMessage;
use crate::worker::Worker;

/// Depth of the scanner-to-actuator command queue.
pub const COMMAND_QUEUE_DEPTH: usize = 16;

/// Devices and collaborators a sensor node is built from.
pub struct SensorParts<A, B, R, S> {
    pub sensor_a: A,
    pub sensor_b: B,
    pub radio: R,
    /// Event queue the radio reports on.
    pub radio_events: xch::Receiver<RadioEvent>,
    pub sink: S,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

/// Measures traffic, publishes telemetry and advertises commands.
pub struct SensorNode {
    monitor: SpeedMonitor,
    _radio_loop: RadioEventLoop,
    advertiser: Advertiser,
    topics: Topics,
}

impl SensorNode {
    pub const ROLE: Role = Role::Advertiser;

    pub fn start<A, B, R, S>(settings: &Settings, parts: SensorParts<A, B, R, S>) -> Result<Self>
    where
        A: RangeSensor + Send + 'static,
        B: RangeSensor + Send + 'static,
        R: Radio + Send + 'static,
        S: TelemetrySink + Send + 'static,
    {
        let identity = Identity::from_name(&settings.identity_name)?;

        let advertiser = Advertiser::new(
            shared_radio(parts.radio),
            identity,
            parts.clock.clone(),
            settings.broadcast,
        );
        let radio_loop = advertiser.run_events(parts.radio_events)?;
        advertiser.advertise(CommandCode::Idle)?;

        let window = shared_window(settings.estimator.capacity);
        let trigger = advertiser.clone();
        let poller = TransitPoller::new(
            parts.sensor_a,
            parts.sensor_b,
            settings.estimator.clone(),
            window.clone(),
        )
        .on_speeding(move |_speed| {
            if let Err(e) = trigger.request_transient(CommandCode::Deploy) {
                tracing::warn!(error = %e, "deploy request not sent");
            }
        });
        let aggregator = Aggregator::new(window, parts.sink, settings.telemetry.clone());
        let monitor = SpeedMonitor::spawn(poller, aggregator, parts.clock)?;

        tracing::info!(name = identity.name(), "sensor node started");
        Ok(Self {
            monitor,
            _radio_loop: radio_loop,
            advertiser,
            topics: settings.telemetry.topics.clone(),
        })
    }

    pub fn advertiser(&self) -> &Advertiser {
        &self.advertiser
    }

    pub fn window(&self) -> SharedWindow {
        self.monitor.window()
    }

    /// Handle one message from the connectivity collaborator. Commands are
    /// broadcast as transients; firmware updates are returned to the caller.
    pub fn handle_remote(&self, topic: &str, body: &str) -> Option<RemoteMessage> {
        let msg = RemoteMessage::parse(&self.topics, topic, body)?;
        match &msg {
            RemoteMessage::Command(command) => {
                tracing::info!(%command, "remote command");
                if let Err(e) = self.advertiser.request_transient(*command) {
                    tracing::warn!(%command, error = %e, "remote command not broadcast");
                }
            }
            RemoteMessage::FirmwareUpdate(artifact) => {
                tracing::info!(%artifact, "firmware update offered");
            }
        }
        Some(msg)
    }
}

/// Devices and collaborators an actuator node is built from.
pub struct ActuatorParts<V, R> {
    pub servo: V,
    pub radio: R,
    pub radio_events: xch::Receiver<RadioEvent>,
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub events: Option<xch::Sender<ActuatorEvent>>,
}

/// Scans for commands and drives the bump.
pub struct ActuatorNode {
    _scan_loop: RadioEventLoop,
    _dispatcher: Worker,
    actuator: Actuator,
    scanner: Scanner,
}

impl ActuatorNode {
    pub const ROLE: Role = Role::Scanner;

    pub fn start<V, R>(settings: &Settings, parts: ActuatorParts<V, R>) -> Result<Self>
    where
        V: Servo + Send + 'static,
        R: Radio + Send + 'static,
    {
        let identity = Identity::from_name(&settings.identity_name)?;

        let radio = shared_radio(parts.radio);
        let (cmd_tx, cmd_rx) = xch::bounded(COMMAND_QUEUE_DEPTH);
        let scanner = Scanner::new(radio, *identity.prefix(), cmd_tx);
        let scan_loop = scanner.scan_and_match(parts.radio_events)?;

        let mut builder = Actuator::builder()
            .with_servo(parts.servo)
            .with_clock(parts.clock)
            .with_config(settings.actuator);
        if let Some(tx) = parts.events {
            builder = builder.with_events(tx);
        }
        let actuator = builder.build()?;
        actuator.park()?;
        let dispatcher = actuator.spawn_dispatcher(cmd_rx)?;

        tracing::info!(name = identity.name(), "actuator node started");
        Ok(Self {
            _scan_loop: scan_loop,
            _dispatcher: dispatcher,
            actuator,
            scanner,
        })
    }

    pub fn actuator(&self) -> &Actuator {
        &self.actuator
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }
}
