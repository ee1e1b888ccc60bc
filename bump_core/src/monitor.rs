//! Sensor polling and periodic aggregation threads.
//!
//! The poll thread owns both sensors and appends speeds to a shared
//! [`SampleWindow`]; the aggregation thread summarizes, publishes and clears
//! it on a fixed interval. Both stop when the [`SpeedMonitor`] is dropped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bump_traits::{Clock, RangeSensor, TelemetrySink};

use crate::config::{EstimatorCfg, TelemetryCfg};
use crate::error::{BumpError, Result};
use crate::estimator::{Observation, Reading, SampleWindow, Side, TransitEstimator};
use crate::hw_error::map_hw_error;
use crate::telemetry::TelemetryReport;
use crate::util::sleep_unless_shutdown;
use crate::worker::Worker;

pub type SharedWindow = Arc<Mutex<SampleWindow>>;

pub fn shared_window(capacity: usize) -> SharedWindow {
    Arc::new(Mutex::new(SampleWindow::new(capacity)))
}

/// One poll cycle's worth of work: read both sensors, estimate, record.
pub struct TransitPoller {
    sensor_a: Box<dyn RangeSensor + Send>,
    sensor_b: Box<dyn RangeSensor + Send>,
    estimator: TransitEstimator,
    window: SharedWindow,
    on_speeding: Box<dyn FnMut(f32) + Send>,
}

impl TransitPoller {
    pub fn new(
        sensor_a: impl RangeSensor + Send + 'static,
        sensor_b: impl RangeSensor + Send + 'static,
        cfg: EstimatorCfg,
        window: SharedWindow,
    ) -> Self {
        Self {
            sensor_a: Box::new(sensor_a),
            sensor_b: Box::new(sensor_b),
            estimator: TransitEstimator::new(cfg),
            window,
            on_speeding: Box::new(|_| {}),
        }
    }

    /// Called from the poll thread with every speed above the deploy
    /// threshold. Must not block.
    pub fn on_speeding(mut self, f: impl FnMut(f32) + Send + 'static) -> Self {
        self.on_speeding = Box::new(f);
        self
    }

    fn read(sensor: &mut dyn RangeSensor, side: Side, max_cm: f32) -> Reading {
        match sensor.measure_cm(max_cm) {
            Ok(cm) => Some(cm),
            Err(e) => match map_hw_error(&*e) {
                // Nothing within range is an empty road, not a fault.
                BumpError::NoObject => Some(f32::INFINITY),
                other => {
                    tracing::debug!(?side, error = %other, "range read failed");
                    None
                }
            },
        }
    }

    /// Read both sensors once and fold the result into the window.
    pub fn poll(&mut self, now_ms: u64) -> Observation {
        let cfg = self.estimator.config();
        let (max_cm, threshold) = (cfg.proximity_cm, cfg.deploy_threshold_cm_s);
        let a = Self::read(self.sensor_a.as_mut(), Side::A, max_cm);
        let b = Self::read(self.sensor_b.as_mut(), Side::B, max_cm);
        let obs = self.estimator.observe(now_ms, a, b);

        match self.window.lock() {
            Ok(mut w) => w.apply(&obs),
            Err(_) => tracing::warn!("sample window poisoned; observation lost"),
        }
        if let Some(d) = obs.discarded {
            tracing::debug!(?d, now_ms, "transit discarded");
        }
        if let Some(t) = obs.transit {
            if t.speed_cm_s > threshold {
                tracing::info!(speed_cm_s = t.speed_cm_s, elapsed_ms = t.elapsed_ms, "too fast");
                (self.on_speeding)(t.speed_cm_s);
            } else {
                tracing::debug!(speed_cm_s = t.speed_cm_s, elapsed_ms = t.elapsed_ms, "vehicle passed");
            }
        }
        obs
    }
}

/// Summarizes and publishes the shared window.
pub struct Aggregator {
    window: SharedWindow,
    sink: Box<dyn TelemetrySink + Send>,
    cfg: TelemetryCfg,
}

impl Aggregator {
    pub fn new(window: SharedWindow, sink: impl TelemetrySink + Send + 'static, cfg: TelemetryCfg) -> Self {
        Self {
            window,
            sink: Box::new(sink),
            cfg,
        }
    }

    /// Summarize the interval, clear the window and publish one report.
    /// The window is cleared even if publishing fails.
    pub fn aggregate_and_reset(&mut self) -> Result<TelemetryReport> {
        let summary = self
            .window
            .lock()
            .map_err(|_| eyre::Report::new(BumpError::State("sample window poisoned".into())))?
            .aggregate_and_reset();
        let report = TelemetryReport::from_summary(&self.cfg, &summary);
        let json = report.to_json()?;
        self.sink
            .publish(&self.cfg.topics.data, &json)
            .map_err(|e| eyre::Report::new(BumpError::Telemetry(e.to_string())))?;
        tracing::debug!(count = summary.count, degraded = summary.degraded(), "telemetry published");
        Ok(report)
    }
}

pub struct SpeedMonitor {
    window: SharedWindow,
    _poll: Worker,
    _aggregate: Worker,
}

impl SpeedMonitor {
    /// Start polling every `poll_ms` and aggregating every `interval_ms`.
    pub fn spawn(
        mut poller: TransitPoller,
        mut aggregator: Aggregator,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> std::io::Result<Self> {
        let window = poller.window.clone();
        let period = poller.estimator.config().poll_period();
        let interval = Duration::from_millis(aggregator.cfg.interval_ms);

        let poll_clock = clock.clone();
        let poll = Worker::spawn("speed-poll", move |stop| {
            let epoch = poll_clock.now();
            loop {
                poller.poll(poll_clock.ms_since(epoch));
                if !sleep_unless_shutdown(poll_clock.as_ref(), period, stop) {
                    break;
                }
            }
        })?;

        let aggregate = Worker::spawn("speed-aggregate", move |stop| {
            while sleep_unless_shutdown(clock.as_ref(), interval, stop) {
                if let Err(e) = aggregator.aggregate_and_reset() {
                    tracing::warn!(error = %e, "telemetry interval lost");
                }
            }
        })?;

        Ok(Self {
            window,
            _poll: poll,
            _aggregate: aggregate,
        })
    }

    pub fn window(&self) -> SharedWindow {
        self.window.clone()
    }
}
