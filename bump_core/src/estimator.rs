//! Transit-speed estimation from two point sensors a fixed distance apart.
//!
//! `TransitEstimator` is pure: it is fed one pair of readings per poll along
//! with the current tick and reports what happened. Threads, clocks and the
//! shared window live in `monitor`.

use std::time::Duration;

use crate::config::EstimatorCfg;
use crate::util::transit_speed_cm_s;

/// One side of the measured segment. A is upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    #[inline]
    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// A single poll's reading: distance in cm, or `None` for a failed read.
pub type Reading = Option<f32>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Discard {
    /// B fired in the same tick the start was recorded.
    ZeroElapsed,
    /// The pending start outlived the transit window.
    Stale { age_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transit {
    pub speed_cm_s: f32,
    pub elapsed_ms: u64,
}

/// What one poll produced.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Observation {
    /// A completed A-to-B crossing.
    pub transit: Option<Transit>,
    /// A pending start was thrown away this poll.
    pub discarded: Option<Discard>,
    /// A new start was recorded on sensor A.
    pub armed: bool,
    /// Sensors whose consecutive fault count reached `fault_after`.
    pub down: [bool; 2],
}

impl Observation {
    pub fn is_down(&self, side: Side) -> bool {
        self.down[side.index()]
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SensorTrack {
    /// Last successful reading was inside the proximity threshold.
    near: bool,
    consecutive_faults: u32,
}

impl SensorTrack {
    /// Feed one reading; returns true on a clear-to-near edge.
    fn update(&mut self, reading: Reading, proximity_cm: f32) -> bool {
        match reading {
            Some(cm) => {
                self.consecutive_faults = 0;
                let near = cm < proximity_cm;
                let rising = near && !self.near;
                self.near = near;
                rising
            }
            // A fault says nothing about presence; keep the previous level.
            None => {
                self.consecutive_faults = self.consecutive_faults.saturating_add(1);
                false
            }
        }
    }
}

/// Detects A-then-B crossings and converts them to speeds.
///
/// Detections are edge-triggered: a vehicle lingering in front of a sensor
/// counts once, and sensor A only re-arms after it has seen the road clear.
#[derive(Debug, Clone)]
pub struct TransitEstimator {
    cfg: EstimatorCfg,
    pending_start_ms: Option<u64>,
    tracks: [SensorTrack; 2],
}

impl TransitEstimator {
    pub fn new(cfg: EstimatorCfg) -> Self {
        Self {
            cfg,
            pending_start_ms: None,
            tracks: [SensorTrack::default(); 2],
        }
    }

    pub fn config(&self) -> &EstimatorCfg {
        &self.cfg
    }

    pub fn pending_start_ms(&self) -> Option<u64> {
        self.pending_start_ms
    }

    /// Process one poll taken at `now_ms`.
    pub fn observe(&mut self, now_ms: u64, a: Reading, b: Reading) -> Observation {
        let mut obs = Observation::default();

        if let Some(start) = self.pending_start_ms {
            let age_ms = now_ms.saturating_sub(start);
            if age_ms > self.cfg.max_transit_ms {
                self.pending_start_ms = None;
                obs.discarded = Some(Discard::Stale { age_ms });
            }
        }

        let proximity = self.cfg.proximity_cm;
        if self.tracks[Side::A.index()].update(a, proximity) && self.pending_start_ms.is_none() {
            self.pending_start_ms = Some(now_ms);
            obs.armed = true;
        }

        if self.tracks[Side::B.index()].update(b, proximity)
            && let Some(start) = self.pending_start_ms.take()
        {
            let elapsed_ms = now_ms.saturating_sub(start);
            match transit_speed_cm_s(self.cfg.separation_cm, elapsed_ms, Duration::from_millis(1)) {
                Some(speed_cm_s) => obs.transit = Some(Transit { speed_cm_s, elapsed_ms }),
                None => obs.discarded = Some(Discard::ZeroElapsed),
            }
        }

        for side in [Side::A, Side::B] {
            obs.down[side.index()] =
                self.tracks[side.index()].consecutive_faults >= self.cfg.fault_after;
        }
        obs
    }
}

/// Aggregate of one telemetry interval. All speeds are zero for an empty window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    pub min_speed: f32,
    pub max_speed: f32,
    pub avg_speed: f32,
    pub count: usize,
    pub sensor_up: [bool; 2],
    /// Samples lost because the window was full.
    pub dropped: u32,
}

impl WindowSummary {
    #[inline]
    pub fn sensor_up(&self, side: Side) -> bool {
        self.sensor_up[side.index()]
    }

    /// At least one sensor went down during the interval.
    #[inline]
    pub fn degraded(&self) -> bool {
        !(self.sensor_up[0] && self.sensor_up[1])
    }
}

/// Bounded buffer of speed samples plus per-interval sensor health.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: Vec<f32>,
    capacity: usize,
    dropped: u32,
    sensor_up: [bool; 2],
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
            sensor_up: [true; 2],
        }
    }

    /// Append a sample. Returns false and counts a drop once the window is full.
    pub fn push(&mut self, speed_cm_s: f32) -> bool {
        if self.samples.len() >= self.capacity {
            self.dropped = self.dropped.saturating_add(1);
            return false;
        }
        self.samples.push(speed_cm_s);
        true
    }

    pub fn mark_down(&mut self, side: Side) {
        self.sensor_up[side.index()] = false;
    }

    /// Record everything an observation says about the window.
    pub fn apply(&mut self, obs: &Observation) {
        if let Some(t) = obs.transit {
            self.push(t.speed_cm_s);
        }
        for side in [Side::A, Side::B] {
            if obs.is_down(side) {
                self.mark_down(side);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Summarize the interval, then clear samples, drops and health flags.
    pub fn aggregate_and_reset(&mut self) -> WindowSummary {
        let summary = if self.samples.is_empty() {
            WindowSummary {
                min_speed: 0.0,
                max_speed: 0.0,
                avg_speed: 0.0,
                count: 0,
                sensor_up: self.sensor_up,
                dropped: self.dropped,
            }
        } else {
            let (mut min, mut max, mut sum) = (f32::INFINITY, f32::NEG_INFINITY, 0.0f64);
            for &s in &self.samples {
                min = min.min(s);
                max = max.max(s);
                sum += f64::from(s);
            }
            WindowSummary {
                min_speed: min,
                max_speed: max,
                avg_speed: (sum / self.samples.len() as f64) as f32,
                count: self.samples.len(),
                sensor_up: self.sensor_up,
                dropped: self.dropped,
            }
        };
        self.samples.clear();
        self.dropped = 0;
        self.sensor_up = [true; 2];
        summary
    }
}
