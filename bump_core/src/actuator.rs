//! Speed-bump actuator state machine.
//!
//! Phases run `Idle -> Deploying -> Deployed -> Retracting -> Idle`. Guards are
//! evaluated and the busy phase entered under one mutex; the servo sweep runs
//! outside it, so concurrent requests during a sweep are rejected as `Busy`
//! instead of queueing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bump_traits::clock::{Clock, MonotonicClock};
use bump_traits::Servo;
use crossbeam_channel as xch;
use eyre::WrapErr;

use crate::config::ActuatorCfg;
use crate::error::{BuildError, BumpError, Result};
use crate::hw_error::map_hw_error;
use crate::payload::CommandCode;
use crate::trajectory::{Direction, PulseMap};
use crate::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Deploying,
    Deployed,
    Retracting,
}

impl Phase {
    /// The bump counts as deployed from the end of a raise until the end of a lower.
    #[inline]
    pub fn is_deployed(self) -> bool {
        matches!(self, Self::Deployed | Self::Retracting)
    }

    #[inline]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Deploying | Self::Retracting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    AlreadyDeployed,
    AlreadyRetracted,
    Busy,
    /// Last transition was too recent.
    TooSoon { elapsed_ms: u64 },
    /// Auto-retract timer from an earlier deployment.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Completed(Phase),
    Rejected(Reject),
}

impl Transition {
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetractCause {
    /// Retract command received.
    Signal,
    /// Auto-retract dwell expired.
    Timeout,
    /// Boot-time parking pass.
    Park,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorEvent {
    Deployed {
        at_ms: u64,
        generation: u64,
    },
    Retracted {
        at_ms: u64,
        cause: RetractCause,
    },
    Rejected {
        at_ms: u64,
        command: CommandCode,
        reason: Reject,
    },
    Faulted {
        at_ms: u64,
        message: String,
    },
}

#[derive(Debug)]
struct State {
    phase: Phase,
    last_transition_ms: Option<u64>,
    /// Incremented on every completed deploy.
    generation: u64,
    sweeps: u64,
}

impl State {
    fn too_soon(&self, now_ms: u64, min_delay_ms: u64) -> Option<Reject> {
        let last = self.last_transition_ms?;
        let elapsed_ms = now_ms.saturating_sub(last);
        (elapsed_ms <= min_delay_ms).then_some(Reject::TooSoon { elapsed_ms })
    }

    fn deploy_guard(&self, now_ms: u64, min_delay_ms: u64) -> Option<Reject> {
        if self.phase.is_busy() {
            Some(Reject::Busy)
        } else if self.phase.is_deployed() {
            Some(Reject::AlreadyDeployed)
        } else {
            self.too_soon(now_ms, min_delay_ms)
        }
    }

    fn retract_guard(&self, now_ms: u64, min_delay_ms: u64) -> Option<Reject> {
        if self.phase.is_busy() {
            Some(Reject::Busy)
        } else if !self.phase.is_deployed() {
            Some(Reject::AlreadyRetracted)
        } else {
            self.too_soon(now_ms, min_delay_ms)
        }
    }
}

struct Inner {
    state: Mutex<State>,
    servo: Mutex<Box<dyn Servo + Send>>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    cfg: ActuatorCfg,
    pulses: PulseMap,
    events: Option<xch::Sender<ActuatorEvent>>,
    timers_pending: AtomicUsize,
}

/// Cheaply cloneable handle; clones drive the same servo and state.
#[derive(Clone)]
pub struct Actuator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Actuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actuator")
            .field("phase", &self.phase())
            .field("cfg", &self.inner.cfg)
            .finish()
    }
}

#[derive(Default)]
pub struct ActuatorBuilder {
    servo: Option<Box<dyn Servo + Send>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    cfg: ActuatorCfg,
    events: Option<xch::Sender<ActuatorEvent>>,
}

impl ActuatorBuilder {
    pub fn with_servo(mut self, servo: impl Servo + Send + 'static) -> Self {
        self.servo = Some(Box::new(servo));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_config(mut self, cfg: ActuatorCfg) -> Self {
        self.cfg = cfg;
        self
    }

    /// Publish every transition and rejection on `tx`.
    pub fn with_events(mut self, tx: xch::Sender<ActuatorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn build(self) -> std::result::Result<Actuator, BuildError> {
        let servo = self.servo.ok_or(BuildError::MissingServo)?;
        if self.cfg.min_pulse_us >= self.cfg.max_pulse_us {
            return Err(BuildError::InvalidConfig(
                "min_pulse_us must be below max_pulse_us",
            ));
        }
        if self.cfg.max_angle_deg == 0 {
            return Err(BuildError::InvalidConfig("max_angle_deg must be >= 1"));
        }
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let epoch = clock.now();
        Ok(Actuator {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    last_transition_ms: None,
                    generation: 0,
                    sweeps: 0,
                }),
                servo: Mutex::new(servo),
                clock,
                epoch,
                pulses: PulseMap::from_cfg(&self.cfg),
                cfg: self.cfg,
                events: self.events,
                timers_pending: AtomicUsize::new(0),
            }),
        })
    }
}

impl Actuator {
    pub fn builder() -> ActuatorBuilder {
        ActuatorBuilder::default()
    }

    /// Milliseconds since this actuator was built.
    pub fn now_ms(&self) -> u64 {
        self.inner.clock.ms_since(self.inner.epoch)
    }

    pub fn phase(&self) -> Phase {
        self.inner
            .state
            .lock()
            .map(|st| st.phase)
            .unwrap_or(Phase::Idle)
    }

    pub fn is_deployed(&self) -> bool {
        self.phase().is_deployed()
    }

    pub fn last_transition_ms(&self) -> Option<u64> {
        self.inner
            .state
            .lock()
            .ok()
            .and_then(|st| st.last_transition_ms)
    }

    /// Completed sweeps, parking pass excluded.
    pub fn sweeps(&self) -> u64 {
        self.inner.state.lock().map(|st| st.sweeps).unwrap_or(0)
    }

    /// Auto-retract timers spawned and not yet finished.
    pub fn pending_timers(&self) -> usize {
        self.inner.timers_pending.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ActuatorCfg {
        &self.inner.cfg
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, State>> {
        self.inner
            .state
            .lock()
            .map_err(|_| eyre::Report::new(BumpError::State("actuator state poisoned".into())))
    }

    fn emit(&self, ev: ActuatorEvent) {
        if let Some(tx) = &self.inner.events {
            // Receiver gone means nobody is listening; that is fine.
            let _ = tx.send(ev);
        }
    }

    fn reject(&self, at_ms: u64, command: CommandCode, reason: Reject) -> Transition {
        tracing::debug!(%command, ?reason, at_ms, "actuator request ignored");
        self.emit(ActuatorEvent::Rejected {
            at_ms,
            command,
            reason,
        });
        Transition::Rejected(reason)
    }

    fn sweep(&self, direction: Direction) -> Result<()> {
        let mut servo = self
            .inner
            .servo
            .lock()
            .map_err(|_| eyre::Report::new(BumpError::State("servo mutex poisoned".into())))?;
        let settle = Duration::from_millis(self.inner.cfg.settle_ms);
        for angle in self.inner.pulses.sweep(direction) {
            let pulse_us = self.inner.pulses.angle_to_pulse_us(angle);
            servo.set_pulse_width_us(pulse_us).map_err(|e| {
                let cause = map_hw_error(&*e);
                eyre::Report::new(BumpError::Hardware(format!(
                    "servo rejected {pulse_us} us at {angle} deg: {cause}"
                )))
            })?;
            self.inner.clock.sleep(settle);
        }
        Ok(())
    }

    /// Abort bookkeeping after a failed sweep: back to `resting`, stamp, report.
    fn abort_sweep(&self, resting: Phase, err: &eyre::Report) -> Result<()> {
        let at_ms = self.now_ms();
        {
            let mut st = self.lock_state()?;
            st.phase = resting;
            st.last_transition_ms = Some(at_ms);
        }
        tracing::warn!(error = %err, ?resting, "servo sweep aborted");
        self.emit(ActuatorEvent::Faulted {
            at_ms,
            message: format!("{err:#}"),
        });
        Ok(())
    }

    /// Raise the bump.
    ///
    /// Accepted only when retracted, not mid-sweep, and more than
    /// `min_delay_ms` after the last transition. Rejections still stamp the
    /// transition time. On completion an auto-retract timer is started.
    pub fn activate(&self) -> Result<Transition> {
        let now = self.now_ms();
        {
            let mut st = self.lock_state()?;
            if let Some(reason) = st.deploy_guard(now, self.inner.cfg.min_delay_ms) {
                st.last_transition_ms = Some(now);
                drop(st);
                return Ok(self.reject(now, CommandCode::Deploy, reason));
            }
            st.phase = Phase::Deploying;
        }

        tracing::info!(at_ms = now, "deploying speed bump");
        if let Err(e) = self.sweep(Direction::Raise) {
            self.abort_sweep(Phase::Idle, &e)?;
            return Err(e).wrap_err("deploy sweep");
        }

        let (at_ms, generation) = {
            let mut st = self.lock_state()?;
            let at_ms = self.now_ms();
            st.phase = Phase::Deployed;
            st.last_transition_ms = Some(at_ms);
            st.generation += 1;
            st.sweeps += 1;
            (at_ms, st.generation)
        };
        tracing::info!(at_ms, generation, "speed bump deployed");
        self.emit(ActuatorEvent::Deployed { at_ms, generation });
        self.schedule_auto_retract(generation);
        Ok(Transition::Completed(Phase::Deployed))
    }

    /// Lower the bump.
    ///
    /// `by_external_signal` marks a received command; only then does a
    /// rejected call stamp the transition time.
    pub fn deactivate(&self, by_external_signal: bool) -> Result<Transition> {
        let cause = if by_external_signal {
            RetractCause::Signal
        } else {
            RetractCause::Timeout
        };
        self.retract(cause, None)
    }

    fn retract(&self, cause: RetractCause, generation: Option<u64>) -> Result<Transition> {
        let now = self.now_ms();
        {
            let mut st = self.lock_state()?;
            if let Some(g) = generation
                && g != st.generation
            {
                drop(st);
                return Ok(self.reject(now, CommandCode::Retract, Reject::Superseded));
            }
            if let Some(reason) = st.retract_guard(now, self.inner.cfg.min_delay_ms) {
                if cause == RetractCause::Signal {
                    st.last_transition_ms = Some(now);
                }
                drop(st);
                return Ok(self.reject(now, CommandCode::Retract, reason));
            }
            st.phase = Phase::Retracting;
        }

        tracing::info!(at_ms = now, ?cause, "retracting speed bump");
        if let Err(e) = self.sweep(Direction::Lower) {
            self.abort_sweep(Phase::Deployed, &e)?;
            return Err(e).wrap_err("retract sweep");
        }

        let at_ms = {
            let mut st = self.lock_state()?;
            let at_ms = self.now_ms();
            st.phase = Phase::Idle;
            st.last_transition_ms = Some(at_ms);
            st.sweeps += 1;
            at_ms
        };
        tracing::info!(at_ms, ?cause, "speed bump retracted");
        self.emit(ActuatorEvent::Retracted { at_ms, cause });
        Ok(Transition::Completed(Phase::Idle))
    }

    /// Drive the servo down to 0 degrees regardless of where it is, leaving
    /// the machine `Idle`. Used once at boot; does not stamp the transition time.
    pub fn park(&self) -> Result<()> {
        {
            let mut st = self.lock_state()?;
            if st.phase != Phase::Idle {
                return Err(BumpError::State(format!("cannot park while {:?}", st.phase)).into());
            }
            st.phase = Phase::Retracting;
        }
        let swept = self.sweep(Direction::Lower);
        self.lock_state()?.phase = Phase::Idle;
        swept.wrap_err("parking sweep")?;
        let at_ms = self.now_ms();
        tracing::debug!(at_ms, "servo parked");
        self.emit(ActuatorEvent::Retracted {
            at_ms,
            cause: RetractCause::Park,
        });
        Ok(())
    }

    /// Apply a received command. `Idle` is a no-op.
    pub fn dispatch(&self, command: CommandCode) -> Result<Option<Transition>> {
        match command {
            CommandCode::Deploy => self.activate().map(Some),
            CommandCode::Retract => self.deactivate(true).map(Some),
            CommandCode::Idle => Ok(None),
        }
    }

    /// One auto-retract attempt. Returns how long to wait before retrying,
    /// or `None` once the timer is done.
    fn fire_auto_retract(&self, generation: u64) -> Option<u64> {
        let min_delay_ms = self.inner.cfg.min_delay_ms;
        match self.retract(RetractCause::Timeout, Some(generation)) {
            Ok(Transition::Rejected(Reject::TooSoon { elapsed_ms })) => {
                Some(min_delay_ms.saturating_sub(elapsed_ms) + 1)
            }
            Ok(Transition::Rejected(Reject::Busy)) => Some(min_delay_ms + 1),
            Ok(t) => {
                tracing::debug!(generation, ?t, "auto-retract fired");
                None
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "auto-retract failed");
                None
            }
        }
    }

    fn schedule_auto_retract(&self, generation: u64) {
        let this = self.clone();
        let dwell = Duration::from_millis(self.inner.cfg.dwell_ms);
        self.inner.timers_pending.fetch_add(1, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name("auto-retract".into())
            .spawn(move || {
                this.inner.clock.sleep(dwell);
                // A debounce or an in-flight sweep only defers the timer
                while let Some(wait_ms) = this.fire_auto_retract(generation) {
                    tracing::debug!(generation, wait_ms, "auto-retract deferred");
                    this.inner.clock.sleep(Duration::from_millis(wait_ms));
                }
                this.inner.timers_pending.fetch_sub(1, Ordering::SeqCst);
            });
        if let Err(e) = spawned {
            self.inner.timers_pending.fetch_sub(1, Ordering::SeqCst);
            tracing::error!(error = %e, "could not start auto-retract timer");
        }
    }

    /// Consume commands from `commands` on a dedicated thread until the
    /// sender side is dropped or the returned worker is.
    pub fn spawn_dispatcher(
        &self,
        commands: xch::Receiver<CommandCode>,
    ) -> std::io::Result<Worker> {
        let actuator = self.clone();
        Worker::spawn("bump-dispatch", move |stop| {
            while !stop.load(Ordering::Relaxed) {
                match commands.recv_timeout(crate::util::SHUTDOWN_SLICE) {
                    Ok(cmd) => {
                        if let Err(e) = actuator.dispatch(cmd) {
                            tracing::warn!(command = %cmd, error = %e, "command failed");
                        }
                    }
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Err(xch::RecvTimeoutError::Disconnected) => break,
                }
            }
        })
    }
}
