//! Broadcast command channel over a short-range radio.
//!
//! A sensor node owns an [`Advertiser`] and continuously broadcasts the
//! current command; an actuator node owns a [`Scanner`] that filters received
//! payloads by prefix and forwards commands to the actuator's dispatch thread.
//! Radio completions arrive as [`RadioEvent`]s and are handled on a
//! [`RadioEventLoop`] thread, which never blocks on a sweep or a dwell.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bump_traits::{Clock, Radio, RadioEvent};
use crossbeam_channel as xch;

use crate::config::BroadcastCfg;
use crate::error::{BumpError, Result};
use crate::hw_error::map_radio_error;
use crate::payload::{AdvertisementPayload, CommandCode, Identity, PREFIX_LEN};
use crate::worker::Worker;

/// Radio role, fixed for the lifetime of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Advertiser,
    Scanner,
}

pub type SharedRadio = Arc<Mutex<Box<dyn Radio + Send>>>;

pub fn shared_radio(radio: impl Radio + Send + 'static) -> SharedRadio {
    Arc::new(Mutex::new(Box::new(radio)))
}

fn with_radio<T>(
    radio: &SharedRadio,
    what: &'static str,
    f: impl FnOnce(&mut dyn Radio) -> std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>,
) -> Result<T> {
    let mut guard = radio
        .lock()
        .map_err(|_| eyre::Report::new(BumpError::Radio("radio mutex poisoned".into())))?;
    f(guard.as_mut()).map_err(|e| {
        let mapped = map_radio_error(&*e);
        eyre::Report::new(mapped).wrap_err(what)
    })
}

/// Thread running a radio event handler until shutdown or until the radio
/// drops its event queue.
pub struct RadioEventLoop {
    _worker: Worker,
}

impl RadioEventLoop {
    pub fn spawn<F>(events: xch::Receiver<RadioEvent>, mut handler: F) -> std::io::Result<Self>
    where
        F: FnMut(RadioEvent) + Send + 'static,
    {
        let worker = Worker::spawn("radio-events", move |stop| {
            while !stop.load(Ordering::Relaxed) {
                match events.recv_timeout(crate::util::SHUTDOWN_SLICE) {
                    Ok(ev) => handler(ev),
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Err(xch::RecvTimeoutError::Disconnected) => {
                        tracing::debug!("radio event queue closed");
                        break;
                    }
                }
            }
        })?;
        Ok(Self { _worker: worker })
    }
}

/// Sending half of the channel. Clones share the radio and transient state.
#[derive(Clone)]
pub struct Advertiser {
    radio: SharedRadio,
    identity: Identity,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: BroadcastCfg,
    current: Arc<Mutex<Option<CommandCode>>>,
    /// Bumped by every transient so an older one never reverts a newer command.
    transient_seq: Arc<AtomicU64>,
}

impl Advertiser {
    pub fn new(
        radio: SharedRadio,
        identity: Identity,
        clock: Arc<dyn Clock + Send + Sync>,
        cfg: BroadcastCfg,
    ) -> Self {
        Self {
            radio,
            identity,
            clock,
            cfg,
            current: Arc::new(Mutex::new(None)),
            transient_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Command most recently handed to the radio.
    pub fn current(&self) -> Option<CommandCode> {
        self.current.lock().ok().and_then(|c| *c)
    }

    /// Replace the broadcast payload. Takes effect once the radio reports
    /// `AdvertisementConfigured` and [`Advertiser::handle_event`] restarts advertising.
    pub fn set_advertisement(&self, payload: &AdvertisementPayload) -> Result<()> {
        with_radio(&self.radio, "configure advertisement", |r| {
            r.configure_advertisement(payload.as_bytes())
        })?;
        let command = payload.command().ok();
        if let Ok(mut cur) = self.current.lock() {
            *cur = command;
        }
        tracing::debug!(payload = %payload.to_hex(), ?command, "advertisement updated");
        Ok(())
    }

    pub fn advertise(&self, command: CommandCode) -> Result<()> {
        self.set_advertisement(&self.identity.encode(command))
    }

    /// Broadcast `command` for `dwell`, then fall back to `Idle`.
    /// Blocks the calling thread for the dwell.
    pub fn advertise_transient(&self, command: CommandCode, dwell: Duration) -> Result<()> {
        let seq = self.transient_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.advertise(command)?;
        tracing::info!(%command, dwell_ms = dwell.as_millis() as u64, "transient advertisement");
        self.clock.sleep(dwell);
        if self.transient_seq.load(Ordering::SeqCst) != seq {
            tracing::debug!(%command, "newer transient in flight; leaving it in place");
            return Ok(());
        }
        self.advertise(CommandCode::Idle)
    }

    /// Run [`Advertiser::advertise_transient`] with the configured dwell on its own thread.
    pub fn request_transient(&self, command: CommandCode) -> std::io::Result<JoinHandle<()>> {
        let this = self.clone();
        let dwell = self.cfg.transient_dwell();
        std::thread::Builder::new()
            .name("transient-adv".into())
            .spawn(move || {
                if let Err(e) = this.advertise_transient(command, dwell) {
                    tracing::warn!(%command, error = %e, "transient advertisement failed");
                }
            })
    }

    /// React to a radio completion on the advertiser side.
    pub fn handle_event(&self, event: &RadioEvent) {
        match event {
            RadioEvent::AdvertisementConfigured => {
                if let Err(e) = with_radio(&self.radio, "start advertising", |r| r.start_advertising()) {
                    tracing::error!(error = %e, "advertising not restarted");
                }
            }
            RadioEvent::AdvertisingStarted { ok: false } => {
                tracing::error!("radio failed to start advertising");
            }
            RadioEvent::AdvertisingStarted { ok: true } => {
                tracing::trace!("advertising");
            }
            other => tracing::trace!(?other, "event ignored by advertiser"),
        }
    }

    /// Start the event loop that keeps advertising alive after payload changes.
    pub fn run_events(&self, events: xch::Receiver<RadioEvent>) -> std::io::Result<RadioEventLoop> {
        let this = self.clone();
        RadioEventLoop::spawn(events, move |ev| this.handle_event(&ev))
    }
}

/// Counters kept by a [`Scanner`].
#[derive(Debug, Default)]
pub struct ScanStats {
    pub matched: AtomicU64,
    pub ignored: AtomicU64,
    pub dropped: AtomicU64,
}

/// Receiving half of the channel.
#[derive(Clone)]
pub struct Scanner {
    radio: SharedRadio,
    prefix: [u8; PREFIX_LEN],
    dispatch: xch::Sender<CommandCode>,
    stats: Arc<ScanStats>,
}

impl Scanner {
    /// Matched commands are sent on `dispatch` without blocking; a full
    /// queue drops the command.
    pub fn new(radio: SharedRadio, prefix: [u8; PREFIX_LEN], dispatch: xch::Sender<CommandCode>) -> Self {
        Self {
            radio,
            prefix,
            dispatch,
            stats: Arc::new(ScanStats::default()),
        }
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Filter one received payload. Returns the command forwarded, if any.
    pub fn match_payload(&self, data: &[u8]) -> Option<CommandCode> {
        match crate::payload::decode(data, &self.prefix) {
            Ok(cmd) => {
                self.stats.matched.fetch_add(1, Ordering::Relaxed);
                match self.dispatch.try_send(cmd) {
                    Ok(()) => Some(cmd),
                    Err(e) => {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(command = %cmd, error = %e, "command queue unavailable; dropped");
                        None
                    }
                }
            }
            Err(e) => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(len = data.len(), reason = %e, "advertisement ignored");
                None
            }
        }
    }

    /// React to a radio completion or scan result on the scanner side.
    pub fn handle_event(&self, event: &RadioEvent) {
        match event {
            RadioEvent::ScanResult { data } => {
                self.match_payload(data);
            }
            RadioEvent::ScanConfigured => {
                if let Err(e) = with_radio(&self.radio, "start scanning", |r| r.start_scanning()) {
                    tracing::error!(error = %e, "scanning not started");
                }
            }
            RadioEvent::ScanStarted { ok: false } => tracing::error!("radio failed to start scanning"),
            RadioEvent::ScanStarted { ok: true } => tracing::debug!("scanning"),
            other => tracing::trace!(?other, "event ignored by scanner"),
        }
    }

    /// Configure the radio for scanning and run the match loop on a
    /// dedicated thread until the returned loop is dropped.
    pub fn scan_and_match(&self, events: xch::Receiver<RadioEvent>) -> Result<RadioEventLoop> {
        let this = self.clone();
        let event_loop = RadioEventLoop::spawn(events, move |ev| this.handle_event(&ev))?;
        with_radio(&self.radio, "configure scan", |r| r.configure_scan())?;
        Ok(event_loop)
    }
}
