pub mod error;
#[cfg(feature = "hardware")]
pub mod hcsr04;
#[cfg(feature = "hardware")]
pub mod servo;
pub mod util;

use bump_traits::{RadioEvent, RangeSensor, Servo};
use crossbeam_channel as xch;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::HwError;

/// Distance reported by a simulated sensor when nothing is in front of it.
pub const OPEN_ROAD_CM: f32 = 400.0;

/// Shared script of readings for a [`SimulatedRangeSensor`].
///
/// `Some(cm)` is a successful echo, `None` a failed read. Clones share the
/// same queue, so a test can keep a handle and feed readings while the sensor
/// itself has moved into a polling thread.
#[derive(Debug, Clone, Default)]
pub struct SensorScript {
    queue: Arc<Mutex<VecDeque<Option<f32>>>>,
}

impl SensorScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reading: Option<f32>) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(reading);
        }
    }

    pub fn extend(&self, readings: impl IntoIterator<Item = Option<f32>>) {
        if let Ok(mut q) = self.queue.lock() {
            q.extend(readings);
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn pop(&self) -> Option<Option<f32>> {
        self.queue.lock().ok().and_then(|mut q| q.pop_front())
    }
}

/// Simulated range sensor replaying a script; reports open road once the script runs dry.
pub struct SimulatedRangeSensor {
    script: SensorScript,
}

impl SimulatedRangeSensor {
    pub fn new() -> Self {
        Self {
            script: SensorScript::new(),
        }
    }

    pub fn with_script(script: SensorScript) -> Self {
        Self { script }
    }

    pub fn script(&self) -> SensorScript {
        self.script.clone()
    }
}

impl Default for SimulatedRangeSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeSensor for SimulatedRangeSensor {
    fn measure_cm(
        &mut self,
        max_cm: f32,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        match self.script.pop() {
            Some(Some(cm)) if cm <= max_cm => Ok(cm),
            Some(Some(_)) => Err(Box::new(HwError::OutOfRange { max_cm })),
            Some(None) => Err(Box::new(HwError::NoReading)),
            None => Ok(OPEN_ROAD_CM.min(max_cm)),
        }
    }
}

/// Simulated servo that records every commanded pulse width.
#[derive(Debug, Clone, Default)]
pub struct SimulatedServo {
    pulses: Arc<Mutex<Vec<u32>>>,
}

impl SimulatedServo {
    pub fn new() -> Self {
        Self::default()
    }

    /// All pulse widths commanded so far, in order.
    pub fn pulses(&self) -> Vec<u32> {
        self.pulses.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn last_pulse(&self) -> Option<u32> {
        self.pulses.lock().ok().and_then(|p| p.last().copied())
    }
}

impl Servo for SimulatedServo {
    fn set_pulse_width_us(
        &mut self,
        pulse_us: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !(500..=2500).contains(&pulse_us) {
            return Err(Box::new(HwError::PulseOutOfRange(pulse_us)));
        }
        if let Ok(mut p) = self.pulses.lock() {
            p.push(pulse_us);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AirState {
    scanners: Vec<xch::Sender<RadioEvent>>,
    /// Payload each advertising radio currently broadcasts, keyed by radio id.
    advertising: Vec<(u64, Vec<u8>)>,
    next_id: u64,
}

/// In-process radio medium connecting [`LoopbackRadio`]s.
///
/// Every advertisement started on any radio is delivered once to every radio
/// currently scanning, and a scanner that joins later first hears every
/// advertisement still on the air. Delivery is best effort: a scanner whose
/// queue is gone is forgotten.
#[derive(Debug, Clone, Default)]
pub struct LoopbackAir {
    state: Arc<Mutex<AirState>>,
}

impl LoopbackAir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast raw bytes to every scanner, as any nearby transmitter could.
    pub fn inject(&self, data: &[u8]) {
        if let Ok(mut st) = self.state.lock() {
            st.scanners.retain(|tx| {
                tx.send(RadioEvent::ScanResult {
                    data: data.to_vec(),
                })
                .is_ok()
            });
        }
    }

    pub fn scanner_count(&self) -> usize {
        self.state.lock().map(|st| st.scanners.len()).unwrap_or(0)
    }

    fn register(&self) -> u64 {
        self.state
            .lock()
            .map(|mut st| {
                st.next_id += 1;
                st.next_id
            })
            .unwrap_or_default()
    }

    fn broadcast_from(&self, id: u64, payload: &[u8]) {
        if let Ok(mut st) = self.state.lock() {
            match st.advertising.iter_mut().find(|(owner, _)| *owner == id) {
                Some((_, current)) => *current = payload.to_vec(),
                None => st.advertising.push((id, payload.to_vec())),
            }
        }
        self.inject(payload);
    }

    fn go_silent(&self, id: u64) {
        if let Ok(mut st) = self.state.lock() {
            st.advertising.retain(|(owner, _)| *owner != id);
        }
    }

    fn join_scan(&self, tx: xch::Sender<RadioEvent>) {
        if let Ok(mut st) = self.state.lock() {
            for (_, payload) in &st.advertising {
                let _ = tx.send(RadioEvent::ScanResult {
                    data: payload.clone(),
                });
            }
            st.scanners.push(tx);
        }
    }
}

/// Simulated radio attached to a [`LoopbackAir`].
pub struct LoopbackRadio {
    air: LoopbackAir,
    id: u64,
    events: xch::Sender<RadioEvent>,
    pending: Option<Vec<u8>>,
    current: Option<Vec<u8>>,
    scanning: bool,
}

impl LoopbackRadio {
    /// `events` receives this radio's completion notifications and scan results.
    pub fn new(air: LoopbackAir, events: xch::Sender<RadioEvent>) -> Self {
        let id = air.register();
        Self {
            air,
            id,
            events,
            pending: None,
            current: None,
            scanning: false,
        }
    }

    /// Payload currently being broadcast, if advertising has been started.
    pub fn current_advertisement(&self) -> Option<&[u8]> {
        self.current.as_deref()
    }

    fn notify(&self, ev: RadioEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events
            .send(ev)
            .map_err(|_| Box::new(HwError::Radio("event queue closed".into())) as _)
    }
}

impl bump_traits::Radio for LoopbackRadio {
    fn configure_advertisement(
        &mut self,
        payload: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.scanning {
            return Err(Box::new(HwError::Radio(
                "radio is in scanner role".into(),
            )));
        }
        self.pending = Some(payload.to_vec());
        self.notify(RadioEvent::AdvertisementConfigured)
    }

    fn start_advertising(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Some(payload) = self.pending.clone() else {
            return self.notify(RadioEvent::AdvertisingStarted { ok: false });
        };
        self.air.broadcast_from(self.id, &payload);
        self.current = Some(payload);
        self.notify(RadioEvent::AdvertisingStarted { ok: true })
    }

    fn configure_scan(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.current.is_some() {
            return Err(Box::new(HwError::Radio(
                "radio is in advertiser role".into(),
            )));
        }
        self.notify(RadioEvent::ScanConfigured)
    }

    fn start_scanning(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.scanning {
            self.scanning = true;
            self.air.join_scan(self.events.clone());
        }
        self.notify(RadioEvent::ScanStarted { ok: true })
    }
}

impl Drop for LoopbackRadio {
    fn drop(&mut self) {
        self.air.go_silent(self.id);
    }
}

#[cfg(feature = "hardware")]
pub struct HardwareRangeSensor {
    inner: hcsr04::HcSr04,
}

#[cfg(feature = "hardware")]
impl HardwareRangeSensor {
    pub fn new(trigger_pin: u8, echo_pin: u8) -> Result<Self, HwError> {
        Ok(Self {
            inner: hcsr04::HcSr04::new(trigger_pin, echo_pin)?,
        })
    }
}

#[cfg(feature = "hardware")]
impl RangeSensor for HardwareRangeSensor {
    fn measure_cm(
        &mut self,
        max_cm: f32,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        match self.inner.measure_cm(max_cm) {
            Ok(cm) => Ok(cm),
            Err(e) => {
                tracing::debug!(error = %e, "ultrasonic read failed");
                Err(Box::new(e))
            }
        }
    }
}

#[cfg(feature = "hardware")]
pub struct HardwareServo {
    inner: servo::PwmServo,
}

#[cfg(feature = "hardware")]
impl HardwareServo {
    pub fn new(signal_pin: u8) -> Result<Self, HwError> {
        Ok(Self {
            inner: servo::PwmServo::new(signal_pin)?,
        })
    }
}

#[cfg(feature = "hardware")]
impl Servo for HardwareServo {
    fn set_pulse_width_us(
        &mut self,
        pulse_us: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner
            .set_pulse_width_us(pulse_us)
            .map_err(|e| Box::new(e) as _)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bump_traits::Radio;

    #[test]
    fn simulated_sensor_replays_then_reports_open_road() {
        let mut sensor = SimulatedRangeSensor::new();
        sensor.script().extend([Some(12.0), None]);
        assert_eq!(sensor.measure_cm(60.0).unwrap(), 12.0);
        assert!(sensor.measure_cm(60.0).is_err());
        assert_eq!(sensor.measure_cm(60.0).unwrap(), 60.0);
    }

    #[test]
    fn simulated_servo_rejects_out_of_range_pulse() {
        let mut servo = SimulatedServo::new();
        assert!(servo.set_pulse_width_us(1500).is_ok());
        assert!(servo.set_pulse_width_us(3000).is_err());
        assert_eq!(servo.pulses(), vec![1500]);
    }

    #[test]
    fn advertisement_reaches_scanner_only_after_start() {
        let air = LoopbackAir::new();
        let (adv_tx, adv_rx) = xch::unbounded();
        let (scan_tx, scan_rx) = xch::unbounded();
        let mut advertiser = LoopbackRadio::new(air.clone(), adv_tx);
        let mut scanner = LoopbackRadio::new(air.clone(), scan_tx);

        scanner.configure_scan().unwrap();
        scanner.start_scanning().unwrap();
        assert_eq!(scan_rx.try_recv().unwrap(), RadioEvent::ScanConfigured);
        assert_eq!(scan_rx.try_recv().unwrap(), RadioEvent::ScanStarted { ok: true });

        advertiser.configure_advertisement(&[1, 2, 3]).unwrap();
        assert_eq!(adv_rx.try_recv().unwrap(), RadioEvent::AdvertisementConfigured);
        assert!(scan_rx.try_recv().is_err(), "configure alone must not broadcast");

        advertiser.start_advertising().unwrap();
        assert_eq!(
            scan_rx.try_recv().unwrap(),
            RadioEvent::ScanResult {
                data: vec![1, 2, 3]
            }
        );
        assert_eq!(advertiser.current_advertisement(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn late_scanner_hears_current_advertisement_until_radio_drops() {
        let air = LoopbackAir::new();
        let (adv_tx, _adv_rx) = xch::unbounded();
        let mut advertiser = LoopbackRadio::new(air.clone(), adv_tx);
        advertiser.configure_advertisement(&[7, 1]).unwrap();
        advertiser.start_advertising().unwrap();
        advertiser.configure_advertisement(&[7, 2]).unwrap();
        advertiser.start_advertising().unwrap();

        let (scan_tx, scan_rx) = xch::unbounded();
        let mut scanner = LoopbackRadio::new(air.clone(), scan_tx);
        scanner.configure_scan().unwrap();
        scanner.start_scanning().unwrap();
        let heard: Vec<_> = scan_rx
            .try_iter()
            .filter_map(|ev| match ev {
                RadioEvent::ScanResult { data } => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(heard, vec![vec![7, 2]]);

        drop(advertiser);
        let (late_tx, late_rx) = xch::unbounded();
        let mut late = LoopbackRadio::new(air, late_tx);
        late.configure_scan().unwrap();
        late.start_scanning().unwrap();
        assert!(
            late_rx
                .try_iter()
                .all(|ev| !matches!(ev, RadioEvent::ScanResult { .. }))
        );
    }

    #[test]
    fn roles_are_exclusive() {
        let air = LoopbackAir::new();
        let (tx, _rx) = xch::unbounded();
        let mut radio = LoopbackRadio::new(air, tx);
        radio.configure_scan().unwrap();
        radio.start_scanning().unwrap();
        assert!(radio.configure_advertisement(&[0]).is_err());
    }
}
