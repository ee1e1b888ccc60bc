//! Transit estimation through the poller, from readings to deploy request.

use std::sync::Arc;
use std::time::Duration;

use bump_core::channel::{Advertiser, shared_radio};
use bump_core::config::{BroadcastCfg, EstimatorCfg};
use bump_core::estimator::{Side, TransitEstimator};
use bump_core::monitor::{TransitPoller, shared_window};
use bump_core::util::transit_speed_cm_s;
use bump_core::{CommandCode, Identity, encode};
use bump_hardware::{LoopbackAir, LoopbackRadio, SensorScript, SimulatedRangeSensor};
use bump_traits::clock::ManualClock;
use bump_traits::{Radio, RadioEvent};
use crossbeam_channel as xch;
use proptest::prelude::*;

const NEAR: Option<f32> = Some(20.0);
const FAR: Option<f32> = Some(400.0);

fn scripted() -> (SimulatedRangeSensor, SensorScript) {
    let s = SimulatedRangeSensor::new();
    let script = s.script();
    (s, script)
}

#[test]
fn fast_vehicle_requests_deploy_broadcast() {
    let clock = ManualClock::new();
    let air = LoopbackAir::new();

    // Listener on the same air
    let (scan_tx, scan_rx) = xch::unbounded();
    let mut listener = LoopbackRadio::new(air.clone(), scan_tx);
    listener.configure_scan().unwrap();
    listener.start_scanning().unwrap();
    let _ = scan_rx.try_iter().count();

    let (adv_tx, adv_rx) = xch::unbounded();
    let advertiser = Advertiser::new(
        shared_radio(LoopbackRadio::new(air, adv_tx)),
        Identity::default(),
        Arc::new(clock.clone()),
        BroadcastCfg::default(),
    );
    let _events = advertiser.run_events(adv_rx).unwrap();

    let (a, a_script) = scripted();
    let (b, b_script) = scripted();
    a_script.extend([NEAR, FAR]);
    b_script.extend([FAR, NEAR]);

    let (speed_tx, speed_rx) = xch::unbounded();
    let trigger = advertiser.clone();
    let window = shared_window(100);
    let mut poller = TransitPoller::new(a, b, EstimatorCfg::default(), window.clone()).on_speeding(
        move |speed| {
            speed_tx.send(speed).unwrap();
            trigger.request_transient(CommandCode::Deploy).unwrap();
        },
    );

    assert!(poller.poll(100).armed);
    let obs = poller.poll(140);
    let t = obs.transit.expect("transit at 140");
    assert!((t.speed_cm_s - 250.0).abs() < 1e-3);
    assert!((speed_rx.recv_timeout(Duration::from_secs(1)).unwrap() - 250.0).abs() < 1e-3);
    assert_eq!(window.lock().unwrap().samples(), &[t.speed_cm_s]);

    let deploy = encode(CommandCode::Deploy);
    assert_eq!(
        scan_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        RadioEvent::ScanResult { data: deploy.as_bytes().to_vec() }
    );

    // Transient reverts to idle once the 2 s dwell passes
    assert!(clock.wait_for_sleepers(1, Duration::from_secs(2)));
    clock.advance(Duration::from_millis(2000));
    assert_eq!(
        scan_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        RadioEvent::ScanResult { data: encode(CommandCode::Idle).as_bytes().to_vec() }
    );
    assert_eq!(advertiser.current(), Some(CommandCode::Idle));
}

#[test]
fn slow_vehicle_is_recorded_without_deploy() {
    let (a, a_script) = scripted();
    let (b, b_script) = scripted();
    a_script.extend([NEAR, FAR]);
    b_script.extend([FAR, NEAR]);
    let (tx, rx) = xch::unbounded::<f32>();
    let window = shared_window(10);
    let mut poller = TransitPoller::new(a, b, EstimatorCfg::default(), window.clone())
        .on_speeding(move |s| tx.send(s).unwrap());

    poller.poll(0);
    // 10 cm in 400 ms = 25 cm/s
    let t = poller.poll(400).transit.unwrap();
    assert!((t.speed_cm_s - 25.0).abs() < 1e-3);
    assert!(rx.try_recv().is_err());
    assert_eq!(window.lock().unwrap().len(), 1);
}

#[test]
fn read_faults_mark_sensor_down_until_aggregation() {
    let (a, _) = scripted();
    let (b, b_script) = scripted();
    b_script.extend([None, None, None, FAR]);
    let window = shared_window(10);
    let mut poller = TransitPoller::new(a, b, EstimatorCfg::default(), window.clone());
    for t in 0..4 {
        poller.poll(t * 50);
    }
    let summary = window.lock().unwrap().aggregate_and_reset();
    assert!(summary.sensor_up(Side::A));
    assert!(!summary.sensor_up(Side::B));
    assert!(summary.degraded());
    assert!(!window.lock().unwrap().aggregate_and_reset().degraded());
}

#[test]
fn empty_road_beyond_range_is_not_a_fault() {
    let (a, a_script) = scripted();
    let (b, b_script) = scripted();
    a_script.extend([FAR; 5]);
    b_script.extend([FAR; 5]);
    let window = shared_window(10);
    let mut poller = TransitPoller::new(a, b, EstimatorCfg::default(), window.clone());
    for t in 0..5 {
        let obs = poller.poll(t * 50);
        assert!(!obs.is_down(Side::A) && !obs.is_down(Side::B));
    }
    assert!(!window.lock().unwrap().aggregate_and_reset().degraded());
}

proptest! {
    #[test]
    fn speed_is_inversely_proportional_to_elapsed(ticks in 1u64..2000, k in 2u64..5) {
        let tick = Duration::from_millis(1);
        let v1 = transit_speed_cm_s(10.0, ticks, tick).unwrap();
        let vk = transit_speed_cm_s(10.0, ticks * k, tick).unwrap();
        prop_assert!((v1 / vk - k as f32).abs() < 1e-3);
    }

    #[test]
    fn estimator_speed_matches_formula(start in 0u64..10_000, elapsed in 1u64..2000) {
        let mut e = TransitEstimator::new(EstimatorCfg::default());
        e.observe(start, NEAR, FAR);
        let t = e.observe(start + elapsed, FAR, NEAR).transit.unwrap();
        prop_assert_eq!(t.elapsed_ms, elapsed);
        prop_assert!((t.speed_cm_s - 10_000.0 / elapsed as f32).abs() < 1e-2);
    }
}
