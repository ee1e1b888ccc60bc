//! Actuator state machine: idempotence, debounce, auto-retract and faults.

use std::sync::Arc;
use std::time::Duration;

use bump_core::actuator::{Actuator, ActuatorEvent, Phase, Reject, RetractCause, Transition};
use bump_core::config::ActuatorCfg;
use bump_core::mocks::FailingServo;
use bump_core::{BumpError, CommandCode};
use bump_hardware::SimulatedServo;
use bump_traits::clock::{ManualClock, MonotonicClock};
use crossbeam_channel as xch;
use proptest::prelude::*;

const WAIT: Duration = Duration::from_secs(2);

fn instant_cfg() -> ActuatorCfg {
    ActuatorCfg {
        settle_ms: 0,
        ..ActuatorCfg::default()
    }
}

fn rig(
    cfg: ActuatorCfg,
) -> (
    Actuator,
    SimulatedServo,
    ManualClock,
    xch::Receiver<ActuatorEvent>,
) {
    let clock = ManualClock::new();
    let servo = SimulatedServo::new();
    let (tx, rx) = xch::unbounded();
    let actuator = Actuator::builder()
        .with_servo(servo.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_config(cfg)
        .with_events(tx)
        .build()
        .unwrap();
    (actuator, servo, clock, rx)
}

fn advance_ms(clock: &ManualClock, ms: u64) {
    clock.advance(Duration::from_millis(ms));
}

#[test]
fn activate_twice_sweeps_once() {
    let (a, servo, _clock, _rx) = rig(instant_cfg());
    assert_eq!(a.activate().unwrap(), Transition::Completed(Phase::Deployed));
    assert_eq!(
        a.activate().unwrap(),
        Transition::Rejected(Reject::AlreadyDeployed)
    );
    assert_eq!(servo.pulses().len(), 181);
    assert_eq!(a.sweeps(), 1);
}

#[test]
fn rejected_signal_restarts_debounce() {
    let (a, _servo, clock, _rx) = rig(instant_cfg());
    assert!(clock.elapsed().is_zero());
    a.activate().unwrap();

    advance_ms(&clock, 30);
    assert_eq!(
        a.deactivate(true).unwrap(),
        Transition::Rejected(Reject::TooSoon { elapsed_ms: 30 })
    );
    assert_eq!(a.last_transition_ms(), Some(30));

    // 60 ms after deploy but only 30 after the rejected signal
    advance_ms(&clock, 30);
    assert!(matches!(
        a.deactivate(true).unwrap(),
        Transition::Rejected(Reject::TooSoon { .. })
    ));

    advance_ms(&clock, 51);
    assert_eq!(a.deactivate(true).unwrap(), Transition::Completed(Phase::Idle));
    assert!(!a.is_deployed());
}

#[test]
fn rejected_timeout_retract_does_not_stamp() {
    let (a, _servo, clock, _rx) = rig(instant_cfg());
    advance_ms(&clock, 100);
    assert_eq!(
        a.deactivate(false).unwrap(),
        Transition::Rejected(Reject::AlreadyRetracted)
    );
    assert_eq!(a.last_transition_ms(), None);
    assert_eq!(
        a.deactivate(true).unwrap(),
        Transition::Rejected(Reject::AlreadyRetracted)
    );
    assert_eq!(a.last_transition_ms(), Some(100));
}

#[test]
fn manual_retract_makes_auto_retract_a_noop() {
    let (a, _servo, clock, rx) = rig(instant_cfg());

    a.activate().unwrap();
    assert!(matches!(
        rx.recv_timeout(WAIT).unwrap(),
        ActuatorEvent::Deployed { at_ms: 0, generation: 1 }
    ));
    assert!(clock.wait_for_sleepers(1, WAIT), "auto-retract timer parked");

    advance_ms(&clock, 5_000);
    assert_eq!(a.deactivate(true).unwrap(), Transition::Completed(Phase::Idle));
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ActuatorEvent::Retracted { at_ms: 5_000, cause: RetractCause::Signal }
    );

    advance_ms(&clock, 5_000);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ActuatorEvent::Rejected {
            at_ms: 10_000,
            command: CommandCode::Retract,
            reason: Reject::AlreadyRetracted,
        }
    );
    assert_eq!(a.sweeps(), 2);
}

#[test]
fn auto_retract_lowers_after_dwell() {
    let (a, servo, clock, rx) = rig(instant_cfg());
    a.activate().unwrap();
    let _ = rx.recv_timeout(WAIT).unwrap();
    assert!(clock.wait_for_sleepers(1, WAIT));

    advance_ms(&clock, 10_000);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ActuatorEvent::Retracted { at_ms: 10_000, cause: RetractCause::Timeout }
    );
    assert_eq!(a.phase(), Phase::Idle);
    assert_eq!(servo.last_pulse(), Some(500));
}

#[test]
fn repeated_deploy_near_dwell_end_only_defers_auto_retract() {
    let (a, _servo, clock, rx) = rig(instant_cfg());
    a.activate().unwrap();
    let _ = rx.recv_timeout(WAIT).unwrap();
    assert!(clock.wait_for_sleepers(1, WAIT));

    // A second Deploy frame lands 20 ms before the dwell ends
    advance_ms(&clock, 9_980);
    assert_eq!(
        a.activate().unwrap(),
        Transition::Rejected(Reject::AlreadyDeployed)
    );
    let _ = rx.recv_timeout(WAIT).unwrap();

    advance_ms(&clock, 20);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ActuatorEvent::Rejected {
            at_ms: 10_000,
            command: CommandCode::Retract,
            reason: Reject::TooSoon { elapsed_ms: 20 },
        }
    );
    assert!(clock.wait_for_sleepers(1, WAIT), "timer waits out the debounce");
    assert_eq!(a.pending_timers(), 1);

    advance_ms(&clock, 31);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ActuatorEvent::Retracted { at_ms: 10_031, cause: RetractCause::Timeout }
    );
    assert_eq!(a.phase(), Phase::Idle);
}

#[test]
fn stale_timer_never_retracts_a_newer_deployment() {
    let (a, _servo, clock, rx) = rig(instant_cfg());
    a.activate().unwrap();
    assert!(clock.wait_for_sleepers(1, WAIT));

    advance_ms(&clock, 5_000);
    a.deactivate(true).unwrap();
    advance_ms(&clock, 1_000);
    a.activate().unwrap();
    assert!(clock.wait_for_sleepers(2, WAIT));
    let drained: Vec<_> = rx.try_iter().collect();
    assert_eq!(drained.len(), 3);

    // First timer fires at 10 s while the second deployment is up
    advance_ms(&clock, 4_000);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ActuatorEvent::Rejected {
            at_ms: 10_000,
            command: CommandCode::Retract,
            reason: Reject::Superseded,
        }
    );
    assert!(a.is_deployed());

    advance_ms(&clock, 6_000);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ActuatorEvent::Retracted { at_ms: 16_000, cause: RetractCause::Timeout }
    );
}

#[test]
fn requests_during_a_sweep_are_busy() {
    let servo = SimulatedServo::new();
    let a = Actuator::builder()
        .with_servo(servo.clone())
        .with_clock(Arc::new(MonotonicClock::new()))
        .with_config(ActuatorCfg {
            settle_ms: 2,
            ..ActuatorCfg::default()
        })
        .build()
        .unwrap();

    let raising = {
        let a = a.clone();
        std::thread::spawn(move || a.activate().unwrap())
    };
    let deadline = std::time::Instant::now() + WAIT;
    while a.phase() != Phase::Deploying && std::time::Instant::now() < deadline {
        std::thread::yield_now();
    }
    assert_eq!(a.activate().unwrap(), Transition::Rejected(Reject::Busy));
    assert_eq!(a.deactivate(true).unwrap(), Transition::Rejected(Reject::Busy));

    assert_eq!(raising.join().unwrap(), Transition::Completed(Phase::Deployed));
    assert_eq!(a.sweeps(), 1);
    assert_eq!(servo.pulses().len(), 181);
}

#[test]
fn servo_fault_aborts_and_restores_resting_phase() {
    let clock = ManualClock::new();
    let (tx, rx) = xch::unbounded();
    let a = Actuator::builder()
        .with_servo(FailingServo::after(10))
        .with_clock(Arc::new(clock))
        .with_config(instant_cfg())
        .with_events(tx)
        .build()
        .unwrap();

    let err = a.activate().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BumpError>(),
        Some(BumpError::Hardware(msg)) if msg.contains("10 deg")
    ));
    assert_eq!(a.phase(), Phase::Idle);
    assert_eq!(a.pending_timers(), 0);
    assert!(matches!(rx.try_recv(), Ok(ActuatorEvent::Faulted { .. })));
}

#[test]
fn dispatcher_thread_applies_commands() {
    let (a, _servo, clock, rx) = rig(instant_cfg());
    let (cmd_tx, cmd_rx) = xch::unbounded();
    let _dispatcher = a.spawn_dispatcher(cmd_rx).unwrap();

    cmd_tx.send(CommandCode::Idle).unwrap();
    cmd_tx.send(CommandCode::Deploy).unwrap();
    assert!(matches!(
        rx.recv_timeout(WAIT).unwrap(),
        ActuatorEvent::Deployed { .. }
    ));
    assert!(clock.wait_for_sleepers(1, WAIT));
    advance_ms(&clock, 200);
    cmd_tx.send(CommandCode::Retract).unwrap();
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        ActuatorEvent::Retracted { at_ms: 200, cause: RetractCause::Signal }
    );
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Activate,
    Signal,
    Timeout,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Activate), Just(Op::Signal), Just(Op::Timeout)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn accepted_transitions_respect_min_delay(
        steps in prop::collection::vec((op(), 0u64..120), 1..24)
    ) {
        let cfg = ActuatorCfg { dwell_ms: 10_000_000, ..instant_cfg() };
        let (a, _servo, clock, rx) = rig(cfg);
        for (op, gap) in steps {
            advance_ms(&clock, gap);
            let _ = match op {
                Op::Activate => a.activate().unwrap(),
                Op::Signal => a.deactivate(true).unwrap(),
                Op::Timeout => a.deactivate(false).unwrap(),
            };
        }
        let accepted: Vec<u64> = rx
            .try_iter()
            .filter_map(|ev| match ev {
                ActuatorEvent::Deployed { at_ms, .. } | ActuatorEvent::Retracted { at_ms, .. } => Some(at_ms),
                _ => None,
            })
            .collect();
        for pair in accepted.windows(2) {
            prop_assert!(pair[1] - pair[0] > cfg.min_delay_ms, "transitions at {:?}", pair);
        }
        // Release parked auto-retract timers
        advance_ms(&clock, cfg.dwell_ms);
    }
}
