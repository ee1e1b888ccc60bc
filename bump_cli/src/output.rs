//! Stdout rendering for telemetry reports and actuator events.

use bump_core::{ActuatorEvent, RetractCause};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Telemetry sink printing each report on stdout.
#[derive(Debug, Clone)]
pub struct StdoutSink {
    json: bool,
    count: Arc<AtomicUsize>,
}

impl StdoutSink {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of reports published so far, shared across clones.
    pub fn published(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl bump_traits::TelemetrySink for StdoutSink {
    fn publish(
        &mut self,
        topic: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.count.fetch_add(1, Ordering::Relaxed);
        if self.json {
            let report: serde_json::Value = serde_json::from_str(payload)?;
            println!(
                "{}",
                serde_json::json!({ "kind": "telemetry", "topic": topic, "report": report })
            );
        } else {
            println!("telemetry {topic} {payload}");
        }
        Ok(())
    }
}

fn cause_str(cause: RetractCause) -> &'static str {
    match cause {
        RetractCause::Signal => "signal",
        RetractCause::Timeout => "timeout",
        RetractCause::Park => "park",
    }
}

/// Print one actuator event as a text line or a JSON object.
pub fn print_event(ev: &ActuatorEvent, json: bool) {
    if json {
        let v = match ev {
            ActuatorEvent::Deployed { at_ms, generation } => serde_json::json!({
                "kind": "deployed", "at_ms": at_ms, "generation": generation
            }),
            ActuatorEvent::Retracted { at_ms, cause } => serde_json::json!({
                "kind": "retracted", "at_ms": at_ms, "cause": cause_str(*cause)
            }),
            ActuatorEvent::Rejected {
                at_ms,
                command,
                reason,
            } => serde_json::json!({
                "kind": "rejected", "at_ms": at_ms, "command": command.as_str(),
                "reason": format!("{reason:?}")
            }),
            ActuatorEvent::Faulted { at_ms, message } => serde_json::json!({
                "kind": "faulted", "at_ms": at_ms, "message": message
            }),
        };
        println!("{v}");
        return;
    }
    match ev {
        ActuatorEvent::Deployed { at_ms, generation } => {
            println!("[{at_ms:>8} ms] deployed (#{generation})");
        }
        ActuatorEvent::Retracted { at_ms, cause } => {
            println!("[{at_ms:>8} ms] retracted ({})", cause_str(*cause));
        }
        ActuatorEvent::Rejected {
            at_ms,
            command,
            reason,
        } => println!("[{at_ms:>8} ms] {command} rejected: {reason:?}"),
        ActuatorEvent::Faulted { at_ms, message } => {
            println!("[{at_ms:>8} ms] fault: {message}");
        }
    }
}

/// Running totals over an actuator event stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventTally {
    pub deployments: usize,
    /// Excludes the boot-time park.
    pub retractions: usize,
    pub rejections: usize,
    pub faults: usize,
}

impl EventTally {
    pub fn record(&mut self, ev: &ActuatorEvent) {
        match ev {
            ActuatorEvent::Deployed { .. } => self.deployments += 1,
            ActuatorEvent::Retracted {
                cause: RetractCause::Park,
                ..
            } => {}
            ActuatorEvent::Retracted { .. } => self.retractions += 1,
            ActuatorEvent::Rejected { .. } => self.rejections += 1,
            ActuatorEvent::Faulted { .. } => self.faults += 1,
        }
    }
}
