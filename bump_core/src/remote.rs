//! Inbound messages from the connectivity collaborator.

use crate::config::Topics;
use crate::payload::CommandCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteMessage {
    /// Operator asked for a deploy or retract.
    Command(CommandCode),
    /// A firmware artifact is available; handled outside the core.
    FirmwareUpdate(String),
}

impl RemoteMessage {
    /// Interpret a message received on `topic`. Topics are matched exactly;
    /// anything unrecognized yields `None`.
    pub fn parse(topics: &Topics, topic: &str, body: &str) -> Option<Self> {
        let body = body.trim();
        if topic == topics.command {
            match body {
                "deploy" => Some(Self::Command(CommandCode::Deploy)),
                "retract" => Some(Self::Command(CommandCode::Retract)),
                _ => None,
            }
        } else if topic == topics.upgrade && !body.is_empty() {
            Some(Self::FirmwareUpdate(body.to_string()))
        } else {
            None
        }
    }
}
