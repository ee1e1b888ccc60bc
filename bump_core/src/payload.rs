//! Advertisement payload codec.
//!
//! Layout (18 bytes):
//!
//! ```text
//! [0x0b][0x09][10 ASCII name bytes][0x05][0xff][0x00 0x00 0x00][command]
//!  len   type                        len   type   reserved
//! ```
//!
//! The first 12 bytes identify the system; only the final byte carries a
//! command. There is no integrity check or authentication: any transmitter
//! that reproduces the prefix is obeyed.

use std::fmt;

use thiserror::Error;

use crate::error::BuildError;

pub const PAYLOAD_LEN: usize = 18;
pub const PREFIX_LEN: usize = 12;
pub const NAME_LEN: usize = 10;
pub const COMMAND_OFFSET: usize = PAYLOAD_LEN - 1;
pub const DEFAULT_NAME: &str = "Speed Bump";

/// AD structure: complete local name, length covers type + name.
const NAME_AD_LEN: u8 = 0x0b;
const NAME_AD_TYPE: u8 = 0x09;
/// AD structure: manufacturer data, length covers type + 3 reserved + command.
const DATA_AD_LEN: u8 = 0x05;
const DATA_AD_TYPE: u8 = 0xff;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload must be {PAYLOAD_LEN} bytes, got {0}")]
    WrongLength(usize),
    #[error("payload prefix does not match this system")]
    PrefixMismatch,
    #[error("unknown command code 0x{0:02x}")]
    UnknownCommand(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    Idle = 0x00,
    Deploy = 0x01,
    Retract = 0x02,
}

impl CommandCode {
    pub const ALL: [Self; 3] = [Self::Idle, Self::Deploy, Self::Retract];

    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Deploy => "deploy",
            Self::Retract => "retract",
        }
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = DecodeError;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            0x00 => Ok(Self::Idle),
            0x01 => Ok(Self::Deploy),
            0x02 => Ok(Self::Retract),
            other => Err(DecodeError::UnknownCommand(other)),
        }
    }
}

impl std::str::FromStr for CommandCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "deploy" => Ok(Self::Deploy),
            "retract" => Ok(Self::Retract),
            other => Err(format!("unknown command '{other}' (expected idle|deploy|retract)")),
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System identity: the constant 12-byte prefix every payload starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    prefix: [u8; PREFIX_LEN],
}

impl Identity {
    /// Build the identity for a local name of exactly [`NAME_LEN`] ASCII bytes.
    pub fn from_name(name: &str) -> Result<Self, BuildError> {
        if !name.is_ascii() || name.len() != NAME_LEN {
            return Err(BuildError::InvalidIdentity {
                expected: NAME_LEN,
                got: name.to_string(),
            });
        }
        let mut prefix = [0u8; PREFIX_LEN];
        prefix[0] = NAME_AD_LEN;
        prefix[1] = NAME_AD_TYPE;
        prefix[2..].copy_from_slice(name.as_bytes());
        Ok(Self { prefix })
    }

    #[inline]
    pub fn prefix(&self) -> &[u8; PREFIX_LEN] {
        &self.prefix
    }

    pub fn name(&self) -> &str {
        // Constructed from an ASCII &str only.
        std::str::from_utf8(&self.prefix[2..]).unwrap_or_default()
    }

    pub fn encode(&self, command: CommandCode) -> AdvertisementPayload {
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[..PREFIX_LEN].copy_from_slice(&self.prefix);
        bytes[PREFIX_LEN] = DATA_AD_LEN;
        bytes[PREFIX_LEN + 1] = DATA_AD_TYPE;
        bytes[COMMAND_OFFSET] = command.as_byte();
        AdvertisementPayload(bytes)
    }

    pub fn decode(&self, data: &[u8]) -> Result<CommandCode, DecodeError> {
        decode(data, &self.prefix)
    }
}

impl Default for Identity {
    fn default() -> Self {
        let mut prefix = [0u8; PREFIX_LEN];
        prefix[0] = NAME_AD_LEN;
        prefix[1] = NAME_AD_TYPE;
        prefix[2..].copy_from_slice(DEFAULT_NAME.as_bytes());
        Self { prefix }
    }
}

/// One complete advertisement, ready to hand to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisementPayload([u8; PAYLOAD_LEN]);

impl AdvertisementPayload {
    #[inline]
    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    pub fn command(&self) -> Result<CommandCode, DecodeError> {
        CommandCode::try_from(self.0[COMMAND_OFFSET])
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl AsRef<[u8]> for AdvertisementPayload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode `command` under the default identity.
pub fn encode(command: CommandCode) -> AdvertisementPayload {
    Identity::default().encode(command)
}

/// Decode a received advertisement, accepting only exact-length payloads
/// whose first [`PREFIX_LEN`] bytes equal `prefix`.
pub fn decode(data: &[u8], prefix: &[u8; PREFIX_LEN]) -> Result<CommandCode, DecodeError> {
    if data.len() != PAYLOAD_LEN {
        return Err(DecodeError::WrongLength(data.len()));
    }
    if data[..PREFIX_LEN] != prefix[..] {
        return Err(DecodeError::PrefixMismatch);
    }
    CommandCode::try_from(data[COMMAND_OFFSET])
}
