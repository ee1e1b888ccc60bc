//! Human-readable error descriptions, exit codes and structured JSON errors.

use bump_core::error::{BuildError, BumpError};
use bump_core::DecodeError;

fn find<T: std::error::Error + 'static>(err: &eyre::Report) -> Option<&T> {
    err.chain().find_map(|c| c.downcast_ref::<T>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = find::<BuildError>(err) {
        return match be {
            BuildError::MissingServo => {
                "What happened: No servo was provided to the actuator.\nLikely causes: The servo driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the servo is created successfully and passed via with_servo(...).".to_string()
            }
            BuildError::InvalidIdentity { expected, got } => format!(
                "What happened: The advertised name {got:?} is not {expected} ASCII characters.\nLikely causes: identity.name was edited in the config.\nHow to fix: Use a {expected}-character ASCII name shared by every node, e.g. \"Speed Bump\"."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/bump_config.toml for a sample."
            ),
        };
    }

    if let Some(de) = find::<DecodeError>(err) {
        return match de {
            DecodeError::WrongLength(n) => format!(
                "What happened: The frame is {n} bytes; advertisements are exactly 18.\nHow to fix: Pass the complete frame as 36 hex digits."
            ),
            DecodeError::PrefixMismatch => "What happened: The frame does not start with this system's name prefix.\nLikely causes: It came from another device, or identity.name differs between nodes.\nHow to fix: Compare the first 12 bytes with `bump encode idle`.".to_string(),
            DecodeError::UnknownCommand(code) => format!(
                "What happened: Command byte 0x{code:02x} is not idle (00), deploy (01) or retract (02).\nHow to fix: Check the last byte of the frame."
            ),
        };
    }

    if let Some(e) = find::<BumpError>(err) {
        return match e {
            BumpError::Config(msg) => format!(
                "What happened: Invalid configuration: {msg}.\nLikely causes: A typo or out-of-range value in the TOML or trace file.\nHow to fix: Edit the file and rerun; `bump self-check` validates without starting nodes."
            ),
            BumpError::Timeout => "What happened: Ultrasonic sensor did not answer in time.\nLikely causes: Wrong trigger/echo pins, wiring or power issues.\nHow to fix: Check [pins] in the config and the sensor's 5V/GND.".to_string(),
            BumpError::Hardware(msg) | BumpError::HardwareFault(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process may access GPIO."
            ),
            BumpError::Radio(msg) => format!(
                "What happened: Radio error ({msg}).\nLikely causes: The radio was asked to advertise and scan, or failed to start.\nHow to fix: Run one role per node and check the radio stack logs."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.contains("invalid hex") {
        return format!("What happened: {msg}.\nHow to fix: Pass the frame as hex digits, e.g. 0b0953706565642042756d7005ff00000002.");
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 configuration, 3 hardware, 4 radio, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if find::<BuildError>(err).is_some() {
        return 2;
    }
    match find::<BumpError>(err) {
        Some(BumpError::Config(_)) => 2,
        Some(
            BumpError::Hardware(_)
            | BumpError::HardwareFault(_)
            | BumpError::Timeout
            | BumpError::NoObject,
        ) => 3,
        Some(BumpError::Radio(_)) => 4,
        _ => 1,
    }
}

pub fn reason_name(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        2 => "Config",
        3 => "Hardware",
        4 => "Radio",
        _ if find::<DecodeError>(err).is_some() => "Decode",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
