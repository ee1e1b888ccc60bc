//! `encode`, `decode` and `self-check` subcommands.

use bump_core::{BumpError, CommandCode, Identity};
use eyre::WrapErr;

/// Parse a hex frame; whitespace, `:` separators and a `0x` prefix are accepted.
pub fn parse_hex(text: &str) -> eyre::Result<Vec<u8>> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = body
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        eyre::bail!("invalid hex: odd number of digits ({})", digits.len());
    }
    digits
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).map_err(|_| eyre::eyre!("invalid hex: non-ASCII input"))?;
            u8::from_str_radix(s, 16).map_err(|_| eyre::eyre!("invalid hex: {s:?} is not a byte"))
        })
        .collect()
}

fn identity(cfg: &bump_config::Config) -> eyre::Result<Identity> {
    Ok(Identity::from_name(&cfg.identity.name)?)
}

pub fn encode(cfg: &bump_config::Config, command: CommandCode, json: bool) -> eyre::Result<()> {
    let frame = identity(cfg)?.encode(command);
    if json {
        println!(
            "{}",
            serde_json::json!({ "command": command.as_str(), "payload": frame.to_hex() })
        );
    } else {
        println!("{}", frame.to_hex());
    }
    Ok(())
}

pub fn decode(cfg: &bump_config::Config, frame: &str, json: bool) -> eyre::Result<()> {
    let bytes = parse_hex(frame)?;
    let command = identity(cfg)?
        .decode(&bytes)
        .wrap_err("frame rejected")?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "command": command.as_str(), "byte": command.as_byte() })
        );
    } else {
        println!("{command}");
    }
    Ok(())
}

/// Validate what can be validated without running a node.
pub fn self_check(cfg: &bump_config::Config, json: bool) -> eyre::Result<()> {
    // Config was validated on load
    let id = identity(cfg)?;
    for command in CommandCode::ALL {
        let frame = id.encode(command);
        let back = id.decode(frame.as_bytes())?;
        if back != command {
            return Err(BumpError::State(format!("codec round trip changed {command} into {back}")).into());
        }
    }

    #[cfg(feature = "hardware")]
    {
        let hw = |e: bump_hardware::error::HwError| bump_core::hw_error::map_hw_error(&e);
        let p = &cfg.pins;
        bump_hardware::HardwareRangeSensor::new(p.sensor_a_trigger, p.sensor_a_echo)
            .map_err(hw)
            .wrap_err("open sensor A")?;
        bump_hardware::HardwareRangeSensor::new(p.sensor_b_trigger, p.sensor_b_echo)
            .map_err(hw)
            .wrap_err("open sensor B")?;
        bump_hardware::HardwareServo::new(p.servo)
            .map_err(hw)
            .wrap_err("open servo")?;
    }

    tracing::info!(name = id.name(), role = ?cfg.node.role, "self-check passed");
    if json {
        println!(
            "{}",
            serde_json::json!({ "status": "ok", "name": id.name(), "hardware": cfg!(feature = "hardware") })
        );
    } else {
        println!("self-check ok");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0b09", vec![0x0b, 0x09])]
    #[case("0x0B09", vec![0x0b, 0x09])]
    #[case(" 0b 09\n", vec![0x0b, 0x09])]
    #[case("0b:09", vec![0x0b, 0x09])]
    fn accepts_common_spellings(#[case] text: &str, #[case] expected: Vec<u8>) {
        assert_eq!(parse_hex(text).unwrap(), expected);
    }

    #[rstest]
    #[case("0b0")]
    #[case("zz")]
    fn rejects_malformed(#[case] text: &str) {
        assert!(parse_hex(text).unwrap_err().to_string().contains("invalid hex"));
    }
}
