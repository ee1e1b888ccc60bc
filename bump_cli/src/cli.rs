//! CLI argument definitions and shared statics.

use bump_core::CommandCode;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "bump", version, about = "Speed bump controller CLI")]
pub struct Cli {
    /// Path to config TOML (defaults apply when omitted)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit JSON lines instead of human-readable text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace). Precedence: RUST_LOG, this
    /// flag, `[logging] level` from the config, then "info"
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CommandArg {
    Idle,
    Deploy,
    Retract,
}

impl From<CommandArg> for CommandCode {
    fn from(c: CommandArg) -> Self {
        match c {
            CommandArg::Idle => CommandCode::Idle,
            CommandArg::Deploy => CommandCode::Deploy,
            CommandArg::Retract => CommandCode::Retract,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a sensor node and an actuator node in-process over a simulated radio
    Simulate {
        /// Sensor trace CSV (t_ms,sensor_a_cm,sensor_b_cm)
        #[arg(long, value_name = "FILE", conflicts_with = "vehicles")]
        trace: Option<PathBuf>,
        /// Synthetic vehicle speed in cm/s; repeat for several vehicles
        #[arg(long = "vehicle", value_name = "CM_S")]
        vehicles: Vec<f32>,
        /// How long to run before printing the summary
        #[arg(long, value_name = "MS", default_value_t = 3000)]
        duration_ms: u64,
    },
    /// Run a sensor node; stdin lines "<topic> <body>" are remote messages
    Sensor {
        /// Sensor trace CSV for the simulated sensors
        #[arg(long, value_name = "FILE")]
        trace: Option<PathBuf>,
        /// Stop after this long (runs until Ctrl-C otherwise)
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
    },
    /// Run an actuator node; stdin lines are hex advertisement frames
    Actuator {
        /// Stop after this long (runs until Ctrl-C otherwise)
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
    },
    /// Print the advertisement frame for a command
    Encode {
        #[arg(value_enum)]
        command: CommandArg,
    },
    /// Decode a hex advertisement frame
    Decode {
        /// 18 bytes as hex, e.g. 0b0953706565642042756d7005ff00000002
        frame: String,
    },
    /// Quick health check (config, codec, devices when built with hardware)
    SelfCheck,
}
