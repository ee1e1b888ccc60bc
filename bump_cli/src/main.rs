use clap::Parser;
use eyre::WrapErr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod cli;
mod codec_cmd;
mod error_fmt;
mod node_run;
mod output;
mod simulate;

use bump_core::BumpError;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    if !cli.json {
        // Colored reports for panics and eyre errors; plain JSON stays untouched
        let _ = color_eyre::install();
    }

    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging);
    tracing::debug!(role = ?cfg.node.role, device = %cfg.node.device_id, "config loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        // Only one handler may be installed per process
        let _ = ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        });
    }

    match cli.cmd {
        Commands::Simulate {
            trace,
            vehicles,
            duration_ms,
        } => simulate::run(&cfg, trace.as_deref(), &vehicles, duration_ms, cli.json, &shutdown),
        Commands::Sensor { trace, duration_ms } => {
            node_run::run_sensor(&cfg, trace.as_deref(), duration_ms, cli.json, &shutdown)
        }
        Commands::Actuator { duration_ms } => {
            node_run::run_actuator(&cfg, duration_ms, cli.json, &shutdown)
        }
        Commands::Encode { command } => codec_cmd::encode(&cfg, command.into(), cli.json),
        Commands::Decode { frame } => codec_cmd::decode(&cfg, &frame, cli.json),
        Commands::SelfCheck => codec_cmd::self_check(&cfg, cli.json),
    }
}

/// Read, parse and validate the config file; built-in defaults when no path is given.
fn load_config(path: Option<&Path>) -> eyre::Result<bump_config::Config> {
    let cfg = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .map_err(|e| BumpError::Config(format!("read {}: {e}", p.display())))?;
            bump_config::load_toml(&text)
                .map_err(|e| BumpError::Config(format!("parse {}: {}", p.display(), e)))?
        }
        None => bump_config::Config::default(),
    };
    cfg.validate()
        .map_err(|e| BumpError::Config(e.to_string()))
        .wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// RUST_LOG wins over the flag, the flag over the config file.
fn effective_level<'a>(flag: Option<&'a str>, configured: Option<&'a str>) -> &'a str {
    flag.or(configured).unwrap_or("info")
}

fn init_tracing(json: bool, flag_level: Option<&str>, logging: &bump_config::Logging) {
    use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

    let level = effective_level(flag_level, logging.level.as_deref());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    // Console logs go to stderr so stdout carries only command output
    if json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact()
                .boxed(),
        );
    }

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bump.log".to_string());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
        );
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::effective_level;
    use rstest::rstest;

    #[rstest]
    #[case(Some("debug"), Some("warn"), "debug")]
    #[case(None, Some("warn"), "warn")]
    #[case(None, None, "info")]
    #[case(Some("error"), None, "error")]
    fn log_level_flag_beats_config(
        #[case] flag: Option<&str>,
        #[case] configured: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(effective_level(flag, configured), expected);
    }
}
