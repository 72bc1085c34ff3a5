//! `FleetMon` CLI - scan networks for SSH hosts and monitor them
//!
//! Provides commands for scanning address ranges, managing the saved host
//! list, testing a session to one host, and polling metrics across the
//! whole fleet.

mod cli;
mod commands;
mod error;
mod util;

use clap::Parser;
use cli::Cli;
use fleetmon_core::tracing::{TracingConfig, TracingLevel, TracingOutput, init_tracing};

fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    init_logging(&cli);

    let result = commands::dispatch(config_path, cli.command);

    if let Err(e) = result {
        tracing::debug!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

/// Stderr logging at warn, raised by `-v`. A log file from the settings
/// takes the configured level instead.
fn init_logging(cli: &Cli) {
    let settings = util::create_config_manager(cli.config.as_deref())
        .ok()
        .and_then(|config| config.load_settings().ok())
        .unwrap_or_default();

    let config = match settings.logging.file {
        Some(path) => TracingConfig::new()
            .with_level(settings.logging.level.raised_by(cli.verbose))
            .with_output(TracingOutput::File {
                path: shellexpand::tilde(&path).into_owned().into(),
            }),
        None if cli.quiet => TracingConfig::new().with_level(TracingLevel::Error),
        None => TracingConfig::new().with_level(TracingLevel::Warn.raised_by(cli.verbose)),
    };

    if let Err(e) = init_tracing(&config) {
        eprintln!("Warning: logging disabled: {e}");
    }
}
