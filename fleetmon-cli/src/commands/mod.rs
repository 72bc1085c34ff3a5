//! Command handler modules for the CLI.

mod add;
mod completions;
mod connect;
mod list;
mod monitor;
mod remove;
mod scan;

use std::path::Path;

use crate::cli::Commands;
use crate::error::CliError;

/// Dispatch a CLI command to the appropriate handler.
pub fn dispatch(config_path: Option<&Path>, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Scan {
            ranges,
            timeout_ms,
            concurrency,
            port,
            ping,
            save,
        } => scan::cmd_scan(
            config_path,
            scan::ScanParams {
                ranges: &ranges,
                timeout_ms,
                concurrency,
                port,
                ping,
                save,
            },
        ),
        Commands::List { format } => list::cmd_list(config_path, format),
        Commands::Add {
            host,
            name,
            user,
            key,
            password_auth,
            port,
        } => add::cmd_add(
            config_path,
            add::AddParams {
                host: &host,
                name: name.as_deref(),
                user: &user,
                key: key.as_deref(),
                password_auth,
                port,
            },
        ),
        Commands::Remove { host } => remove::cmd_remove(config_path, &host),
        Commands::Connect { host, password } => {
            connect::cmd_connect(config_path, &host, password)
        }
        Commands::Monitor {
            interval,
            ticks,
            json,
        } => monitor::cmd_monitor(config_path, interval, ticks, json),
        Commands::Completions { shell } => completions::cmd_completions(shell),
    }
}
