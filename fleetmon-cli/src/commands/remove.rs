//! Remove host command.

use std::path::Path;

use crate::error::CliError;
use crate::util::{create_config_manager, find_host};

/// Remove host command handler
pub fn cmd_remove(config_path: Option<&Path>, address_or_name: &str) -> Result<(), CliError> {
    let config_manager = create_config_manager(config_path)?;

    let mut hosts = config_manager
        .load_hosts()
        .map_err(|e| CliError::Config(format!("Failed to load hosts: {e}")))?;

    let host = find_host(&hosts, address_or_name)?;
    let address = host.address.clone();
    let name = host.name.clone();

    hosts.retain(|h| h.address != address);

    config_manager
        .save_hosts(&hosts)
        .map_err(|e| CliError::Config(format!("Failed to save hosts: {e}")))?;

    println!("Removed host '{name}' ({address})");

    Ok(())
}
