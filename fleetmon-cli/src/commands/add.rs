//! Add host command.

use std::path::Path;

use fleetmon_core::models::{CredentialRef, DiscoveryOrigin, Host};

use crate::error::CliError;
use crate::util::create_config_manager;

/// Parameters for the `add` command
pub struct AddParams<'a> {
    pub host: &'a str,
    pub name: Option<&'a str>,
    pub user: &'a str,
    pub key: Option<&'a Path>,
    pub password_auth: bool,
    pub port: Option<u16>,
}

/// Add host command handler
pub fn cmd_add(config_path: Option<&Path>, params: AddParams<'_>) -> Result<(), CliError> {
    let host = build_host(&params)?;

    let config_manager = create_config_manager(config_path)?;
    let mut hosts = config_manager
        .load_hosts()
        .map_err(|e| CliError::Config(format!("Failed to load hosts: {e}")))?;

    if hosts.iter().any(|h| h.address == host.address) {
        return Err(CliError::InvalidInput(format!(
            "Host '{}' is already saved",
            host.address
        )));
    }

    println!(
        "Added host '{}' ({}@{}:{})",
        host.name, host.credentials.username, host.address, host.port
    );
    hosts.push(host);

    config_manager
        .save_hosts(&hosts)
        .map_err(|e| CliError::Config(format!("Failed to save hosts: {e}")))?;

    Ok(())
}

/// Validates the arguments and builds a manual host
pub fn build_host(params: &AddParams<'_>) -> Result<Host, CliError> {
    let address = params.host.trim();
    if address.is_empty() || address.contains(char::is_whitespace) {
        return Err(CliError::InvalidInput(format!(
            "Invalid host address '{}'",
            params.host
        )));
    }
    let user = params.user.trim();
    if user.is_empty() {
        return Err(CliError::InvalidInput("User must not be empty".into()));
    }
    if params.port == Some(0) {
        return Err(CliError::InvalidInput("Port must be non-zero".into()));
    }

    let credentials = match (params.key, params.password_auth) {
        (Some(key), _) => CredentialRef::key_file(user, key),
        (None, true) => CredentialRef::password(user),
        (None, false) => CredentialRef::agent(user),
    };

    let mut host = Host::new(address, DiscoveryOrigin::Manual).with_credentials(credentials);
    if let Some(name) = params.name.map(str::trim).filter(|n| !n.is_empty()) {
        host = host.with_name(name);
    }
    if let Some(port) = params.port {
        host = host.with_port(port);
    }
    Ok(host)
}
