//! Shared utility functions used across command modules.

use std::path::Path;
use std::sync::Arc;

use fleetmon_core::config::{ConfigManager, FleetSettings};
use fleetmon_core::models::{Credentials, Host};
use fleetmon_core::session::{SessionManager, SshTransport};
use fleetmon_core::registry::FleetRegistry;
use secrecy::SecretString;

use crate::error::CliError;

/// Creates a `ConfigManager` using the optional custom config directory
/// from CLI args.
pub fn create_config_manager(config_path: Option<&Path>) -> Result<ConfigManager, CliError> {
    match config_path {
        Some(path) => Ok(ConfigManager::with_config_dir(path.to_path_buf())),
        None => ConfigManager::new()
            .map_err(|e| CliError::Config(format!("Failed to initialize config: {e}"))),
    }
}

/// Loads settings and saved hosts
pub fn load_all(config: &ConfigManager) -> Result<(FleetSettings, Vec<Host>), CliError> {
    let settings = config
        .load_settings()
        .map_err(|e| CliError::Config(format!("Failed to load settings: {e}")))?;
    let hosts = config
        .load_hosts()
        .map_err(|e| CliError::Config(format!("Failed to load hosts: {e}")))?;
    Ok((settings, hosts))
}

/// Builds a multi-threaded runtime for async commands
pub fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Config(format!("Failed to create async runtime: {e}")))
}

/// Session manager over `registry` using the system OpenSSH client
pub fn ssh_session_manager(settings: &FleetSettings, registry: Arc<FleetRegistry>) -> SessionManager {
    let transport = SshTransport::default().with_host_key_policy(&settings.session.host_key_policy);
    SessionManager::new(registry, Arc::new(transport), settings.session_config())
}

/// Find a host by address, then by exact or case-insensitive name
pub fn find_host<'a>(hosts: &'a [Host], address_or_name: &str) -> Result<&'a Host, CliError> {
    if let Some(host) = hosts.iter().find(|h| h.address == address_or_name) {
        return Ok(host);
    }

    if let Some(host) = hosts.iter().find(|h| h.name == address_or_name) {
        return Ok(host);
    }

    let matches: Vec<_> = hosts
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case(address_or_name))
        .collect();

    match matches.as_slice() {
        [] => Err(CliError::HostNotFound(address_or_name.to_string())),
        [host] => Ok(host),
        _ => {
            let names: Vec<_> = matches.iter().map(|h| h.address.as_str()).collect();
            Err(CliError::InvalidInput(format!(
                "Ambiguous host name '{}'. Matches: {}",
                address_or_name,
                names.join(", ")
            )))
        }
    }
}

/// Resolves in-memory credentials for `host`, prompting for a password
/// when its saved method needs one or `force_password` is set.
pub fn credentials_for(host: &Host, force_password: bool) -> Result<Credentials, CliError> {
    let username = host.credentials.username.clone();
    if force_password || host.credentials.needs_password() {
        let prompt = format!("Password for {}@{}: ", username, host.address);
        let password = rpassword::prompt_password(prompt)?;
        return Ok(Credentials::with_password(username, SecretString::from(password)));
    }

    Credentials::from_ref(&host.credentials, None)
        .ok_or_else(|| CliError::Config(format!("No usable credentials for {}", host.address)))
}
