//! List saved hosts command.

use std::fmt::Write as _;
use std::path::Path;

use fleetmon_core::models::{AuthMethod, Host};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::create_config_manager;

/// List hosts command handler
pub fn cmd_list(config_path: Option<&Path>, format: OutputFormat) -> Result<(), CliError> {
    let config_manager = create_config_manager(config_path)?;

    let hosts = config_manager
        .load_hosts()
        .map_err(|e| CliError::Config(format!("Failed to load hosts: {e}")))?;

    match format {
        OutputFormat::Table => println!("{}", format_table(&hosts)),
        OutputFormat::Json => println!("{}", format_json(&hosts)?),
    }

    Ok(())
}

/// Short label for a host's auth method
fn auth_label(auth: &AuthMethod) -> &'static str {
    match auth {
        AuthMethod::Password => "password",
        AuthMethod::KeyFile { .. } => "key",
        AuthMethod::Agent => "agent",
    }
}

/// Format hosts as a table string
#[must_use]
pub fn format_table(hosts: &[Host]) -> String {
    if hosts.is_empty() {
        return "No hosts found.".to_string();
    }

    let mut output = String::new();

    let name_width = hosts.iter().map(|h| h.name.len()).max().unwrap_or(4).max(4);
    let addr_width = hosts
        .iter()
        .map(|h| h.address.len())
        .max()
        .unwrap_or(7)
        .max(7);
    let user_width = hosts
        .iter()
        .map(|h| h.credentials.username.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let _ = writeln!(
        output,
        "{:<name_width$}  {:<addr_width$}  {:<5}  {:<user_width$}  {:<8}  ORIGIN",
        "NAME", "ADDRESS", "PORT", "USER", "AUTH"
    );
    let _ = writeln!(
        output,
        "{:-<name_width$}  {:-<addr_width$}  {:-<5}  {:-<user_width$}  {:-<8}  ------",
        "", "", "", "", ""
    );

    for host in hosts {
        let _ = writeln!(
            output,
            "{:<name_width$}  {:<addr_width$}  {:<5}  {:<user_width$}  {:<8}  {}",
            host.name,
            host.address,
            host.port,
            host.credentials.username,
            auth_label(&host.credentials.auth),
            host.origin
        );
    }

    output.trim_end().to_string()
}

/// Format hosts as JSON string
///
/// # Errors
///
/// Returns `CliError::Config` if JSON serialization fails.
pub fn format_json(hosts: &[Host]) -> Result<String, CliError> {
    let output: Vec<HostOutput> = hosts.iter().map(HostOutput::from).collect();
    serde_json::to_string_pretty(&output)
        .map_err(|e| CliError::Config(format!("Failed to serialize to JSON: {e}")))
}

/// Simplified host output for CLI
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HostOutput {
    pub address: String,
    pub name: String,
    pub port: u16,
    pub username: String,
    pub auth: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    pub origin: String,
}

impl From<&Host> for HostOutput {
    fn from(host: &Host) -> Self {
        let key_path = match &host.credentials.auth {
            AuthMethod::KeyFile { path } => Some(path.display().to_string()),
            AuthMethod::Password | AuthMethod::Agent => None,
        };
        Self {
            address: host.address.clone(),
            name: host.name.clone(),
            port: host.port,
            username: host.credentials.username.clone(),
            auth: auth_label(&host.credentials.auth).to_string(),
            key_path,
            origin: host.origin.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmon_core::models::{CredentialRef, DiscoveryOrigin};

    fn sample_hosts() -> Vec<Host> {
        vec![
            Host::new("10.0.0.1", DiscoveryOrigin::Manual)
                .with_name("database")
                .with_credentials(CredentialRef::key_file("ops", "/home/ops/.ssh/id_ed25519")),
            Host::new("10.0.0.2", DiscoveryOrigin::Scanned).with_port(2222),
        ]
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(format_table(&[]), "No hosts found.");
    }

    #[test]
    fn test_table_has_header_and_rows() {
        let table = format_table(&sample_hosts());
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[2].contains("database"));
        assert!(lines[2].contains("key"));
        assert!(lines[3].contains("2222"));
        assert!(lines[3].ends_with("scanned"));
    }

    #[test]
    fn test_json_output() {
        let json = format_json(&sample_hosts()).unwrap();
        let parsed: Vec<HostOutput> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].auth, "key");
        assert_eq!(
            parsed[0].key_path.as_deref(),
            Some("/home/ops/.ssh/id_ed25519")
        );
        assert_eq!(parsed[1].origin, "scanned");
        assert!(parsed[1].key_path.is_none());
    }
}
