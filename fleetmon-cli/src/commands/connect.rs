//! Connect command: open one session, verify it and print system info.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use fleetmon_core::monitoring::SystemInfo;
use fleetmon_core::registry::FleetRegistry;
use fleetmon_core::session::RetryConfig;

use crate::error::CliError;
use crate::util::{create_config_manager, credentials_for, find_host, load_all, runtime, ssh_session_manager};

/// Connect command handler
pub fn cmd_connect(
    config_path: Option<&Path>,
    address_or_name: &str,
    force_password: bool,
) -> Result<(), CliError> {
    let config_manager = create_config_manager(config_path)?;
    let (mut settings, hosts) = load_all(&config_manager)?;

    if hosts.is_empty() {
        return Err(CliError::HostNotFound("No hosts configured".to_string()));
    }

    let host = find_host(&hosts, address_or_name)?.clone();
    let credentials = credentials_for(&host, force_password)?;

    // One attempt; the operator sees the failure instead of a retry loop
    settings.retry = RetryConfig::no_retry();

    let registry = Arc::new(FleetRegistry::new(settings.history.capacity));
    registry.insert(host.clone());
    let manager = ssh_session_manager(&settings, Arc::clone(&registry));

    println!(
        "Connecting to '{}' ({}@{}:{})...",
        host.name, credentials.username, host.address, host.port
    );

    let rt = runtime()?;
    rt.block_on(async {
        let started = Instant::now();
        let result = manager.connect(&host.address, credentials).await;
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                println!("✓ Connected in {}ms", elapsed.as_millis());
                if let Some(info) = registry.get(&host.address).and_then(|h| h.system_info) {
                    println!("{}", format_system_info(&info));
                }
                manager.disconnect(&host.address).await;
                Ok(())
            }
            Err(e) => {
                println!("✗ Connection failed: {e}");
                Err(CliError::from(e))
            }
        }
    })
}

/// Formats system information as aligned key/value lines
#[must_use]
pub fn format_system_info(info: &SystemInfo) -> String {
    let mut output = String::new();
    let rows = [
        ("Hostname", info.hostname.clone()),
        ("OS", info.distro_name.clone()),
        ("Kernel", info.kernel_version.clone()),
        ("Arch", info.arch.clone()),
        (
            "CPU",
            format!("{} cores / {} threads", info.cpu_cores, info.cpu_threads),
        ),
        ("Memory", format!("{:.1} GiB", info.total_ram_kib as f64 / 1_048_576.0)),
        ("Uptime", format_uptime(info.uptime_secs)),
    ];
    for (label, value) in rows {
        let _ = writeln!(output, "  {label:<9} {value}");
    }
    output.trim_end().to_string()
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}
