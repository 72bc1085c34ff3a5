//! Monitor command: connect every saved host and poll metrics.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fleetmon_core::cancel::CancellationToken;
use fleetmon_core::models::{Credentials, Host};
use fleetmon_core::poller::{Poller, TickReport};
use fleetmon_core::registry::{FleetRegistry, FleetSnapshot};

use crate::error::CliError;
use crate::util::{create_config_manager, credentials_for, load_all, runtime, ssh_session_manager};

/// Monitor command handler
pub fn cmd_monitor(
    config_path: Option<&Path>,
    interval: Option<u64>,
    ticks: Option<u64>,
    json: bool,
) -> Result<(), CliError> {
    let config_manager = create_config_manager(config_path)?;
    let (settings, hosts) = load_all(&config_manager)?;
    let (hosts, duplicates) = dedupe_hosts(hosts);
    for address in &duplicates {
        tracing::warn!(host = %address, "Duplicate host entry ignored");
        eprintln!("Warning: {address} is listed more than once; using the first entry");
    }

    if hosts.is_empty() {
        return Err(CliError::HostNotFound("No hosts configured".to_string()));
    }

    let mut poll_config = settings.poll_config();
    if let Some(secs) = interval {
        if secs == 0 {
            return Err(CliError::InvalidInput("Interval must be non-zero".into()));
        }
        poll_config.interval = Duration::from_secs(secs);
    }

    // Prompt before the runtime starts so password prompts do not interleave
    // with poll output
    let mut logins: Vec<(String, Credentials)> = Vec::with_capacity(hosts.len());
    for host in &hosts {
        logins.push((host.address.clone(), credentials_for(host, false)?));
    }

    let registry = Arc::new(FleetRegistry::new(settings.history.capacity));
    for host in hosts {
        let address = host.address.clone();
        if !registry.insert(host) {
            tracing::warn!(host = %address, "Host already registered");
        }
    }
    let manager = ssh_session_manager(&settings, Arc::clone(&registry));

    let rt = runtime()?;
    rt.block_on(async {
        let connects = logins.into_iter().map(|(address, credentials)| {
            let manager = manager.clone();
            async move {
                let result = manager.connect(&address, credentials).await;
                (address, result)
            }
        });
        for (address, result) in futures::future::join_all(connects).await {
            match result {
                Ok(()) => eprintln!("✓ {address} connected"),
                Err(e) => eprintln!("✗ {address}: {e}"),
            }
        }

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let poller =
            Poller::new(manager.clone(), poll_config).with_alerts(settings.alert_thresholds());
        let stop = cancel.clone();
        let mut done = 0_u64;
        poller
            .run_with(cancel, |report| {
                let snapshot = registry.snapshot();
                if json {
                    match format_json(&snapshot) {
                        Ok(text) => println!("{text}"),
                        Err(e) => eprintln!("Error: {e}"),
                    }
                } else {
                    println!("{}", format_tick(report, &snapshot));
                }
                done += 1;
                if ticks.is_some_and(|limit| done >= limit) {
                    stop.cancel();
                }
            })
            .await;

        manager.disconnect_all().await;
    });

    Ok(())
}

/// Keeps the first entry per address; returns the kept hosts and the
/// addresses that were listed again
#[must_use]
pub fn dedupe_hosts(hosts: Vec<Host>) -> (Vec<Host>, Vec<String>) {
    let mut seen = HashSet::with_capacity(hosts.len());
    let mut duplicates = Vec::new();
    let mut kept = Vec::with_capacity(hosts.len());
    for host in hosts {
        if seen.insert(host.address.clone()) {
            kept.push(host);
        } else if !duplicates.contains(&host.address) {
            duplicates.push(host.address);
        }
    }
    (kept, duplicates)
}

fn percent(value: Option<f32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}%"))
}

/// Formats one poll cycle as a table of hosts
#[must_use]
pub fn format_tick(report: &TickReport, snapshot: &FleetSnapshot) -> String {
    let mut output = String::new();
    let summary = snapshot.summary();
    let _ = writeln!(
        output,
        "[{}] polled {} in {}ms: {} recorded, {} timed out, {} failed, {} alerts | {}/{} connected",
        snapshot.taken_at.format("%H:%M:%S"),
        report.polled,
        report.elapsed.as_millis(),
        report.recorded,
        report.timed_out,
        report.failed,
        report.alerts,
        summary.connected,
        summary.total
    );

    let addr_width = snapshot
        .hosts
        .iter()
        .map(|h| h.host.address.len())
        .max()
        .unwrap_or(7)
        .max(7);
    let _ = writeln!(
        output,
        "{:<addr_width$}  {:<12}  {:>6}  {:>6}  {:>6}  {:>5}",
        "ADDRESS", "STATE", "CPU", "MEM", "DISK", "LOAD"
    );

    for entry in &snapshot.hosts {
        let sample = entry.latest.as_ref();
        let load = sample
            .and_then(|s| s.load_average.as_ref())
            .map_or_else(|| "-".to_string(), |l| format!("{:.2}", l.one));
        let _ = write!(
            output,
            "{:<addr_width$}  {:<12}  {:>6}  {:>6}  {:>6}  {:>5}",
            entry.host.address,
            entry.host.state.to_string(),
            percent(sample.and_then(|s| s.cpu_percent)),
            percent(sample.and_then(fleetmon_core::Sample::memory_percent)),
            percent(sample.and_then(fleetmon_core::Sample::disk_percent)),
            load
        );
        if let Some(error) = &entry.host.last_error {
            let _ = write!(output, "  {error}");
        }
        output.push('\n');
        for alert in entry.current_alerts() {
            let _ = writeln!(output, "  ALERT: {}", alert.message());
        }
    }

    output.trim_end().to_string()
}

/// Formats the snapshot as JSON, without the per-host history
///
/// # Errors
///
/// Returns `CliError::Config` if JSON serialization fails.
pub fn format_json(snapshot: &FleetSnapshot) -> Result<String, CliError> {
    let mut latest_only = snapshot.clone();
    for entry in &mut latest_only.hosts {
        entry.history.clear();
    }
    serde_json::to_string(&latest_only)
        .map_err(|e| CliError::Config(format!("Failed to serialize to JSON: {e}")))
}
