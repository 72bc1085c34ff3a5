//! Scan command: probe address ranges and report live hosts.

use std::path::Path;
use std::time::Duration;

use fleetmon_core::cancel::CancellationToken;
use fleetmon_core::discovery::{DiscoveredHost, ProbeMechanism, Prober, parse_ranges};
use fleetmon_core::models::{DiscoveryOrigin, Host};
use futures::StreamExt;

use crate::error::CliError;
use crate::util::{create_config_manager, load_all, runtime};

/// Parameters for the `scan` command
pub struct ScanParams<'a> {
    pub ranges: &'a [String],
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub port: Option<u16>,
    pub ping: bool,
    pub save: bool,
}

/// Scan command handler
pub fn cmd_scan(config_path: Option<&Path>, params: ScanParams<'_>) -> Result<(), CliError> {
    let config_manager = create_config_manager(config_path)?;
    let (settings, mut hosts) = load_all(&config_manager)?;

    let inputs: &[String] = if params.ranges.is_empty() {
        &settings.scan.default_ranges
    } else {
        params.ranges
    };
    let ranges = parse_ranges(inputs)?;

    let mut options = settings.scan_options();
    if let Some(ms) = params.timeout_ms {
        if ms == 0 {
            return Err(CliError::InvalidInput("Timeout must be non-zero".into()));
        }
        options.probe_timeout = Duration::from_millis(ms);
    }
    if let Some(concurrency) = params.concurrency {
        if concurrency == 0 {
            return Err(CliError::InvalidInput("Concurrency must be non-zero".into()));
        }
        options.max_concurrency = concurrency;
    }
    let mechanism = if params.ping {
        ProbeMechanism::Ping
    } else {
        settings.scan.mechanism
    };
    let port = params.port.unwrap_or(settings.scan.port);

    let prober = Prober::new(mechanism.build(port, settings.scan.read_banner));

    let rt = runtime()?;
    let found = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, waiting for in-flight probes...");
                on_interrupt.cancel();
            }
        });

        let mut stream = prober.scan_with_cancel(ranges, options, cancel).await?;
        let mut found = Vec::new();
        while let Some(host) = stream.next().await {
            println!("{}", format_found(&host));
            found.push(host);
        }
        let summary = stream.finish().await;

        println!(
            "Scanned {} addresses in {:.1}s: {} live, {} probe errors{}",
            summary.attempted,
            summary.elapsed.as_secs_f64(),
            summary.live,
            summary.failed,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        Ok::<_, CliError>(found)
    })?;

    if params.save {
        let added = merge_scanned(&mut hosts, &found, port);
        config_manager
            .save_hosts(&hosts)
            .map_err(|e| CliError::Config(format!("Failed to save hosts: {e}")))?;
        println!("Saved {added} new host(s)");
    }

    Ok(())
}

/// One output line per live host
fn format_found(host: &DiscoveredHost) -> String {
    let latency = host.latency.as_millis();
    match &host.banner {
        Some(banner) => format!("  ✓ {:<15}  {latency:>5}ms  {banner}", host.address),
        None => format!("  ✓ {:<15}  {latency:>5}ms", host.address),
    }
}

/// Appends scanned hosts that are not already saved; returns how many were
/// added
pub fn merge_scanned(hosts: &mut Vec<Host>, found: &[DiscoveredHost], port: u16) -> usize {
    let mut added = 0;
    for discovered in found {
        let address = discovered.address.to_string();
        if hosts.iter().any(|h| h.address == address) {
            continue;
        }
        hosts.push(Host::new(address, DiscoveryOrigin::Scanned).with_port(port));
        added += 1;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn discovered(last: u8) -> DiscoveredHost {
        DiscoveredHost {
            address: Ipv4Addr::new(10, 0, 0, last),
            banner: None,
            latency: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_merge_skips_known_addresses() {
        let mut hosts = vec![Host::new("10.0.0.1", DiscoveryOrigin::Manual).with_name("db")];
        let added = merge_scanned(&mut hosts, &[discovered(1), discovered(2)], 22);

        assert_eq!(added, 1);
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].origin, DiscoveryOrigin::Manual);
        assert_eq!(hosts[0].name, "db");
        assert_eq!(hosts[1].address, "10.0.0.2");
        assert_eq!(hosts[1].origin, DiscoveryOrigin::Scanned);
    }

    #[test]
    fn test_format_found_includes_banner() {
        let mut host = discovered(9);
        host.banner = Some("SSH-2.0-OpenSSH_9.6".into());
        let line = format_found(&host);
        assert!(line.contains("10.0.0.9"));
        assert!(line.ends_with("SSH-2.0-OpenSSH_9.6"));
    }
}
