//! CLI argument parsing types using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// FleetMon command-line interface: discover hosts and monitor them over SSH
#[derive(Parser)]
#[command(name = "fleetmon")]
#[command(author, version, about = "Fleet discovery and multi-host monitoring")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration directory
    #[arg(short, long, global = true, env = "FLEETMON_CONFIG_DIR")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Probe address ranges for live hosts
    #[command(about = "Scan address ranges for live SSH hosts")]
    Scan {
        /// Ranges to scan: CIDR (10.0.0.0/24), dash (10.0.0.5-9) or single
        /// addresses. Defaults to `scan.default_ranges` from the config
        ranges: Vec<String>,

        /// Per-probe timeout in milliseconds
        #[arg(short, long = "timeout-ms", value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Probes in flight at once
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Port to probe
        #[arg(short, long)]
        port: Option<u16>,

        /// Use ICMP echo instead of a TCP connect
        #[arg(long)]
        ping: bool,

        /// Add live hosts to the saved host list
        #[arg(long)]
        save: bool,
    },

    /// List saved hosts
    #[command(about = "List all saved hosts")]
    List {
        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Add a host manually
    #[command(about = "Add a host to the saved host list")]
    Add {
        /// Host address
        #[arg(short = 'H', long)]
        host: String,

        /// Display name (defaults to the remote hostname after connecting)
        #[arg(short, long)]
        name: Option<String>,

        /// Login user
        #[arg(short, long)]
        user: String,

        /// Path to a private key file
        #[arg(short, long, conflicts_with = "password_auth")]
        key: Option<PathBuf>,

        /// Authenticate with a password prompted at connect time
        #[arg(long)]
        password_auth: bool,

        /// SSH port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Remove a saved host
    #[command(about = "Remove a host by address or name")]
    Remove {
        /// Host address or name
        host: String,
    },

    /// Connect to one host and print its system information
    #[command(about = "Test the SSH session to a saved host")]
    Connect {
        /// Host address or name
        host: String,

        /// Prompt for a password instead of the saved method
        #[arg(long)]
        password: bool,
    },

    /// Connect to every saved host and poll metrics
    #[command(about = "Monitor saved hosts until interrupted")]
    Monitor {
        /// Seconds between polls (defaults to `poll.interval_secs`)
        #[arg(short, long, value_name = "SECS")]
        interval: Option<u64>,

        /// Stop after this many polls
        #[arg(short = 'n', long)]
        ticks: Option<u64>,

        /// Print each snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    #[command(about = "Generate shell completion scripts")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON array
    Json,
}
