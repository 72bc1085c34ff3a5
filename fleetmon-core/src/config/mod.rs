//! Configuration management for FleetMon
//!
//! `ConfigManager` loads and saves `config.toml` (settings) and
//! `hosts.toml` (the saved fleet) in TOML format.

mod manager;
pub mod settings;

pub use manager::{CONFIG_DIR_ENV, ConfigManager, HOSTS_FILE, SETTINGS_FILE};
pub use settings::{
    AlertSettings, FleetSettings, HistorySettings, LoggingSettings, PollSettings, ScanSettings,
    SessionSettings,
};
