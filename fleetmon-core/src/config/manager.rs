//! Loading and saving of `config.toml` and `hosts.toml`

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use super::settings::FleetSettings;
use crate::error::{ConfigError, ConfigResult};
use crate::models::{Host, SavedHost};
use crate::trace_operation;
use crate::tracing::span_names;

/// Settings file name
pub const SETTINGS_FILE: &str = "config.toml";

/// Host list file name
pub const HOSTS_FILE: &str = "hosts.toml";

/// Directory name under the platform config dir
const APP_DIR: &str = "fleetmon";

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "FLEETMON_CONFIG_DIR";

#[derive(Debug, Default, Serialize, Deserialize)]
struct HostsFile {
    #[serde(default)]
    hosts: Vec<SavedHost>,
}

/// Reads and writes configuration files in one directory
///
/// Writes go to a temporary file in the same directory first and are
/// renamed into place, so a crash never leaves a half-written file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Manager for the default directory: `$FLEETMON_CONFIG_DIR`, else
    /// `<platform config dir>/fleetmon`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if no directory can be found.
    pub fn new() -> ConfigResult<Self> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
            && !dir.trim().is_empty()
        {
            let expanded = shellexpand::tilde(dir.trim()).into_owned();
            return Ok(Self::with_config_dir(expanded));
        }
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::with_config_dir(base.join(APP_DIR)))
    }

    /// Manager for an explicit directory
    #[must_use]
    pub fn with_config_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: dir.into(),
        }
    }

    /// The directory holding the files
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of `config.toml`
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    /// Path of `hosts.toml`
    #[must_use]
    pub fn hosts_path(&self) -> PathBuf {
        self.config_dir.join(HOSTS_FILE)
    }

    /// Loads and validates settings; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, malformed, or invalid.
    pub fn load_settings(&self) -> ConfigResult<FleetSettings> {
        let _span = trace_operation!(span_names::CONFIG_LOAD, file = SETTINGS_FILE).entered();
        let mut settings: FleetSettings = self.read_toml(&self.settings_path())?.unwrap_or_default();
        settings.validate()?;
        Ok(settings)
    }

    /// Writes settings to `config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_settings(&self, settings: &FleetSettings) -> ConfigResult<()> {
        let _span = trace_operation!(span_names::CONFIG_SAVE, file = SETTINGS_FILE).entered();
        self.write_toml(&self.settings_path(), settings)
    }

    /// Loads the saved hosts; a missing file yields an empty list.
    ///
    /// Loaded hosts start `Discovered`; runtime state is never persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or malformed.
    pub fn load_hosts(&self) -> ConfigResult<Vec<Host>> {
        let _span = trace_operation!(span_names::CONFIG_LOAD, file = HOSTS_FILE).entered();
        let file: HostsFile = self.read_toml(&self.hosts_path())?.unwrap_or_default();
        tracing::debug!(item_count = file.hosts.len(), "Hosts loaded");
        Ok(file.hosts.into_iter().map(Host::from).collect())
    }

    /// Saves the persistent part of each host to `hosts.toml`.
    ///
    /// Only addresses, names, ports, credential references and origins
    /// are written. Passwords are never part of a [`Host`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_hosts(&self, hosts: &[Host]) -> ConfigResult<()> {
        let _span = trace_operation!(span_names::CONFIG_SAVE, file = HOSTS_FILE).entered();
        let file = HostsFile {
            hosts: hosts.iter().map(SavedHost::from).collect(),
        };
        self.write_toml(&self.hosts_path(), &file)?;
        tracing::debug!(item_count = file.hosts.len(), "Hosts saved");
        Ok(())
    }

    fn read_toml<T: DeserializeOwned>(&self, path: &Path) -> ConfigResult<Option<T>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        toml::from_str(&text)
            .map(Some)
            .map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn write_toml<T: Serialize>(&self, path: &Path, value: &T) -> ConfigResult<()> {
        let text = toml::to_string_pretty(value).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };

        fs::create_dir_all(&self.config_dir).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.config_dir).map_err(io_err)?;
        tmp.write_all(text.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}
