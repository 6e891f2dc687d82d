// src/settings.rs
//
// Monitor settings, stored as TOML in the user's config directory.
// Line settings are not configurable and do not appear here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::io::serial::{
    host_filter, DeviceDirectory, Discovery, MarkerFramer, PortEnumerator, SystemPorts,
    DEFAULT_READ_SIZE,
};

const APP_DIR: &str = "espmon";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Failed to write settings {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No config directory on this platform")]
    NoConfigDir,
}

/// Where discovery gets its raw port list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumerationSource {
    /// List `device_dir` and filter by name
    Directory,
    /// Ask the OS through the serialport crate
    System,
}

impl Default for EnumerationSource {
    fn default() -> Self {
        if cfg!(unix) {
            EnumerationSource::Directory
        } else {
            EnumerationSource::System
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonitorSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// Frame buffer bound in bytes (absent = unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buffered_bytes: Option<usize>,
    #[serde(default = "default_device_dir")]
    pub device_dir: PathBuf,
    #[serde(default)]
    pub enumeration: EnumerationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_poll_interval_ms() -> u64 {
    100
}
fn default_read_chunk_size() -> usize {
    DEFAULT_READ_SIZE
}
fn default_device_dir() -> PathBuf {
    PathBuf::from("/dev")
}
fn default_log_filter() -> String {
    "espmon_lib=info".to_string()
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            poll_interval_ms: default_poll_interval_ms(),
            read_chunk_size: default_read_chunk_size(),
            max_buffered_bytes: None,
            device_dir: default_device_dir(),
            enumeration: EnumerationSource::default(),
            default_port: None,
            log_dir: None,
            log_filter: default_log_filter(),
        }
    }
}

impl MonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Framer honouring `max_buffered_bytes`
    pub fn framer(&self) -> MarkerFramer {
        match self.max_buffered_bytes {
            Some(limit) => MarkerFramer::with_max_buffered(limit),
            None => MarkerFramer::new(),
        }
    }

    /// Discovery using the configured enumerator and the host's name filter
    pub fn discovery(&self) -> Discovery {
        let enumerator: Box<dyn PortEnumerator> = match self.enumeration {
            EnumerationSource::Directory => Box::new(DeviceDirectory::new(&self.device_dir)),
            EnumerationSource::System => Box::new(SystemPorts),
        };
        Discovery::new(enumerator, host_filter())
    }
}

// ============================================================================
// Load / Save
// ============================================================================

/// `<config dir>/espmon/settings.toml`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(SETTINGS_FILE))
}

/// Load settings from `path`, or from the default location when `None`.
/// A missing file at the default location yields defaults; a missing file
/// that was asked for explicitly is an error.
pub fn load_settings(path: Option<&Path>) -> Result<MonitorSettings, SettingsError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_settings_path() {
            Some(p) => (p, false),
            None => return Ok(MonitorSettings::default()),
        },
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(MonitorSettings::default());
        }
        Err(source) => return Err(SettingsError::Read { path, source }),
    };

    toml::from_str(&text).map_err(|source| SettingsError::Parse { path, source })
}

/// Write settings as pretty TOML, creating parent directories.
pub fn save_settings(settings: &MonitorSettings, path: Option<&Path>) -> Result<PathBuf, SettingsError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_settings_path().ok_or(SettingsError::NoConfigDir)?,
    };

    let text = toml::to_string_pretty(settings)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
            path: path.clone(),
            source,
        })?;
    }
    std::fs::write(&path, text).map_err(|source| SettingsError::Write {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}
