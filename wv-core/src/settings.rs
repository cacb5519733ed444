//! User settings
//!
//! Persisted as pretty JSON at `$XDG_CONFIG_HOME/wireview/settings.json`.
//! A missing file yields defaults; a malformed one is an error rather than a
//! silent reset.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use wv_error::{Result, WireViewError};

use crate::constants::{daemon, paths, poll, serial};

/// Which transports the connector may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    /// Serial first, hwmon as fallback
    #[default]
    Auto,
    Serial,
    Hwmon,
}

impl TransportPreference {
    pub fn allows_serial(self) -> bool {
        matches!(self, Self::Auto | Self::Serial)
    }

    pub fn allows_hwmon(self) -> bool {
        matches!(self, Self::Auto | Self::Hwmon)
    }
}

impl std::str::FromStr for TransportPreference {
    type Err = WireViewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "serial" => Ok(Self::Serial),
            "hwmon" => Ok(Self::Hwmon),
            other => Err(WireViewError::InvalidArgument(format!(
                "unknown transport '{}'",
                other
            ))),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    poll::DEFAULT_INTERVAL.as_millis() as u64
}

fn default_baud_rate() -> u32 {
    serial::BAUD_RATE
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(daemon::SOCKET_PATH)
}

fn default_hwmon_base() -> PathBuf {
    PathBuf::from(paths::HWMON_BASE)
}

fn default_lock_path() -> PathBuf {
    paths::default_lock_path()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_socket_path")]
    pub daemon_socket: PathBuf,

    #[serde(default = "default_hwmon_base")]
    pub hwmon_base: PathBuf,

    #[serde(default = "default_lock_path")]
    pub port_lock: PathBuf,

    #[serde(default)]
    pub transport: TransportPreference,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            baud_rate: default_baud_rate(),
            daemon_socket: default_socket_path(),
            hwmon_base: default_hwmon_base(),
            port_lock: default_lock_path(),
            transport: TransportPreference::default(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Read from `path`; defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| WireViewError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to `path` through a temp file and rename
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| WireViewError::FileWrite {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&settings_path()?)
    }

    /// Save to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&settings_path()?)
    }
}

/// `$XDG_CONFIG_HOME/wireview/settings.json`
pub fn settings_path() -> Result<PathBuf> {
    paths::user_config_dir()
        .map(|d| d.join(paths::SETTINGS_FILE))
        .ok_or_else(|| WireViewError::config("could not determine config directory"))
}

/// Temp file + rename so a crash never leaves a truncated file behind
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let write_err = |e| WireViewError::FileWrite {
        path: temp_path.clone(),
        source: e,
    };

    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| WireViewError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}
