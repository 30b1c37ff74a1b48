//! Settings kept in SUNSET_HOME/config.json

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sunset_proto::Speed;
use sunset_proto::ble::DEFAULT_ADDRESS;
use sunset_sync::SessionConfig;

/// Overrides the configured lamp address
pub const ADDRESS_ENV: &str = "SUNSET_ADDRESS";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not determine home directory, set SUNSET_HOME")]
    NoHome,
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth address of the lamp
    pub address: String,
    pub connect_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub speed: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            connect_timeout_ms: 5000,
            tick_interval_ms: 50,
            speed: 100,
        }
    }
}

/// Get SUNSET_HOME (default ~/.sunset), creating it if needed
pub fn sunset_home() -> Result<PathBuf, ConfigError> {
    let home = match std::env::var_os("SUNSET_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir().ok_or(ConfigError::NoHome)?.join(".sunset"),
    };

    fs::create_dir_all(&home).map_err(|source| ConfigError::Io { path: home.clone(), source })?;
    Ok(home)
}

impl Config {
    /// Load config.json from `home`, writing the defaults if it is missing
    pub fn load_or_create(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join("config.json");
        let io_err = |source| ConfigError::Io { path: path.clone(), source };

        if path.exists() {
            let data = fs::read_to_string(&path).map_err(io_err)?;
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse { path: path.clone(), source })
        } else {
            let config = Self::default();
            let data = serde_json::to_string_pretty(&config)
                .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
            fs::write(&path, data).map_err(io_err)?;
            Ok(config)
        }
    }

    /// `--device` beats SUNSET_ADDRESS beats the config file
    pub fn resolve_address(&self, device: Option<String>, env: Option<String>) -> String {
        device
            .or(env)
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| self.address.clone())
    }

    pub fn address(&self, device: Option<String>) -> String {
        self.resolve_address(device, std::env::var(ADDRESS_ENV).ok())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn session(&self, address: String) -> SessionConfig {
        SessionConfig {
            address,
            connect_timeout: self.connect_timeout(),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            speed: Speed::new(self.speed),
        }
    }
}
