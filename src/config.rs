use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ScanError;
use crate::types::{MAX_HOSTS, MAX_PORTS};

/// How host liveness is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingMethod {
    /// The operating system's `ping` utility.
    #[default]
    Ping,
    /// TCP connect to a handful of common ports.
    Tcp,
}

/// Engine defaults, optionally read from a JSON file.
///
/// Missing fields fall back to their defaults, so a file only needs the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub timeout_ms: u64,
    pub concurrency: usize,
    pub max_hosts: usize,
    pub max_ports: usize,
    pub banner_grab: bool,
    pub resolve_hostnames: bool,
    pub ping_method: PingMethod,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            concurrency: 50,
            max_hosts: MAX_HOSTS,
            max_ports: MAX_PORTS,
            banner_grab: true,
            resolve_hostnames: false,
            ping_method: PingMethod::Ping,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("[config] load: path={}", path.display());

        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, else the file at [`default_path`](Self::default_path)
    /// when it exists, else the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/netsweep/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("netsweep").join("config.json"))
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.timeout_ms == 0 {
            return Err(ScanError::Config("timeout_ms must be greater than 0".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ScanError::Config("concurrency must be greater than 0".to_string()));
        }
        if self.max_hosts == 0 || self.max_ports == 0 {
            return Err(ScanError::Config("max_hosts and max_ports must be greater than 0".to_string()));
        }
        if self.max_ports > usize::from(u16::MAX) {
            return Err(ScanError::Config(format!("max_ports cannot exceed {}", u16::MAX)));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
