//! Configuration management for neural-vm.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (NEURAL_VM_MAX_CYCLES, etc.)
//! 2. Project-local config file (`./neural-vm.toml`)
//! 3. User config file (`~/.config/neural-vm/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # neural-vm.toml
//!
//! # Scheduler cycles before a run is cut off
//! max_cycles = 5000
//!
//! # Simulated heap size in bytes
//! heap_size = 1048576
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::memory::DEFAULT_HEAP_SIZE;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Default cycle budget of a run.
pub const DEFAULT_MAX_CYCLES: u64 = 1000;

/// Default cycles between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

/// neural-vm configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Scheduler cycles before a run stops with its budget exhausted.
    pub max_cycles: Option<u64>,

    /// Size of the simulated heap in bytes.
    pub heap_size: Option<u32>,

    /// End a run as soon as every active thread is blocked.
    pub stop_on_deadlock: Option<bool>,

    /// Cycles between progress log lines (0 disables them).
    pub progress_interval: Option<u64>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `neural-vm.toml`
    /// 3. User config `~/.config/neural-vm/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Load project-local config (higher priority)
        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    pub fn max_cycles(&self) -> u64 {
        self.max_cycles.unwrap_or(DEFAULT_MAX_CYCLES)
    }

    pub fn heap_size(&self) -> u32 {
        self.heap_size.unwrap_or(DEFAULT_HEAP_SIZE)
    }

    pub fn stop_on_deadlock(&self) -> bool {
        self.stop_on_deadlock.unwrap_or(false)
    }

    pub fn progress_interval(&self) -> u64 {
        self.progress_interval.unwrap_or(DEFAULT_PROGRESS_INTERVAL)
    }

    /// Load user configuration from ~/.config/neural-vm/config.toml
    fn load_user_config() -> Option<Self> {
        Self::user_config_path().and_then(|path| Self::load_from_file(&path))
    }

    /// Load project-local configuration from ./neural-vm.toml
    fn load_local_config() -> Option<Self> {
        Self::load_from_file(Path::new("neural-vm.toml"))
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.max_cycles.is_some() {
            self.max_cycles = other.max_cycles;
        }
        if other.heap_size.is_some() {
            self.heap_size = other.heap_size;
        }
        if other.stop_on_deadlock.is_some() {
            self.stop_on_deadlock = other.stop_on_deadlock;
        }
        if other.progress_interval.is_some() {
            self.progress_interval = other.progress_interval;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(cycles) = env_value("NEURAL_VM_MAX_CYCLES") {
            self.max_cycles = Some(cycles);
        }
        if let Some(size) = env_value("NEURAL_VM_HEAP_SIZE") {
            self.heap_size = Some(size);
        }
        if let Some(stop) = env_value("NEURAL_VM_STOP_ON_DEADLOCK") {
            self.stop_on_deadlock = Some(stop);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("neural-vm").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# neural-vm configuration
# Place this file at ~/.config/neural-vm/config.toml or ./neural-vm.toml

# Scheduler cycles before a run is cut off (default 1000)
max_cycles = 1000

# Simulated heap size in bytes (default 1 MiB)
# heap_size = 1048576

# Stop as soon as every active thread is blocked (default false)
# stop_on_deadlock = true

# Cycles between progress log lines, 0 to disable (default 100)
# progress_interval = 100
"#
        .to_string()
    }
}

/// Parse an environment variable, ignoring it with a warning if malformed.
fn env_value<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => {
            log::info!("Using {} from environment: {}", name, raw);
            Some(value)
        }
        Err(_) => {
            log::warn!("Ignoring {}: cannot parse {:?}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_cycles(), 1000);
        assert_eq!(config.heap_size(), 1024 * 1024);
        assert!(!config.stop_on_deadlock());
        assert_eq!(config.progress_interval(), 100);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            max_cycles: Some(10),
            heap_size: Some(4096),
            stop_on_deadlock: None,
            progress_interval: None,
        };

        let overlay = Config {
            max_cycles: None,
            heap_size: Some(8192),
            stop_on_deadlock: Some(true),
            progress_interval: None,
        };

        base.merge(overlay);

        // max_cycles unchanged (overlay was None)
        assert_eq!(base.max_cycles, Some(10));
        // heap_size overridden by overlay
        assert_eq!(base.heap_size, Some(8192));
        assert_eq!(base.stop_on_deadlock, Some(true));
        assert_eq!(base.progress_interval(), 100);
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.max_cycles, Some(1000));
        assert_eq!(config.heap_size, None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("stop_on_deadlock = true").unwrap();
        assert!(config.stop_on_deadlock());
        assert_eq!(config.max_cycles(), DEFAULT_MAX_CYCLES);
    }
}
