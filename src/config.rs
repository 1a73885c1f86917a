use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration for the supervisor daemon
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Writable directory for binaries, FRP configs and settings
    /// (default: `<local data dir>/droidfrpd`)
    pub data_dir: Option<PathBuf>,

    /// Directory holding the bundled `client` / `server` binaries
    /// (default: `<data_dir>/assets`)
    pub assets_dir: Option<PathBuf>,

    /// Supervisor timings and log buffer size
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Auto-start behaviour
    #[serde(default)]
    pub auto_start: AutoStartConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SupervisorConfig {
    /// A child exiting within this window counts as an early exit (default: 2000)
    #[serde(default = "default_early_exit_window")]
    pub early_exit_window_ms: u64,

    /// Period of the liveness check (default: 30)
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,

    /// Maximum wait for drainers when stopping (default: 1000)
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,

    /// Number of log entries kept before the oldest is evicted (default: 1000)
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl SupervisorConfig {
    pub fn early_exit_window(&self) -> Duration {
        Duration::from_millis(self.early_exit_window_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.early_exit_window_ms == 0 {
            return Err("supervisor.early_exit_window_ms must be greater than 0".to_string());
        }
        if self.liveness_interval_secs == 0 {
            return Err("supervisor.liveness_interval_secs must be greater than 0".to_string());
        }
        if self.stop_timeout_ms == 0 {
            return Err("supervisor.stop_timeout_ms must be greater than 0".to_string());
        }
        if self.log_capacity == 0 {
            return Err("supervisor.log_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            early_exit_window_ms: default_early_exit_window(),
            liveness_interval_secs: default_liveness_interval(),
            stop_timeout_ms: default_stop_timeout(),
            log_capacity: default_log_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AutoStartConfig {
    /// Grace period between "system ready" and the start (default: 10)
    #[serde(default = "default_auto_start_delay")]
    pub delay_secs: u64,
}

impl AutoStartConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl Default for AutoStartConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_auto_start_delay(),
        }
    }
}

fn default_early_exit_window() -> u64 {
    2000
}

fn default_liveness_interval() -> u64 {
    30
}

fn default_stop_timeout() -> u64 {
    1000
}

fn default_log_capacity() -> usize {
    crate::log_buffer::DEFAULT_LOG_CAPACITY
}

fn default_auto_start_delay() -> u64 {
    10
}

fn default_data_dir() -> PathBuf {
    dirs_next::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(env!("CARGO_PKG_NAME"))
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.supervisor.validate() {
            errors.push(e);
        }
        if self.auto_start.delay_secs == 0 {
            errors.push("auto_start.delay_secs must be greater than 0".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.assets_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("assets"))
    }
}
