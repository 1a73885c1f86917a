//! Persisted user policy: auto-start flag, preferred mode and log level

use crate::config_store::write_atomic;
use crate::mode::Mode;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// File name of the settings inside the data directory
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Log verbosity chosen by the user.
///
/// Stored and displayed only; the FRP binary is not given a log-level flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| anyhow::anyhow!("Unknown log level '{}'", s))
    }
}

/// The persisted key/value policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Start the supervisor when the system reports it is ready
    #[serde(default)]
    pub auto_start: bool,

    /// Mode used for auto-start and as the default for manual starts
    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub log_level: LogLevel,
}

/// Reads and writes [`Settings`] as TOML
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Settings stored at `<data_dir>/settings.toml`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(SETTINGS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the settings; a missing file yields the defaults
    pub fn load(&self) -> anyhow::Result<Settings> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No settings file, using defaults");
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let content = toml::to_string(settings)?;
        write_atomic(&self.path, content.as_bytes(), None)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!(
            auto_start = settings.auto_start,
            mode = %settings.mode,
            log_level = %settings.log_level,
            "Settings saved"
        );
        Ok(())
    }

    /// Load, modify and save in one step
    pub fn update(&self, f: impl FnOnce(&mut Settings)) -> anyhow::Result<Settings> {
        let mut settings = self.load()?;
        f(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}
