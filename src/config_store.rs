//! On-disk FRP configuration, one TOML file per mode.
//!
//! The contents are opaque to the supervisor: files are read and replaced
//! byte for byte. A mode-specific template is written the first time a
//! mode is used and never overwritten afterwards.

use crate::error::SupervisorError;
use crate::mode::Mode;
use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CLIENT_TEMPLATE: &str = "# frpc.toml\n\
[common]\n\
server_addr = \"your-frp-server.com\"\n\
server_port = 7000\n\
token = \"your-token\"\n\
\n\
[ssh]\n\
type = \"tcp\"\n\
local_ip = \"127.0.0.1\"\n\
local_port = 22\n\
remote_port = 6000\n";

const SERVER_TEMPLATE: &str = "# frps.toml\n\
[common]\n\
bind_port = 7000\n\
token = \"your-token\"\n";

/// Template written on first use of a mode
pub fn default_template(mode: Mode) -> &'static str {
    match mode {
        Mode::Client => CLIENT_TEMPLATE,
        Mode::Server => SERVER_TEMPLATE,
    }
}

/// Replace `path` with `contents` through a temp file in the same directory.
///
/// On Unix `permissions` is applied to the temp file before it is renamed
/// into place.
pub(crate) fn write_atomic(
    path: &Path,
    contents: &[u8],
    permissions: Option<u32>,
) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    if let Some(mode) = permissions {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = permissions;

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Per-mode configuration files under the data directory
#[derive(Debug, Clone)]
pub struct ConfigStore {
    data_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `<data_dir>/<mode>.toml`
    pub fn path_for(&self, mode: Mode) -> PathBuf {
        self.data_dir.join(mode.config_file_name())
    }

    pub fn exists(&self, mode: Mode) -> bool {
        self.path_for(mode).is_file()
    }

    /// Write the default template if no configuration exists yet.
    ///
    /// Returns `true` if the template was written.
    pub fn ensure_default(&self, mode: Mode) -> Result<bool, SupervisorError> {
        let path = self.path_for(mode);
        if path.exists() {
            return Ok(false);
        }

        debug!(mode = %mode, "Creating default config");
        write_atomic(&path, default_template(mode).as_bytes(), None)
            .map_err(|e| SupervisorError::io(&path, e))?;
        info!(mode = %mode, path = %path.display(), "Created default config");
        Ok(true)
    }

    pub fn read(&self, mode: Mode) -> anyhow::Result<Vec<u8>> {
        let path = self.path_for(mode);
        std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Read the configuration as text (lossy for invalid UTF-8)
    pub fn read_to_string(&self, mode: Mode) -> anyhow::Result<String> {
        Ok(String::from_utf8_lossy(&self.read(mode)?).into_owned())
    }

    /// Replace the whole configuration file
    pub fn write(&self, mode: Mode, contents: &[u8]) -> anyhow::Result<()> {
        let path = self.path_for(mode);
        write_atomic(&path, contents, None)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(mode = %mode, bytes = contents.len(), "Configuration saved");
        Ok(())
    }

    /// Copy an external file over the configuration for `mode`.
    ///
    /// The running child is not notified; the new file is used on the next start.
    pub fn import(&self, mode: Mode, source: &Path) -> anyhow::Result<PathBuf> {
        let contents = std::fs::read(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        self.write(mode, &contents)?;
        let path = self.path_for(mode);
        info!(mode = %mode, from = %source.display(), to = %path.display(), "Configuration imported");
        Ok(path)
    }
}
