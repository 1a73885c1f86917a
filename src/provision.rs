//! Extraction of the bundled FRP binaries onto a writable filesystem

use crate::config_store::write_atomic;
use crate::error::SupervisorError;
use crate::mode::Mode;
use anyhow::Context;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Permission bits for an extracted binary (owner read/write/execute)
const BINARY_PERMISSIONS: u32 = 0o700;

/// Bundled executable images keyed by mode
#[derive(Debug, Clone, Default)]
pub struct BinaryAssets {
    images: HashMap<Mode, Cow<'static, [u8]>>,
}

impl BinaryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image for a mode, replacing any previous one
    pub fn insert(&mut self, mode: Mode, image: impl Into<Cow<'static, [u8]>>) {
        self.images.insert(mode, image.into());
    }

    pub fn with(mut self, mode: Mode, image: impl Into<Cow<'static, [u8]>>) -> Self {
        self.insert(mode, image);
        self
    }

    /// Load images from a packaging directory holding files named `client` and `server`.
    ///
    /// Missing files are skipped; starting that mode will then report a missing binary.
    pub fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut assets = Self::new();
        for mode in Mode::ALL {
            let path = dir.join(mode.as_str());
            if !path.is_file() {
                warn!(mode = %mode, path = %path.display(), "No bundled binary for mode");
                continue;
            }
            let image = std::fs::read(&path)
                .with_context(|| format!("Failed to read bundled binary {}", path.display()))?;
            debug!(mode = %mode, bytes = image.len(), "Loaded bundled binary");
            assets.insert(mode, image);
        }
        Ok(assets)
    }

    pub fn get(&self, mode: Mode) -> Option<&[u8]> {
        self.images.get(&mode).map(|image| image.as_ref())
    }

    pub fn contains(&self, mode: Mode) -> bool {
        self.images.contains_key(&mode)
    }
}

/// Check whether the current user may execute `path`
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    path.is_file() && unsafe { libc::access(c_path.as_ptr(), libc::X_OK) } == 0
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Copies bundled binaries to `<data_dir>/<mode>` on demand
#[derive(Debug, Clone)]
pub struct BinaryProvisioner {
    data_dir: PathBuf,
    assets: BinaryAssets,
}

impl BinaryProvisioner {
    pub fn new(data_dir: impl Into<PathBuf>, assets: BinaryAssets) -> Self {
        Self {
            data_dir: data_dir.into(),
            assets,
        }
    }

    /// `<data_dir>/<mode>`
    pub fn path_for(&self, mode: Mode) -> PathBuf {
        self.data_dir.join(mode.as_str())
    }

    /// Extract the bundled binary for `mode` unless it is already on disk.
    ///
    /// Returns the path of the binary.
    pub fn ensure_present(&self, mode: Mode) -> Result<PathBuf, SupervisorError> {
        let path = self.path_for(mode);
        if path.exists() {
            return Ok(path);
        }

        let Some(image) = self.assets.get(mode) else {
            return Err(SupervisorError::BinaryMissing { path });
        };

        debug!(mode = %mode, path = %path.display(), "Copying bundled binary");
        write_atomic(&path, image, Some(BINARY_PERMISSIONS))
            .map_err(|e| SupervisorError::io(&path, e))?;
        info!(mode = %mode, path = %path.display(), bytes = image.len(), "Extracted binary");
        Ok(path)
    }
}
