mod config;
mod lock;
pub mod state_store;

pub use config::{AutomationConfig, Config, LogConfig, NotificationsConfig};
pub use lock::StoreLock;
pub use state_store::{StateStore, STATE_VERSION};

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Returns `~/.config/focuscontacts[-dev]/` based on FOCUSCONTACTS_ENV.
///
/// Set FOCUSCONTACTS_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StoreError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FOCUSCONTACTS_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("focuscontacts-dev")
    } else {
        base_dir.join("focuscontacts")
    };

    std::fs::create_dir_all(&dir).map_err(|e| StoreError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(io_err)
}
