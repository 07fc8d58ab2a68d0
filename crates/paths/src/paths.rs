//! Centralized path management for termspace.
//!
//! All application directories are lazily initialized and cached.
//! Use `set_*` functions before first access to override for testing.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const APP_DIR_NAME: &str = "termspace";

static CONFIG_DIR: OnceLock<PathBuf> = OnceLock::new();
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();
static LOGS_DIR: OnceLock<PathBuf> = OnceLock::new();

/// ~/.config/termspace (or platform equivalent)
pub fn config_dir() -> &'static PathBuf {
    CONFIG_DIR.get_or_init(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    })
}

/// ~/Library/Application Support/termspace (or platform equivalent).
///
/// Snapshots and their history live here.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    })
}

/// ~/Library/Logs/termspace (or platform equivalent)
pub fn logs_dir() -> &'static PathBuf {
    LOGS_DIR.get_or_init(|| {
        #[cfg(target_os = "macos")]
        {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Library")
                .join("Logs")
                .join(APP_DIR_NAME)
        }
        #[cfg(not(target_os = "macos"))]
        {
            data_dir().join("logs")
        }
    })
}

/// Override config dir (must be called before first access). For testing.
pub fn set_config_dir(path: PathBuf) {
    let _ = CONFIG_DIR.set(path);
}

/// Override data dir (must be called before first access). For testing.
pub fn set_data_dir(path: PathBuf) {
    let _ = DATA_DIR.set(path);
}

/// Override logs dir (must be called before first access). For testing.
pub fn set_logs_dir(path: PathBuf) {
    let _ = LOGS_DIR.set(path);
}

/// Config file path: config_dir()/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Autosave snapshot: data_dir()/workspaces.json.gz
pub fn snapshot_file() -> PathBuf {
    snapshot_file_in(data_dir())
}

/// Snapshot file inside an arbitrary data directory.
pub fn snapshot_file_in(dir: &Path) -> PathBuf {
    dir.join("workspaces.json.gz")
}

/// Pre-compression snapshot name, read only as a fallback.
pub fn legacy_snapshot_file_in(dir: &Path) -> PathBuf {
    dir.join("workspaces.json")
}

/// Rotated snapshot copies: data_dir()/history
pub fn history_dir_in(dir: &Path) -> PathBuf {
    dir.join("history")
}

/// The directory the UI should show as "where my data lives".
///
/// Creates it if missing so the caller can open it straight away.
pub fn resolve_config_directory() -> Result<PathBuf> {
    let dir = data_dir().clone();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory: {:?}", dir))?;
    Ok(dir)
}

/// Create every application directory up front.
pub fn ensure_dirs() -> Result<()> {
    for dir in [config_dir(), data_dir(), logs_dir()] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;
    }
    tracing::debug!(
        config = ?config_dir(),
        data = ?data_dir(),
        "Initialized application directories"
    );
    Ok(())
}
