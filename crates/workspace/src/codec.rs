//! Gzip snapshot storage with rotated history.
//!
//! ```text
//! <data_dir>/
//! ├── workspaces.json.gz          current snapshot
//! ├── workspaces.json             legacy uncompressed snapshot (read only)
//! └── history/
//!     └── workspaces_<YYYYmmdd_HHMMSS_mmm>.json.gz
//! ```

use crate::error::PersistenceError;
use crate::snapshot::WorkspaceSnapshot;
use chrono::{NaiveDateTime, SubsecRound, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use settings::constants::snapshot::{MAX_HISTORY_FILES, SCHEMA_VERSION};
use settings::Config;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

const HISTORY_PREFIX: &str = "workspaces_";
const HISTORY_SUFFIX: &str = ".json.gz";
const HISTORY_STAMP: &str = "%Y%m%d_%H%M%S_%3f";
/// Version assumed for documents written before the field existed.
const UNVERSIONED_SCHEMA: &str = "1.0.0";
const SUPPORTED_MAJOR: u64 = 1;

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Reads and writes the snapshot document under one data directory.
#[derive(Debug, Clone)]
pub struct SnapshotCodec {
    data_dir: PathBuf,
    history_limit: usize,
}

impl SnapshotCodec {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            history_limit: MAX_HISTORY_FILES,
        }
    }

    pub fn from_config(data_dir: impl Into<PathBuf>, config: &Config) -> Self {
        Self::new(data_dir).with_history_limit(config.history_limit)
    }

    /// Rotated copies to keep. Zero disables rotation.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn snapshot_path(&self) -> PathBuf {
        termspace_paths::snapshot_file_in(&self.data_dir)
    }

    pub fn history_dir(&self) -> PathBuf {
        termspace_paths::history_dir_in(&self.data_dir)
    }

    /// Validate and write `snapshot`, rotating the previous file into history.
    ///
    /// The document is stamped with the current schema version and time on
    /// the way out; `snapshot` itself is left untouched.
    pub fn save(&self, snapshot: &WorkspaceSnapshot) -> Result<PathBuf> {
        let mut document = snapshot.clone();
        document.stamp();
        document.validate()?;
        let json = serde_json::to_vec(&document)?;

        fs::create_dir_all(&self.data_dir).map_err(|e| PersistenceError::io(&self.data_dir, e))?;
        let path = self.snapshot_path();
        if let Err(e) = self.rotate() {
            // Losing one history copy must not block the save itself
            tracing::warn!(error = %e, "snapshot history rotation failed");
        }

        let temp_path = path.with_extension("gz.tmp");
        write_gzip(&temp_path, &json)?;
        fs::rename(&temp_path, &path).map_err(|e| PersistenceError::io(&path, e))?;

        tracing::debug!(
            path = %path.display(),
            workspaces = document.workspaces.len(),
            terminals = document.terminals.len(),
            bytes = json.len(),
            "snapshot saved"
        );
        Ok(path)
    }

    /// Load the current snapshot, falling back to the legacy uncompressed
    /// file. `None` when neither exists.
    pub fn load(&self) -> Result<Option<WorkspaceSnapshot>> {
        let path = self.snapshot_path();
        match File::open(&path) {
            Ok(file) => {
                let json = read_gzip(file)?;
                parse_snapshot(&json).map(Some)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.load_legacy(),
            Err(e) => Err(PersistenceError::io(&path, e)),
        }
    }

    fn load_legacy(&self) -> Result<Option<WorkspaceSnapshot>> {
        let legacy = termspace_paths::legacy_snapshot_file_in(&self.data_dir);
        match fs::read_to_string(&legacy) {
            Ok(json) => {
                tracing::info!(path = %legacy.display(), "loading legacy snapshot");
                parse_snapshot(&json).map(Some)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(&legacy, e)),
        }
    }

    /// Load the snapshot or start empty. Failures are logged, never raised.
    pub fn load_or_default(&self) -> WorkspaceSnapshot {
        match self.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => WorkspaceSnapshot::default(),
            Err(e) => {
                tracing::warn!(
                    path = %self.snapshot_path().display(),
                    error = %e,
                    "snapshot unreadable, starting with no workspaces"
                );
                WorkspaceSnapshot::default()
            }
        }
    }

    /// Rotated copies, newest first.
    pub fn list_history(&self) -> Result<Vec<PathBuf>> {
        let dir = self.history_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&dir, e)),
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_history_file(path))
            .collect();
        // Timestamped names sort chronologically
        files.sort_by(|a, b| b.cmp(a));
        Ok(files)
    }

    /// Read one rotated copy.
    pub fn load_history_file(&self, path: &Path) -> Result<WorkspaceSnapshot> {
        let file = File::open(path).map_err(|e| PersistenceError::io(path, e))?;
        parse_snapshot(&read_gzip(file)?)
    }

    /// Make a rotated copy the current snapshot again.
    ///
    /// The snapshot it replaces is rotated into history like any save.
    pub fn restore_from_history(&self, path: &Path) -> Result<WorkspaceSnapshot> {
        let snapshot = self.load_history_file(path)?;
        self.save(&snapshot)?;
        tracing::info!(path = %path.display(), "snapshot restored from history");
        Ok(snapshot)
    }

    fn rotate(&self) -> Result<()> {
        let current = self.snapshot_path();
        if self.history_limit == 0 || !current.exists() {
            return Ok(());
        }
        let dir = self.history_dir();
        fs::create_dir_all(&dir).map_err(|e| PersistenceError::io(&dir, e))?;

        // Names must sort after every existing copy, even within one millisecond
        let mut at = Utc::now().naive_utc().trunc_subsecs(3);
        if let Some(newest) = self.list_history()?.first().and_then(|p| history_timestamp(p)) {
            if at <= newest {
                at = newest + chrono::Duration::milliseconds(1);
            }
        }
        let target = dir.join(format!(
            "{HISTORY_PREFIX}{}{HISTORY_SUFFIX}",
            at.format(HISTORY_STAMP)
        ));
        fs::copy(&current, &target).map_err(|e| PersistenceError::io(&target, e))?;

        for stale in self.list_history()?.into_iter().skip(self.history_limit) {
            if let Err(e) = fs::remove_file(&stale) {
                tracing::warn!(path = %stale.display(), error = %e, "failed to prune snapshot history");
            }
        }
        Ok(())
    }
}

fn history_timestamp(path: &Path) -> Option<NaiveDateTime> {
    let stamp = path
        .file_name()?
        .to_str()?
        .strip_prefix(HISTORY_PREFIX)?
        .strip_suffix(HISTORY_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, HISTORY_STAMP).ok()
}

fn is_history_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(HISTORY_PREFIX) && name.ends_with(HISTORY_SUFFIX))
}

fn write_gzip(path: &Path, data: &[u8]) -> Result<()> {
    let file = File::create(path).map_err(|e| PersistenceError::io(path, e))?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(data).map_err(PersistenceError::Compression)?;
    let file = encoder.finish().map_err(PersistenceError::Compression)?;
    file.sync_all().map_err(|e| PersistenceError::io(path, e))
}

fn read_gzip(file: File) -> Result<String> {
    let mut json = String::new();
    GzDecoder::new(file)
        .read_to_string(&mut json)
        .map_err(PersistenceError::Compression)?;
    Ok(json)
}

/// Parse a snapshot document, upgrading older 1.x documents.
///
/// Fields added after 1.0.0 default when absent, so an accepted document
/// only needs its version rewritten.
pub fn parse_snapshot(json: &str) -> Result<WorkspaceSnapshot> {
    let mut value: serde_json::Value = serde_json::from_str(json)?;
    let version = match value.get("schemaVersion") {
        None | Some(serde_json::Value::Null) => UNVERSIONED_SCHEMA.to_string(),
        Some(serde_json::Value::String(version)) => version.clone(),
        Some(other) => {
            return Err(PersistenceError::IncompatibleSchema {
                found: other.to_string(),
            })
        }
    };
    let major = version.split('.').next().and_then(|major| major.parse::<u64>().ok());
    if major != Some(SUPPORTED_MAJOR) {
        return Err(PersistenceError::IncompatibleSchema { found: version });
    }

    if let Some(object) = value.as_object_mut() {
        object.insert(
            "schemaVersion".to_string(),
            serde_json::Value::String(SCHEMA_VERSION.to_string()),
        );
    }
    let snapshot: WorkspaceSnapshot = serde_json::from_value(value)?;
    snapshot.validate()?;
    if version != SCHEMA_VERSION {
        tracing::info!(from = %version, to = SCHEMA_VERSION, "migrated snapshot schema");
    }
    Ok(snapshot)
}
