//! TOML config file support with live reload.
//!
//! Config location: `~/.config/termspace/config.toml`

use crate::constants;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// User-facing config parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Shell binary to spawn instead of the platform default.
    pub shell: Option<String>,
    /// Arguments for `shell`. When unset the platform login flag is used.
    pub shell_args: Option<Vec<String>>,
    /// Initial pty width.
    pub default_cols: u16,
    /// Initial pty height.
    pub default_rows: u16,
    /// Directories prepended to PATH for every session.
    pub extra_path: Vec<String>,
    /// Variables applied to every session (below per-session overrides).
    pub extra_env: BTreeMap<String, String>,
    /// Merge `.envrc` and `.env` from the session directory into its environment.
    pub load_dotenv: bool,
    /// Seconds between autosaves while sessions are open.
    pub autosave_interval_secs: u64,
    /// Rotated snapshot copies to keep.
    pub history_limit: usize,
    /// Input writer chunk size in bytes.
    pub write_chunk_size: usize,
    /// Pause between input chunks in milliseconds.
    pub write_chunk_delay_ms: u64,
    /// Bytes requested per pty read.
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            shell_args: None,
            default_cols: constants::pty::DEFAULT_COLS,
            default_rows: constants::pty::DEFAULT_ROWS,
            extra_path: Vec::new(),
            extra_env: BTreeMap::new(),
            load_dotenv: false,
            autosave_interval_secs: constants::snapshot::AUTOSAVE_INTERVAL.as_secs(),
            history_limit: constants::snapshot::MAX_HISTORY_FILES,
            write_chunk_size: constants::input::CHUNK_SIZE,
            write_chunk_delay_ms: constants::input::CHUNK_DELAY.as_millis() as u64,
            read_buffer_size: constants::pty::READ_BUFFER_SIZE,
        }
    }
}

impl Config {
    /// Autosave cadence as a `Duration`, never shorter than one second.
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    /// Inter-chunk delay for the input writer.
    pub fn write_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.write_chunk_delay_ms)
    }

    /// Clamp values that would break the I/O pipeline.
    ///
    /// A zero chunk size would loop forever and a read buffer smaller than
    /// one UTF-8 sequence could never make progress.
    pub fn sanitized(mut self) -> Self {
        if self.write_chunk_size == 0 {
            tracing::warn!("write-chunk-size must be positive, using default");
            self.write_chunk_size = constants::input::CHUNK_SIZE;
        }
        if self.read_buffer_size < 4 {
            tracing::warn!("read-buffer-size too small, using default");
            self.read_buffer_size = constants::pty::READ_BUFFER_SIZE;
        }
        if self.default_cols == 0 || self.default_rows == 0 {
            self.default_cols = constants::pty::DEFAULT_COLS;
            self.default_rows = constants::pty::DEFAULT_ROWS;
        }
        self
    }
}

/// Default config file content with comments (generated on first launch).
const DEFAULT_CONFIG: &str = r#"# termspace configuration
# Changes are picked up live by running sessions' next spawn.

# Shell to launch (defaults to $SHELL, then a platform fallback)
# shell = "/bin/zsh"
# shell-args = ["-l"]

# Initial terminal size before the window reports its own
default-cols = 120
default-rows = 30

# Extra directories prepended to PATH in every session
# extra-path = ["~/.cargo/bin"]

# Merge .envrc / .env from the session directory into its environment
load-dotenv = false

# Seconds between autosaves while any session is open
autosave-interval-secs = 30

# Rotated snapshot copies kept in the history directory
history-limit = 10

# Large pastes are split into chunks and paced so editors keep up
write-chunk-size = 2048
write-chunk-delay-ms = 10

# Extra variables for every session
# [extra-env]
# EDITOR = "nvim"
"#;

/// Return the config file path.
pub fn config_path() -> PathBuf {
    termspace_paths::config_file()
}

/// Ensure the config file exists, creating a default if missing.
/// Returns the path to the config file.
pub fn ensure_config_file() -> Option<PathBuf> {
    let path = config_path();
    if !path.exists() {
        let parent = path.parent()?;
        std::fs::create_dir_all(parent).ok()?;
        std::fs::write(&path, DEFAULT_CONFIG).ok()?;
        tracing::info!("Created default config at {:?}", path);
    }
    Some(path)
}

/// Load and parse the config file. Returns default on any error.
pub fn load_config() -> Config {
    load_config_from(&config_path())
}

/// Load a config from an explicit path. Returns default on any error.
pub fn load_config_from(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read config: {}", e);
            }
            return Config::default();
        }
    };

    // Size guard
    if content.len() > constants::settings::MAX_FILE_SIZE as usize {
        tracing::warn!(
            "Config file too large ({} bytes), using defaults",
            content.len()
        );
        return Config::default();
    }

    match toml::from_str::<Config>(&content) {
        Ok(cfg) => cfg.sanitized(),
        Err(e) => {
            tracing::warn!("Failed to parse config.toml: {}", e);
            Config::default()
        }
    }
}

/// Start watching the config file for changes.
///
/// `on_change` runs on the watcher thread whenever the parsed config differs
/// from the last one seen. Returns a guard that stops watching on drop.
pub fn watch_config(
    path: PathBuf,
    on_change: impl Fn(&Config) + Send + 'static,
) -> Option<notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>> {
    use notify::Watcher;
    use notify_debouncer_mini::{new_debouncer, DebounceEventResult};

    let watch_dir = path.parent()?.to_path_buf();
    let current = Arc::new(parking_lot::Mutex::new(load_config_from(&path)));
    let path_clone = path.clone();

    let mut debouncer = new_debouncer(
        constants::timing::CONFIG_DEBOUNCE,
        move |res: DebounceEventResult| {
            let Ok(events) = res else {
                return;
            };
            if !events.iter().any(|event| event.path == path_clone) {
                return;
            }
            let new_config = load_config_from(&path_clone);
            let mut prev = current.lock();
            if new_config != *prev {
                tracing::info!("Config file changed, reloading");
                *prev = new_config.clone();
                drop(prev);
                on_change(&new_config);
            }
        },
    )
    .ok()?;

    debouncer
        .watcher()
        .watch(&watch_dir, notify::RecursiveMode::NonRecursive)
        .ok()?;

    tracing::info!("Watching config file: {:?}", path);
    Some(debouncer)
}
