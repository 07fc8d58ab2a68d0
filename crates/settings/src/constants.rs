//! Centralized configuration constants for termspace.
//!
//! Grouped by the component that consumes them.

/// Pseudo-terminal device defaults.
pub mod pty {
    /// Rows a session starts with before the renderer reports its size.
    pub const DEFAULT_ROWS: u16 = 30;
    /// Columns a session starts with before the renderer reports its size.
    pub const DEFAULT_COLS: u16 = 120;
    /// Upper bound on raw bytes taken from the device per read.
    pub const READ_BUFFER_SIZE: usize = 16 * 1024;
}

/// Input writer pacing.
pub mod input {
    use std::time::Duration;

    /// Payloads longer than this are split into chunks of this size.
    pub const CHUNK_SIZE: usize = 2048;
    /// Pause between consecutive chunks of one payload.
    pub const CHUNK_DELAY: Duration = Duration::from_millis(10);
}

/// Snapshot persistence.
pub mod snapshot {
    use std::time::Duration;

    /// Schema written by the autosave codec.
    pub const SCHEMA_VERSION: &str = "1.1.0";
    /// Schema of the portable export document.
    pub const EXPORT_SCHEMA_VERSION: &str = "1.0.0";
    /// Rotated copies kept in the history directory.
    pub const MAX_HISTORY_FILES: usize = 10;
    /// Periodic save cadence while any session is open.
    pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);
    /// Split children allowed under one main terminal (4 panes total).
    pub const MAX_SPLIT_DEPTH: usize = 3;
}

/// Vault key derivation and AEAD sizes.
pub mod vault {
    /// Random salt length fed to Argon2id.
    pub const SALT_LEN: usize = 16;
    /// AES-GCM nonce length.
    pub const NONCE_LEN: usize = 12;
    /// AES-256 key length.
    pub const KEY_LEN: usize = 32;
    /// Payload envelope format version.
    pub const PAYLOAD_VERSION: u8 = 1;
}

/// Timing configuration.
pub mod timing {
    use std::time::Duration;

    /// How long an exit watcher waits for the output pump to drain
    /// before reporting the exit.
    pub const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);
    /// Debounce window for config file change notifications.
    pub const CONFIG_DEBOUNCE: Duration = Duration::from_millis(100);
}

/// Settings file validation limits.
pub mod settings {
    /// Maximum settings file size in bytes (64 KB).
    /// Settings files should be tiny; anything larger is suspicious.
    pub const MAX_FILE_SIZE: u64 = 64 * 1024;
}
