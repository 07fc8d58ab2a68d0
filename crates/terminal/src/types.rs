//! Terminal session data types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

/// Opaque identifier the UI assigns to a terminal session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for sessions created by the backend itself.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self {
            cols: settings::constants::pty::DEFAULT_COLS,
            rows: settings::constants::pty::DEFAULT_ROWS,
        }
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Normal exit with a status code.
    Code(u32),
    /// Killed by us or terminated by a signal; no meaningful status.
    Signaled,
}

impl ExitCode {
    /// Status as the host process would report it.
    pub fn as_process_status(self) -> i32 {
        match self {
            Self::Code(code) => code as i32,
            Self::Signaled => 128 + 9,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit {}", code),
            Self::Signaled => f.write_str("signaled"),
        }
    }
}

/// Lifecycle of one session.
///
/// `Created` covers the window between the registry insert and the shell
/// spawn completing. Leaving `Running` happens exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Exited(ExitCode),
    Killed,
}

impl SessionState {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

/// Point-in-time view of a registered session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub workspace_id: Option<String>,
    pub cwd: PathBuf,
    pub state: SessionState,
    pub size: TermSize,
    pub last_activity: Instant,
    pub process_id: Option<u32>,
}

/// A span of pty output that never ends mid-codepoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub session_id: SessionId,
    pub bytes: Vec<u8>,
}

/// Sent once per session lifetime when its shell terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitEvent {
    pub session_id: SessionId,
    pub code: ExitCode,
}
