use std::io;
use std::path::PathBuf;

/// Snapshot could not be written or read.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("gzip stream: {0}")]
    Compression(#[source] io::Error),

    #[error("snapshot json: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("incompatible snapshot schema {found}")]
    IncompatibleSchema { found: String },

    #[error("invalid snapshot: {0}")]
    InvalidDocument(#[from] ValidationError),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A structural rule of the snapshot document is broken.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate workspace id {0}")]
    DuplicateWorkspace(String),
    #[error("duplicate terminal id {0}")]
    DuplicateTerminal(String),
    #[error("terminal {terminal} references unknown workspace {workspace}")]
    UnknownWorkspace { terminal: String, workspace: String },
    #[error("terminal {terminal} splits from unknown terminal {parent}")]
    UnknownSplitParent { terminal: String, parent: String },
    #[error("terminal {terminal} splits from {parent} in another workspace")]
    CrossWorkspaceSplit { terminal: String, parent: String },
    #[error("split chain through {0} forms a cycle")]
    SplitCycle(String),
    #[error("split chain under {0} is deeper than allowed")]
    SplitTooDeep(String),
    #[error("locked workspace {0} has no encrypted payload")]
    MissingPayload(String),
    #[error("locked workspace {0} still lists terminals")]
    LockedWithTerminals(String),
    #[error("unlocked workspace {0} carries an encrypted payload")]
    UnexpectedPayload(String),
    #[error("active workspace {0} does not exist")]
    UnknownActiveWorkspace(String),
    #[error("focused terminal {0} does not exist")]
    UnknownFocusedTerminal(String),
    #[error("split layout {root} names unknown terminal {terminal}")]
    UnknownLayoutTerminal { root: String, terminal: String },
}

/// Why a workspace could not be locked or unlocked.
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("a password is required")]
    PasswordRequired,
    #[error("unknown workspace {0}")]
    UnknownWorkspace(String),
    #[error("workspace {0} is already locked")]
    AlreadyLocked(String),
    #[error("workspace {0} is not locked")]
    NotLocked(String),
    #[error("locked workspace {0} has no encrypted payload")]
    MissingPayload(String),
    #[error(transparent)]
    Vault(#[from] vault::VaultError),
}
