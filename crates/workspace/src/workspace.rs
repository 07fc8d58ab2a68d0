//! Workspace persistence for termspace.
//!
//! Snapshot document, split layouts, gzip storage with history,
//! export/import, workspace locking and autosave.

mod autosave;
mod codec;
mod error;
mod export;
mod layout;
mod lock;
mod snapshot;

pub use autosave::{Autosaver, LiveSnapshot, SnapshotSource};
pub use codec::{parse_snapshot, SnapshotCodec};
pub use error::{LockError, PersistenceError, ValidationError};
pub use export::{
    export, import, merge_import, ExportDocument, ExportedTerminal, ExportedWorkspace,
    ImportedWorkspaces,
};
pub use layout::{SplitDirection, SplitNode};
pub use lock::{
    workspace_hint, LockSummary, LockedTerminals, NoScrollback, ScrollbackSource, WorkspaceLocker,
};
pub use snapshot::{TerminalRecord, WorkspaceRecord, WorkspaceSnapshot};
