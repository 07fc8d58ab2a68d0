//! Shared fixtures for workspace integration tests.

#![allow(dead_code)]

use settings::Config;
use std::time::Duration;
use terminal::{SessionEvents, Supervisor, SupervisorBuilder};
use termspace_workspace::{TerminalRecord, WorkspaceRecord, WorkspaceSnapshot};
use vault::KdfParams;

pub use tempfile::{tempdir, TempDir};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Supervisor running plain `/bin/sh` with a fixed, minimal environment.
pub fn sh_supervisor() -> (Supervisor, SessionEvents) {
    let config = Config {
        shell: Some("/bin/sh".to_string()),
        shell_args: Some(Vec::new()),
        write_chunk_delay_ms: 0,
        ..Config::default()
    };
    SupervisorBuilder::new(config)
        .base_environment([("PATH".to_string(), "/usr/bin:/bin".to_string())])
        .build()
}

/// Argon2 parameters small enough for tests.
pub fn fast_kdf() -> KdfParams {
    KdfParams {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
        ..KdfParams::default()
    }
}

/// A workspace in `folder` with a main terminal and `splits` split panes.
pub fn workspace_with_terminals(
    snapshot: &mut WorkspaceSnapshot,
    name: &str,
    folder: &std::path::Path,
    splits: usize,
) -> (String, Vec<String>) {
    let workspace_id = snapshot.add_workspace(WorkspaceRecord::new(name, folder));
    let main = TerminalRecord::new(&workspace_id, "main", folder);
    let main_id = main.id.clone();
    let mut ids = vec![main_id.clone()];
    snapshot.terminals.push(main);
    for i in 0..splits {
        let mut split = TerminalRecord::new(&workspace_id, format!("split {i}"), folder);
        split.split_from_id = Some(main_id.clone());
        ids.push(split.id.clone());
        snapshot.terminals.push(split);
    }
    (workspace_id, ids)
}
