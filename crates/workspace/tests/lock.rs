//! Locking a workspace against live `/bin/sh` sessions.

#![cfg(unix)]

mod common;

use common::{fast_kdf, sh_supervisor, tempdir, workspace_with_terminals, DEFAULT_TIMEOUT};
use pretty_assertions::assert_eq;
use serial_test::serial;
use terminal::{ExitCode, SessionId};
use termspace_workspace::{workspace_hint, SnapshotCodec, WorkspaceLocker, WorkspaceSnapshot};
use vault::PasswordCache;

#[test]
#[serial]
fn lock_tears_down_every_session_of_the_workspace() {
    let (supervisor, events) = sh_supervisor();
    let passwords = PasswordCache::new();
    let dir = tempdir().unwrap();
    let mut snapshot = WorkspaceSnapshot::default();
    let (locked_ws, ids) = workspace_with_terminals(&mut snapshot, "locked", dir.path(), 2);
    let (open_ws, open_ids) = workspace_with_terminals(&mut snapshot, "open", dir.path(), 0);

    for id in &ids {
        supervisor
            .create_in_workspace(id.as_str(), dir.path(), locked_ws.as_str())
            .unwrap();
    }
    supervisor
        .create_in_workspace(open_ids[0].as_str(), dir.path(), open_ws.as_str())
        .unwrap();
    assert_eq!(supervisor.sessions_in_workspace(&locked_ws).len(), 3);

    let locker = WorkspaceLocker::new(&supervisor, &passwords).with_kdf_params(fast_kdf());
    let source = |id: &str| Some(format!("scrollback of {id}\n"));
    let summary = locker
        .lock_workspace(&mut snapshot, &locked_ws, Some("correct-horse"), Some("pets"), &source)
        .unwrap();

    assert_eq!(summary.terminals, 3);
    assert_eq!(summary.sessions_killed, 3);
    assert!(supervisor.sessions_in_workspace(&locked_ws).is_empty());
    assert!(supervisor.info(&SessionId::new(ids[0].clone())).is_err());
    assert_eq!(supervisor.list().len(), 1);
    assert_eq!(snapshot.terminals_in(&locked_ws).count(), 0);

    for _ in 0..3 {
        let exit = events.exit.recv_timeout(DEFAULT_TIMEOUT).expect("exit event");
        assert_eq!(exit.code, ExitCode::Signaled);
        assert!(ids.contains(&exit.session_id.as_str().to_string()));
    }
    supervisor.kill_all();
}

#[test]
#[serial]
fn locked_workspace_survives_a_save_and_unlocks_later() {
    let (supervisor, _events) = sh_supervisor();
    let dir = tempdir().unwrap();
    let data = tempdir().unwrap();
    let codec = SnapshotCodec::new(data.path());
    let mut snapshot = WorkspaceSnapshot::default();
    let (ws, ids) = workspace_with_terminals(&mut snapshot, "notes", dir.path(), 1);
    let main_id = ids[0].clone();

    {
        let passwords = PasswordCache::new();
        let locker = WorkspaceLocker::new(&supervisor, &passwords).with_kdf_params(fast_kdf());
        let source = move |id: &str| (id == main_id).then(|| "$ ls\na.txt\n".to_string());
        locker
            .lock_workspace(&mut snapshot, &ws, Some("correct-horse"), Some("pets"), &source)
            .unwrap();
    }
    codec.save(&snapshot).unwrap();

    // A later run starts with an empty password cache
    let mut loaded = codec.load().unwrap().unwrap();
    assert_eq!(workspace_hint(&loaded, &ws).unwrap().as_deref(), Some("pets"));

    let passwords = PasswordCache::new();
    let locker = WorkspaceLocker::new(&supervisor, &passwords).with_kdf_params(fast_kdf());
    assert!(locker.unlock_workspace(&mut loaded, &ws, Some("wrong")).is_err());
    assert!(loaded.workspace(&ws).unwrap().is_locked);

    let restored = locker
        .unlock_workspace(&mut loaded, &ws, Some("correct-horse"))
        .unwrap();
    assert_eq!(restored.len(), 2);
    let main = restored.iter().find(|t| t.title == "main").unwrap();
    assert_eq!(main.scrollback.as_deref(), Some("$ ls\na.txt\n"));
    assert!(passwords.contains(&ws));

    // Sessions for restored terminals are spawned on demand
    supervisor
        .create_in_workspace(main.id.as_str(), dir.path(), ws.as_str())
        .unwrap();
    assert_eq!(supervisor.sessions_in_workspace(&ws).len(), 1);
    codec.save(&loaded).unwrap();
    supervisor.kill_all();
}
