//! Background snapshot saving.
//!
//! The autosaver thread writes the snapshot on a fixed tick while sessions
//! are open, right away when the workspace list changes, and one last time
//! on shutdown. A failed save is logged and retried on the next trigger.

use crate::codec::SnapshotCodec;
use crate::snapshot::WorkspaceSnapshot;
use parking_lot::Mutex;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use terminal::{SessionId, Supervisor};

/// Where the autosaver gets the document to write.
pub trait SnapshotSource: Send + 'static {
    /// Current document, or `None` to skip this save.
    fn snapshot(&self) -> Option<WorkspaceSnapshot>;
    fn has_open_sessions(&self) -> bool;
}

/// A shared document whose terminal directories are refreshed from the
/// supervisor before each save.
#[derive(Clone)]
pub struct LiveSnapshot {
    document: Arc<Mutex<WorkspaceSnapshot>>,
    supervisor: Supervisor,
}

impl LiveSnapshot {
    pub fn new(document: Arc<Mutex<WorkspaceSnapshot>>, supervisor: Supervisor) -> Self {
        Self {
            document,
            supervisor,
        }
    }

    pub fn document(&self) -> &Arc<Mutex<WorkspaceSnapshot>> {
        &self.document
    }
}

impl SnapshotSource for LiveSnapshot {
    fn snapshot(&self) -> Option<WorkspaceSnapshot> {
        let mut snapshot = self.document.lock().clone();
        for terminal in &mut snapshot.terminals {
            if let Ok(cwd) = self.supervisor.cwd(&SessionId::new(terminal.id.clone())) {
                terminal.cwd = cwd;
            }
        }
        Some(snapshot)
    }

    fn has_open_sessions(&self) -> bool {
        self.supervisor.has_open_sessions()
    }
}

enum Command {
    Changed,
    Shutdown,
}

/// Handle to the autosave thread. Dropping it performs the final save.
pub struct Autosaver {
    tx: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl Autosaver {
    pub fn spawn<S: SnapshotSource>(
        codec: SnapshotCodec,
        source: S,
        interval: Duration,
    ) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("termspace-autosave".into())
            .spawn(move || {
                loop {
                    match rx.recv_timeout(interval) {
                        Ok(Command::Changed) => save(&codec, &source, "changed"),
                        Err(RecvTimeoutError::Timeout) => {
                            if source.has_open_sessions() {
                                save(&codec, &source, "periodic");
                            }
                        }
                        Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                            save(&codec, &source, "shutdown");
                            break;
                        }
                    }
                }
                tracing::debug!("autosave thread exiting");
            })?;
        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    /// Save now. Call after adding, removing or renaming a workspace.
    pub fn notify_changed(&self) {
        if self.tx.send(Command::Changed).is_err() {
            tracing::warn!("autosave thread is gone, change not saved");
        }
    }

    /// Final save, then wait for the thread to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.tx.send(Command::Shutdown);
        if thread.join().is_err() {
            tracing::error!("autosave thread panicked");
        }
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn save(codec: &SnapshotCodec, source: &impl SnapshotSource, reason: &'static str) {
    let Some(snapshot) = source.snapshot() else {
        return;
    };
    match codec.save(&snapshot) {
        Ok(path) => tracing::trace!(reason, path = %path.display(), "autosaved"),
        Err(e) => tracing::warn!(reason, error = %e, "autosave failed"),
    }
}
