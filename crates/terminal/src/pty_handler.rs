//! PTY process management.

use crate::error::SessionError;
use crate::exit_watcher::{self, ExitWatch, SessionLifecycle};
use crate::pump::{run_output_pump, OutputForwarder};
use crate::types::{ExitCode, ExitEvent, OutputEvent, SessionId, SessionState, TermSize};
use crate::writer::InputWriter;
use indexmap::IndexMap;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Everything needed to start one shell on a fresh pty.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub shell: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Complete environment; the parent's variables are not inherited.
    pub env: IndexMap<String, String>,
    pub size: TermSize,
    pub read_buffer_size: usize,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

fn pty_size(size: TermSize) -> PtySize {
    PtySize {
        rows: size.rows.max(1),
        cols: size.cols.max(1),
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn device_closed(id: &SessionId) -> SessionError {
    SessionError::DeviceIo {
        id: id.clone(),
        source: io::Error::new(io::ErrorKind::BrokenPipe, "pty device closed"),
    }
}

/// One pty-backed child process with its pump and exit watcher.
///
/// Killing or dropping the handle closes the master side of the device,
/// which unblocks the pump.
pub struct PtyHandle {
    id: SessionId,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    writer: Mutex<Option<InputWriter<Box<dyn Write + Send>>>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    size: Mutex<TermSize>,
    process_id: Option<u32>,
    cwd: PathBuf,
    lifecycle: Arc<SessionLifecycle>,
    last_activity: Arc<Mutex<Instant>>,
    _pump_thread: JoinHandle<()>,
    _exit_thread: JoinHandle<()>,
}

impl PtyHandle {
    /// Open a pty, start the shell on it and begin pumping output.
    pub fn spawn(
        id: SessionId,
        spec: SpawnSpec,
        output_tx: Sender<OutputEvent>,
        exit_tx: Sender<ExitEvent>,
    ) -> Result<Self, SessionError> {
        let device_io = |e: &dyn std::fmt::Display| SessionError::DeviceIo {
            id: id.clone(),
            source: io::Error::other(e.to_string()),
        };

        let pair = native_pty_system()
            .openpty(pty_size(spec.size))
            .map_err(|e| SessionError::PtyUnavailable(io::Error::other(e.to_string())))?;

        let mut cmd = CommandBuilder::new(&spec.shell);
        cmd.args(&spec.args);
        cmd.env_clear();
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.cwd(&spec.cwd);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::SpawnFailure {
                id: id.clone(),
                shell: spec.shell.clone(),
                source: io::Error::other(e.to_string()),
            })?;
        // Only the child keeps the slave open, so its exit produces EOF
        drop(pair.slave);

        let mut killer = child.clone_killer();
        let process_id = child.process_id();

        let io_setup = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match io_setup {
            Ok(io) => io,
            Err(e) => {
                let _ = killer.kill();
                return Err(device_io(&e));
            }
        };

        let lifecycle = Arc::new(SessionLifecycle::default());
        let last_activity = Arc::new(Mutex::new(Instant::now()));
        let (pump_done_tx, pump_done_rx) = mpsc::channel::<()>();

        let mut forwarder = OutputForwarder {
            session_id: id.clone(),
            tx: output_tx,
            last_activity: last_activity.clone(),
        };
        let pump_lifecycle = lifecycle.clone();
        let pump_id = id.clone();
        let buffer_size = spec.read_buffer_size;
        let pump_thread = thread::Builder::new()
            .name(format!("termspace-pump-{}", id))
            .spawn(move || {
                // Dropped when the loop ends, which the exit watcher waits on
                let _pump_done = pump_done_tx;
                let end = run_output_pump(reader, &mut forwarder, buffer_size, &pump_lifecycle.shutdown);
                tracing::debug!(session_id = %pump_id, ?end, "output pump stopped");
            });
        let pump_thread = match pump_thread {
            Ok(handle) => handle,
            Err(e) => {
                let _ = killer.kill();
                return Err(device_io(&e));
            }
        };

        let exit_thread = exit_watcher::spawn(ExitWatch {
            session_id: id.clone(),
            child,
            lifecycle: lifecycle.clone(),
            pump_done: pump_done_rx,
            exit_tx,
            drain_timeout: settings::constants::timing::PUMP_DRAIN_TIMEOUT,
        });
        let exit_thread = match exit_thread {
            Ok(handle) => handle,
            Err(e) => {
                let _ = killer.kill();
                return Err(device_io(&e));
            }
        };

        tracing::info!(
            session_id = %id,
            shell = %spec.shell,
            cwd = %spec.cwd.display(),
            pid = ?process_id,
            "session spawned"
        );

        Ok(Self {
            id,
            master: Mutex::new(Some(pair.master)),
            writer: Mutex::new(Some(InputWriter::new(
                writer,
                spec.chunk_size,
                spec.chunk_delay,
            ))),
            killer: Mutex::new(killer),
            size: Mutex::new(spec.size),
            process_id,
            cwd: spec.cwd,
            lifecycle,
            last_activity,
            _pump_thread: pump_thread,
            _exit_thread: exit_thread,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Write input, chunked and paced. Returns the number of device writes.
    ///
    /// The writer lock is held for the whole payload so concurrent writes to
    /// one session never interleave.
    pub fn write(&self, data: &[u8]) -> Result<usize, SessionError> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or_else(|| device_closed(&self.id))?;
        let writes = writer.write(data).map_err(|source| SessionError::DeviceIo {
            id: self.id.clone(),
            source,
        })?;
        *self.last_activity.lock() = Instant::now();
        tracing::trace!(session_id = %self.id, bytes = data.len(), writes, "input written");
        Ok(writes)
    }

    /// Resize the device. Returns `false` when the size was already current.
    pub fn resize(&self, size: TermSize) -> Result<bool, SessionError> {
        let mut current = self.size.lock();
        if *current == size {
            return Ok(false);
        }
        let master = self.master.lock();
        let master = master.as_ref().ok_or_else(|| device_closed(&self.id))?;
        master
            .resize(pty_size(size))
            .map_err(|e| SessionError::DeviceIo {
                id: self.id.clone(),
                source: io::Error::other(e.to_string()),
            })?;
        *current = size;
        tracing::debug!(session_id = %self.id, cols = size.cols, rows = size.rows, "resized");
        Ok(true)
    }

    /// Terminate the child and close the device. Safe to call repeatedly.
    pub fn kill(&self) {
        if self.lifecycle.exit_code().is_none() {
            self.lifecycle.killed.store(true, Ordering::Release);
            self.lifecycle.shutdown.store(true, Ordering::Release);
            if let Err(e) = self.killer.lock().kill() {
                // ESRCH is expected when the child already exited
                tracing::debug!(session_id = %self.id, "kill child process: {}", e);
            }
        }
        self.writer.lock().take();
        self.master.lock().take();
    }

    /// Keep the watcher from reporting this process's exit.
    pub(crate) fn suppress_exit_event(&self) {
        self.lifecycle.suppress_exit.store(true, Ordering::Release);
    }

    pub fn state(&self) -> SessionState {
        if self.lifecycle.is_killed() {
            return SessionState::Killed;
        }
        match self.lifecycle.exit_code() {
            Some(code) => SessionState::Exited(code),
            None => SessionState::Running,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn exit_code(&self) -> Option<ExitCode> {
        self.lifecycle.exit_code()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    pub fn size(&self) -> TermSize {
        *self.size.lock()
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Directory the session was started in.
    pub fn initial_cwd(&self) -> &Path {
        &self.cwd
    }

    /// Working directory of the shell process, if the platform exposes it.
    pub fn current_directory(&self) -> Option<PathBuf> {
        use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

        let pid = Pid::from_u32(self.process_id?);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_cwd(UpdateKind::Always),
        );
        system.process(pid)?.cwd().map(Path::to_path_buf)
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if self.lifecycle.exit_code().is_none() {
            self.kill();
        }
        tracing::debug!(session_id = %self.id, "pty handle dropped");
    }
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle")
            .field("id", &self.id)
            .field("pid", &self.process_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
