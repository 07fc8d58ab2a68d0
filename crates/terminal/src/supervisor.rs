//! Session supervisor: the registry of live sessions and the control surface.
//!
//! The registry is guarded by a single mutex. Spawning happens outside the
//! lock: `create` first inserts a placeholder tagged with a generation
//! number, spawns, then fills the placeholder in only if it still carries
//! that generation. A kill or restart that lands during the spawn therefore
//! wins, and the freshly spawned process is discarded.

use crate::environment::{detect_shell, resolve_environment};
use crate::error::SessionError;
use crate::pty_handler::{PtyHandle, SpawnSpec};
use crate::types::{ExitEvent, OutputEvent, SessionId, SessionInfo, SessionState, TermSize};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use settings::Config;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

/// Parameters for one `create` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub id: SessionId,
    pub cwd: PathBuf,
    pub workspace_id: Option<String>,
    /// Highest-precedence environment overrides.
    pub extra_env: IndexMap<String, String>,
    /// Initial size; the config default when `None`.
    pub size: Option<TermSize>,
}

impl SessionRequest {
    pub fn new(id: impl Into<SessionId>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            cwd: cwd.into(),
            workspace_id: None,
            extra_env: IndexMap::new(),
            size: None,
        }
    }

    pub fn in_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }

    pub fn with_size(mut self, size: TermSize) -> Self {
        self.size = Some(size);
        self
    }
}

/// Result of a successful `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A live session already had this id; nothing was spawned.
    AlreadyRunning,
}

/// Receiving ends of the event surface. Owned by the UI.
#[derive(Debug)]
pub struct SessionEvents {
    pub output: Receiver<OutputEvent>,
    pub exit: Receiver<ExitEvent>,
}

/// Configures and creates the one [`Supervisor`] of a process.
///
/// `build` consumes the builder, so the event receivers exist exactly once.
pub struct SupervisorBuilder {
    config: Config,
    base_env: Option<Vec<(String, String)>>,
}

impl SupervisorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config: config.sanitized(),
            base_env: None,
        }
    }

    /// Replace the inherited process environment used as the base layer.
    pub fn base_environment(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.base_env = Some(env.into_iter().collect());
        self
    }

    pub fn build(self) -> (Supervisor, SessionEvents) {
        let (output_tx, output) = mpsc::channel();
        let (exit_tx, exit) = mpsc::channel();
        let supervisor = Supervisor {
            inner: Arc::new(Inner {
                registry: Mutex::new(FxHashMap::default()),
                config: RwLock::new(self.config),
                output_tx,
                exit_tx,
                next_generation: AtomicU64::new(1),
                base_env: self.base_env,
            }),
        };
        (supervisor, SessionEvents { output, exit })
    }
}

enum EntryState {
    Starting { since: Instant },
    Running(Arc<PtyHandle>),
}

struct SessionEntry {
    generation: u64,
    request: SessionRequest,
    /// Last directory observed for the shell, used when introspection fails.
    last_cwd: PathBuf,
    state: EntryState,
}

impl SessionEntry {
    fn is_live(&self) -> bool {
        match &self.state {
            EntryState::Starting { .. } => true,
            EntryState::Running(handle) => handle.is_alive(),
        }
    }

    fn info(&self) -> SessionInfo {
        let (state, size, last_activity, process_id) = match &self.state {
            EntryState::Starting { since } => (
                SessionState::Created,
                self.request.size.unwrap_or_default(),
                *since,
                None,
            ),
            EntryState::Running(handle) => (
                handle.state(),
                handle.size(),
                handle.last_activity(),
                handle.process_id(),
            ),
        };
        SessionInfo {
            id: self.request.id.clone(),
            workspace_id: self.request.workspace_id.clone(),
            cwd: self.last_cwd.clone(),
            state,
            size,
            last_activity,
            process_id,
        }
    }
}

struct Inner {
    registry: Mutex<FxHashMap<SessionId, SessionEntry>>,
    config: RwLock<Config>,
    output_tx: Sender<OutputEvent>,
    exit_tx: Sender<ExitEvent>,
    next_generation: AtomicU64,
    base_env: Option<Vec<(String, String)>>,
}

/// Owns every session of the process. Cheap to clone.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Start a session. Creating an id that is already live is a no-op.
    pub fn create(
        &self,
        id: impl Into<SessionId>,
        cwd: impl Into<PathBuf>,
    ) -> Result<CreateOutcome, SessionError> {
        self.create_with(SessionRequest::new(id, cwd))
    }

    /// Start a session tagged with the workspace it belongs to.
    pub fn create_in_workspace(
        &self,
        id: impl Into<SessionId>,
        cwd: impl Into<PathBuf>,
        workspace_id: impl Into<String>,
    ) -> Result<CreateOutcome, SessionError> {
        self.create_with(SessionRequest::new(id, cwd).in_workspace(workspace_id))
    }

    pub fn create_with(&self, request: SessionRequest) -> Result<CreateOutcome, SessionError> {
        let generation = {
            let mut registry = self.inner.registry.lock();
            if let Some(entry) = registry.get(&request.id) {
                if entry.is_live() {
                    tracing::debug!(session_id = %request.id, "create ignored, session already running");
                    return Ok(CreateOutcome::AlreadyRunning);
                }
            }
            self.insert_placeholder(&mut registry, request.clone())
        };
        self.spawn_into(request, generation)
    }

    /// Kill the current process and start a new one under the same id.
    ///
    /// A session whose shell already exited is gone and cannot be restarted.
    pub fn restart(&self, id: &SessionId, cwd: impl Into<PathBuf>) -> Result<(), SessionError> {
        let cwd = cwd.into();
        let (old, request, generation) = {
            let mut registry = self.inner.registry.lock();
            self.purge_if_exited(&mut registry, id);
            let Some(entry) = registry.remove(id) else {
                return Err(self.unknown(id));
            };
            let request = SessionRequest {
                cwd,
                ..entry.request
            };
            let generation = self.insert_placeholder(&mut registry, request.clone());
            (entry.state, request, generation)
        };

        if let EntryState::Running(handle) = old {
            handle.suppress_exit_event();
            handle.kill();
        }
        tracing::info!(session_id = %id, cwd = %request.cwd.display(), "restarting session");
        self.spawn_into(request, generation).map(|_| ())
    }

    /// Send input to a session.
    pub fn write(&self, id: &SessionId, data: &[u8]) -> Result<(), SessionError> {
        self.live_handle(id)?.write(data).map(|_| ())
    }

    /// Resize a session's terminal. Unchanged dimensions are a no-op.
    pub fn resize(&self, id: &SessionId, cols: u16, rows: u16) -> Result<(), SessionError> {
        self.live_handle(id)?
            .resize(TermSize::new(cols, rows))
            .map(|_| ())
    }

    /// Terminate a session and release its device.
    ///
    /// The exit watcher still reports the exit once. An id that exited but
    /// was not yet purged is also accepted.
    pub fn kill(&self, id: &SessionId) -> Result<(), SessionError> {
        let entry = self.inner.registry.lock().remove(id);
        let Some(entry) = entry else {
            return Err(self.unknown(id));
        };
        if let EntryState::Running(handle) = entry.state {
            handle.kill();
        }
        tracing::info!(session_id = %id, "session killed");
        Ok(())
    }

    /// Kill every session belonging to `workspace_id`. Returns how many.
    pub fn kill_workspace(&self, workspace_id: &str) -> usize {
        let ids = self.sessions_in_workspace(workspace_id);
        ids.iter().filter(|id| self.kill(id).is_ok()).count()
    }

    /// Kill every session. Used on shutdown.
    pub fn kill_all(&self) -> usize {
        let entries: Vec<SessionEntry> = {
            let mut registry = self.inner.registry.lock();
            registry.drain().map(|(_, entry)| entry).collect()
        };
        let count = entries.len();
        for entry in entries {
            if let EntryState::Running(handle) = entry.state {
                handle.kill();
            }
        }
        if count > 0 {
            tracing::info!(count, "killed all sessions");
        }
        count
    }

    /// Best-effort working directory of the session's shell.
    ///
    /// Falls back to the last directory seen when the platform does not
    /// expose it.
    pub fn cwd(&self, id: &SessionId) -> Result<PathBuf, SessionError> {
        let handle = self.live_handle(id)?;
        let observed = handle.current_directory();

        let mut registry = self.inner.registry.lock();
        let entry = registry.get_mut(id).ok_or_else(|| self.unknown(id))?;
        if let Some(dir) = observed {
            entry.last_cwd = dir;
        }
        Ok(entry.last_cwd.clone())
    }

    pub fn info(&self, id: &SessionId) -> Result<SessionInfo, SessionError> {
        let mut registry = self.inner.registry.lock();
        self.purge_if_exited(&mut registry, id);
        registry
            .get(id)
            .map(SessionEntry::info)
            .ok_or_else(|| self.unknown(id))
    }

    /// All live sessions, ordered by id.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut registry = self.inner.registry.lock();
        registry.retain(|_, entry| entry.is_live());
        let mut infos: Vec<SessionInfo> = registry.values().map(SessionEntry::info).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn has_open_sessions(&self) -> bool {
        self.inner.registry.lock().values().any(SessionEntry::is_live)
    }

    pub fn sessions_in_workspace(&self, workspace_id: &str) -> Vec<SessionId> {
        let registry = self.inner.registry.lock();
        let mut ids: Vec<SessionId> = registry
            .values()
            .filter(|entry| entry.request.workspace_id.as_deref() == Some(workspace_id))
            .map(|entry| entry.request.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Replace the config used for future spawns.
    pub fn update_config(&self, config: Config) {
        *self.inner.config.write() = config.sanitized();
        tracing::debug!("supervisor config updated");
    }

    pub fn config(&self) -> Config {
        self.inner.config.read().clone()
    }

    fn insert_placeholder(
        &self,
        registry: &mut FxHashMap<SessionId, SessionEntry>,
        request: SessionRequest,
    ) -> u64 {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        registry.insert(
            request.id.clone(),
            SessionEntry {
                generation,
                last_cwd: request.cwd.clone(),
                request,
                state: EntryState::Starting {
                    since: Instant::now(),
                },
            },
        );
        generation
    }

    fn spawn_into(
        &self,
        request: SessionRequest,
        generation: u64,
    ) -> Result<CreateOutcome, SessionError> {
        let id = request.id.clone();
        let spec = self.spawn_spec(&request);

        let handle = match PtyHandle::spawn(
            id.clone(),
            spec,
            self.inner.output_tx.clone(),
            self.inner.exit_tx.clone(),
        ) {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                let mut registry = self.inner.registry.lock();
                if registry.get(&id).is_some_and(|entry| entry.generation == generation) {
                    registry.remove(&id);
                }
                tracing::error!(session_id = %id, "failed to start session: {}", e);
                return Err(e);
            }
        };

        let mut registry = self.inner.registry.lock();
        match registry.get_mut(&id) {
            Some(entry) if entry.generation == generation => {
                entry.state = EntryState::Running(handle);
                Ok(CreateOutcome::Created)
            }
            _ => {
                drop(registry);
                // Killed or replaced while spawning
                handle.suppress_exit_event();
                handle.kill();
                tracing::debug!(session_id = %id, "session removed during spawn");
                Err(self.unknown(&id))
            }
        }
    }

    fn spawn_spec(&self, request: &SessionRequest) -> SpawnSpec {
        let config = self.config();
        let shell = detect_shell(&config);

        let cwd = if request.cwd.is_dir() {
            request.cwd.clone()
        } else {
            let fallback = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
            tracing::warn!(
                session_id = %request.id,
                cwd = %request.cwd.display(),
                "working directory missing, starting in {}",
                fallback.display()
            );
            fallback
        };

        let env = match &self.inner.base_env {
            Some(base) => resolve_environment(base.iter().cloned(), &config, &cwd, &request.extra_env),
            None => resolve_environment(inherited_env(), &config, &cwd, &request.extra_env),
        };

        SpawnSpec {
            shell: shell.program,
            args: shell.args,
            env,
            size: request
                .size
                .unwrap_or_else(|| TermSize::new(config.default_cols, config.default_rows)),
            read_buffer_size: config.read_buffer_size,
            chunk_size: config.write_chunk_size,
            chunk_delay: config.write_chunk_delay(),
            cwd,
        }
    }

    /// Handle of a running session; exited entries are purged on the way.
    fn live_handle(&self, id: &SessionId) -> Result<Arc<PtyHandle>, SessionError> {
        let mut registry = self.inner.registry.lock();
        self.purge_if_exited(&mut registry, id);
        match registry.get(id).map(|entry| &entry.state) {
            Some(EntryState::Running(handle)) => Ok(handle.clone()),
            _ => Err(self.unknown(id)),
        }
    }

    fn purge_if_exited(&self, registry: &mut FxHashMap<SessionId, SessionEntry>, id: &SessionId) {
        if registry.get(id).is_some_and(|entry| !entry.is_live()) {
            registry.remove(id);
            tracing::debug!(session_id = %id, "purged exited session");
        }
    }

    fn unknown(&self, id: &SessionId) -> SessionError {
        tracing::debug!(session_id = %id, "unknown session");
        SessionError::UnknownSession(id.clone())
    }
}

fn inherited_env() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("sessions", &self.inner.registry.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn supervisor() -> (Supervisor, SessionEvents) {
        SupervisorBuilder::new(Config::default()).build()
    }

    #[test]
    fn test_unknown_session_operations_are_typed() {
        let (sup, _events) = supervisor();
        let id = SessionId::new("missing");

        assert!(sup.write(&id, b"ls\n").unwrap_err().is_unknown_session());
        assert!(sup.resize(&id, 80, 24).unwrap_err().is_unknown_session());
        assert!(sup.kill(&id).unwrap_err().is_unknown_session());
        assert!(sup.restart(&id, "/tmp").unwrap_err().is_unknown_session());
        assert!(sup.cwd(&id).unwrap_err().is_unknown_session());
        assert!(sup.info(&id).unwrap_err().is_unknown_session());
    }

    #[test]
    fn test_empty_supervisor_has_no_sessions() {
        let (sup, _events) = supervisor();
        assert!(!sup.has_open_sessions());
        assert!(sup.list().is_empty());
        assert_eq!(sup.kill_all(), 0);
        assert_eq!(sup.kill_workspace("ws"), 0);
    }

    #[test]
    fn test_request_builder() {
        let request = SessionRequest::new("t1", "/tmp")
            .in_workspace("ws-1")
            .with_env("FOO", "bar")
            .with_size(TermSize::new(80, 24));
        assert_eq!(request.id.as_str(), "t1");
        assert_eq!(request.workspace_id.as_deref(), Some("ws-1"));
        assert_eq!(request.extra_env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(request.size, Some(TermSize::new(80, 24)));
    }

    #[test]
    fn test_update_config_sanitizes() {
        let (sup, _events) = supervisor();
        sup.update_config(Config {
            write_chunk_size: 0,
            ..Config::default()
        });
        assert_eq!(sup.config().write_chunk_size, 2048);
    }

    #[cfg(unix)]
    fn sh_request(id: &str) -> (Supervisor, SessionEvents, SessionRequest) {
        let (sup, events) = SupervisorBuilder::new(Config {
            shell: Some("/bin/sh".to_string()),
            shell_args: Some(Vec::new()),
            ..Config::default()
        })
        .build();
        (sup, events, SessionRequest::new(id, std::env::temp_dir()))
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_while_spawning_discards_new_process() {
        let (sup, events, request) = sh_request("raced-kill");
        let generation = {
            let mut registry = sup.inner.registry.lock();
            sup.insert_placeholder(&mut registry, request.clone())
        };
        sup.kill(&request.id).unwrap();

        let err = sup.spawn_into(request.clone(), generation).unwrap_err();
        assert!(err.is_unknown_session());
        assert!(sup.info(&request.id).unwrap_err().is_unknown_session());
        assert!(!sup.has_open_sessions());
        // The discarded shell never reports an exit
        assert!(events
            .exit
            .recv_timeout(std::time::Duration::from_millis(500))
            .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_replaced_while_spawning_keeps_newer_entry() {
        let (sup, _events, request) = sh_request("raced-restart");
        let (stale, current) = {
            let mut registry = sup.inner.registry.lock();
            let stale = sup.insert_placeholder(&mut registry, request.clone());
            let current = sup.insert_placeholder(&mut registry, request.clone());
            (stale, current)
        };

        let err = sup.spawn_into(request.clone(), stale).unwrap_err();
        assert!(err.is_unknown_session());
        {
            let registry = sup.inner.registry.lock();
            let entry = registry.get(&request.id).unwrap();
            assert_eq!(entry.generation, current);
            assert!(matches!(entry.state, EntryState::Starting { .. }));
        }

        assert_eq!(
            sup.spawn_into(request.clone(), current).unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(sup.info(&request.id).unwrap().state, SessionState::Running);
        sup.kill_all();
    }

    #[test]
    fn test_clones_share_registry() {
        let (sup, _events) = supervisor();
        let other = sup.clone();
        assert_eq!(format!("{:?}", other), "Supervisor { sessions: 0 }");
        assert!(!sup.has_open_sessions());
    }
}
