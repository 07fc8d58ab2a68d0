//! termspace - headless host for the session backend
//!
//! Runs one shell session inside a workspace, bridges it to stdin/stdout
//! and keeps the workspace snapshot saved.

use anyhow::{bail, Context, Result};
use clap::Parser;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use terminal::{OutputEvent, SessionEvents, SessionId, Supervisor, SupervisorBuilder};
use termspace_workspace::{
    Autosaver, LiveSnapshot, SnapshotCodec, TerminalRecord, WorkspaceRecord, WorkspaceSnapshot,
};
use tracing::{debug, error, info, warn};

/// Application startup time for performance monitoring
static STARTUP_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Sent to the shell when stdin closes.
const END_OF_TRANSMISSION: &[u8] = b"\x04";

#[derive(Parser, Debug)]
#[command(name = "termspace", version, about = "Run a supervised shell session")]
struct Cli {
    /// Directory to start the shell in (defaults to the current directory)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Workspace the session belongs to, created when missing
    #[arg(long, default_value = "default")]
    workspace: String,

    /// Reload config.toml while running
    #[arg(long)]
    watch_config: bool,
}

/// Check if debug mode is enabled via environment variable.
fn is_debug_mode() -> bool {
    std::env::var("TERMSPACE_DEBUG").is_ok()
}

/// Initialize the logging system.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if is_debug_mode() {
        "termspace=trace,terminal=trace,termspace_workspace=trace,vault=debug,info"
    } else {
        "termspace=info,terminal=info,warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr; stdout carries the session output
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();

    info!("termspace v{} starting up", env!("CARGO_PKG_VERSION"));
}

fn resolve_cwd(requested: Option<PathBuf>) -> PathBuf {
    requested
        .or_else(|| std::env::current_dir().ok())
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Find the workspace named `name`, adding it when missing.
///
/// Returns its id and whether the document changed.
fn ensure_workspace(snapshot: &mut WorkspaceSnapshot, name: &str, folder: &Path) -> Result<(String, bool)> {
    if let Some(ws) = snapshot.workspaces.iter().find(|ws| ws.name == name) {
        if ws.is_locked {
            bail!("workspace {name:?} is locked");
        }
        let id = ws.id.clone();
        snapshot.active_workspace_id = Some(id.clone());
        return Ok((id, false));
    }
    let id = snapshot.add_workspace(WorkspaceRecord::new(name, folder));
    info!(workspace = name, "created workspace");
    Ok((id, true))
}

fn spawn_stdin_bridge(supervisor: Supervisor, id: SessionId) -> Result<()> {
    thread::Builder::new()
        .name("termspace-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut reader = stdin.lock();
            let mut line = String::new();
            loop {
                line.clear();
                let input: &[u8] = match reader.read_line(&mut line) {
                    Ok(0) => END_OF_TRANSMISSION,
                    Ok(_) => line.as_bytes(),
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        END_OF_TRANSMISSION
                    }
                };
                let done = input == END_OF_TRANSMISSION;
                if let Err(e) = supervisor.write(&id, input) {
                    debug!(session_id = %id, "input dropped: {}", e);
                    break;
                }
                if done {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin thread")?;
    Ok(())
}

fn spawn_stdout_bridge(output: std::sync::mpsc::Receiver<OutputEvent>) -> Result<()> {
    thread::Builder::new()
        .name("termspace-stdout".into())
        .spawn(move || {
            let stdout = std::io::stdout();
            for event in output {
                let mut out = stdout.lock();
                if out.write_all(&event.bytes).and_then(|_| out.flush()).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdout thread")?;
    Ok(())
}

fn run(cli: Cli) -> Result<i32> {
    if let Err(e) = termspace_paths::ensure_dirs() {
        error!("Failed to initialize paths: {:#}", e);
    }

    let config_path = settings::ensure_config_file();
    let config = settings::load_config();

    let data_dir = termspace_paths::resolve_config_directory()?;
    let codec = SnapshotCodec::from_config(data_dir, &config);
    let mut document = codec.load_or_default();

    let cwd = resolve_cwd(cli.cwd);
    let (workspace_id, added) = ensure_workspace(&mut document, &cli.workspace, &cwd)?;
    let terminal = TerminalRecord::new(workspace_id.clone(), "shell", cwd.clone());
    let session_id = SessionId::new(terminal.id.clone());
    document.focused_terminal_id = Some(terminal.id.clone());
    document.terminals.push(terminal);

    let (supervisor, events) = SupervisorBuilder::new(config.clone()).build();

    let _config_watcher = match (cli.watch_config, config_path) {
        (true, Some(path)) => {
            let supervisor = supervisor.clone();
            settings::watch_config(path, move |config| supervisor.update_config(config.clone()))
        }
        _ => None,
    };

    let document = Arc::new(Mutex::new(document));
    let autosaver = Autosaver::spawn(
        codec,
        LiveSnapshot::new(document.clone(), supervisor.clone()),
        config.autosave_interval(),
    )
    .context("Failed to start autosave")?;
    if added {
        autosaver.notify_changed();
    }

    supervisor
        .create_in_workspace(session_id.clone(), &cwd, workspace_id.as_str())
        .with_context(|| format!("Failed to start shell in {}", cwd.display()))?;
    info!(
        session_id = %session_id,
        cwd = %cwd.display(),
        "session ready in {:?}",
        STARTUP_TIME.elapsed()
    );

    let SessionEvents { output, exit } = events;
    spawn_stdout_bridge(output)?;
    spawn_stdin_bridge(supervisor.clone(), session_id.clone())?;

    let code = loop {
        let event = exit.recv().context("Session event channel closed")?;
        if event.session_id == session_id {
            break event.code;
        }
    };
    info!(session_id = %session_id, ?code, "shell exited");

    // The tab closes with its shell
    document.lock().remove_terminal(session_id.as_str());
    supervisor.kill_all();
    autosaver.shutdown();

    Ok(code.as_process_status())
}

fn main() {
    let _ = *STARTUP_TIME;

    init_logging();

    match run(Cli::parse()) {
        Ok(status) => std::process::exit(status),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
