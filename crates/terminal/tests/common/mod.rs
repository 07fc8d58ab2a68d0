//! Shared fixtures for supervisor integration tests.

#![allow(dead_code)]

use settings::Config;
use std::time::{Duration, Instant};
use terminal::{ExitEvent, SessionEvents, SessionId, Supervisor, SupervisorBuilder};

pub use tempfile::{tempdir, TempDir};

/// Upper bound for anything that waits on a real shell.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Window used to assert that something does *not* happen.
pub const QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Supervisor running plain `/bin/sh` with a fixed, minimal environment.
pub fn sh_supervisor() -> (Supervisor, SessionEvents) {
    let config = Config {
        shell: Some("/bin/sh".to_string()),
        shell_args: Some(Vec::new()),
        write_chunk_delay_ms: 0,
        ..Config::default()
    };
    SupervisorBuilder::new(config)
        .base_environment([
            ("PATH".to_string(), "/usr/bin:/bin".to_string()),
            ("PS1".to_string(), "$ ".to_string()),
        ])
        .build()
}

/// Collect output for `id` until `needle` appears or the timeout expires.
pub fn wait_for_output(events: &SessionEvents, id: &SessionId, needle: &str) -> Option<String> {
    let deadline = Instant::now() + DEFAULT_TIMEOUT;
    let mut seen = Vec::new();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let Ok(event) = events.output.recv_timeout(remaining) else {
            break;
        };
        assert_eq!(
            terminal::utf8::incomplete_tail_len(&event.bytes),
            0,
            "frame ends mid-codepoint"
        );
        if &event.session_id != id {
            continue;
        }
        seen.extend_from_slice(&event.bytes);
        let text = String::from_utf8_lossy(&seen);
        if text.contains(needle) {
            return Some(text.into_owned());
        }
    }
    None
}

/// Next exit event, if one arrives in time.
pub fn wait_for_exit(events: &SessionEvents) -> Option<ExitEvent> {
    events.exit.recv_timeout(DEFAULT_TIMEOUT).ok()
}
