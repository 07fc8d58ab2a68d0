//! Exit watcher: one blocking waiter thread per session.
//!
//! The watcher owns the child process handle. When the child terminates it
//! waits briefly for the output pump to drain, records the exit code on the
//! shared [`SessionLifecycle`] and sends exactly one [`ExitEvent`]. It never
//! touches the supervisor's registry.

use crate::types::{ExitCode, ExitEvent, SessionId};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Flags shared between a pty handle, its pump and its watcher.
#[derive(Debug, Default)]
pub(crate) struct SessionLifecycle {
    /// Set once, by the watcher, when the child has been reaped.
    pub(crate) exit: OnceLock<ExitCode>,
    /// Set by an explicit kill; the exit is then reported as `Signaled`.
    pub(crate) killed: AtomicBool,
    /// Set when a restart replaces this process under the same id.
    pub(crate) suppress_exit: AtomicBool,
    /// Tells the pump to stop after its current read.
    pub(crate) shutdown: AtomicBool,
}

impl SessionLifecycle {
    pub(crate) fn exit_code(&self) -> Option<ExitCode> {
        self.exit.get().copied()
    }

    pub(crate) fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

/// Something that blocks until a process exits.
pub(crate) trait ProcessWaiter: Send {
    fn wait_for_exit(&mut self) -> io::Result<u32>;
}

impl ProcessWaiter for Box<dyn portable_pty::Child + Send + Sync> {
    fn wait_for_exit(&mut self) -> io::Result<u32> {
        self.wait().map(|status| status.exit_code())
    }
}

pub(crate) struct ExitWatch<W> {
    pub(crate) session_id: SessionId,
    pub(crate) child: W,
    pub(crate) lifecycle: Arc<SessionLifecycle>,
    pub(crate) pump_done: Receiver<()>,
    pub(crate) exit_tx: Sender<ExitEvent>,
    pub(crate) drain_timeout: Duration,
}

pub(crate) fn spawn<W: ProcessWaiter + 'static>(watch: ExitWatch<W>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("termspace-exit-{}", watch.session_id))
        .spawn(move || run(watch))
}

pub(crate) fn run<W: ProcessWaiter>(mut watch: ExitWatch<W>) {
    let status = watch.child.wait_for_exit();

    let code = match status {
        _ if watch.lifecycle.is_killed() => ExitCode::Signaled,
        Ok(code) => ExitCode::Code(code),
        Err(e) => {
            tracing::debug!(session_id = %watch.session_id, "wait failed: {}", e);
            ExitCode::Signaled
        }
    };

    // Let trailing output reach the sink before the exit notification
    match watch.pump_done.recv_timeout(watch.drain_timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        Err(RecvTimeoutError::Timeout) => {
            tracing::debug!(session_id = %watch.session_id, "output pump still draining at exit");
        }
    }

    if watch.lifecycle.exit.set(code).is_err() {
        util::debug_panic!("exit recorded twice for session {}", watch.session_id);
        return;
    }
    watch.lifecycle.shutdown.store(true, Ordering::Release);

    if watch.lifecycle.suppress_exit.load(Ordering::Acquire) {
        tracing::debug!(session_id = %watch.session_id, %code, "exit event suppressed");
        return;
    }

    tracing::info!(session_id = %watch.session_id, %code, "session exited");
    let _ = watch.exit_tx.send(ExitEvent {
        session_id: watch.session_id,
        code,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;

    struct FakeChild(Option<io::Result<u32>>);

    impl ProcessWaiter for FakeChild {
        fn wait_for_exit(&mut self) -> io::Result<u32> {
            self.0.take().unwrap_or(Ok(0))
        }
    }

    fn watch(
        result: io::Result<u32>,
    ) -> (ExitWatch<FakeChild>, Arc<SessionLifecycle>, mpsc::Receiver<ExitEvent>) {
        let lifecycle = Arc::new(SessionLifecycle::default());
        let (exit_tx, exit_rx) = mpsc::channel();
        let (pump_tx, pump_done) = mpsc::channel();
        drop(pump_tx);
        let watch = ExitWatch {
            session_id: SessionId::new("t1"),
            child: FakeChild(Some(result)),
            lifecycle: lifecycle.clone(),
            pump_done,
            exit_tx,
            drain_timeout: Duration::from_millis(10),
        };
        (watch, lifecycle, exit_rx)
    }

    #[test]
    fn test_reports_exit_code_once() {
        let (w, lifecycle, rx) = watch(Ok(3));
        run(w);

        let event = rx.recv().unwrap();
        assert_eq!(event.session_id.as_str(), "t1");
        assert_eq!(event.code, ExitCode::Code(3));
        assert!(rx.try_recv().is_err());
        assert_eq!(lifecycle.exit_code(), Some(ExitCode::Code(3)));
        assert!(lifecycle.shutdown.load(Ordering::Acquire));
    }

    #[test]
    fn test_killed_child_reports_signaled() {
        let (w, lifecycle, rx) = watch(Ok(1));
        lifecycle.killed.store(true, Ordering::Release);
        run(w);
        assert_eq!(rx.recv().unwrap().code, ExitCode::Signaled);
    }

    #[test]
    fn test_wait_error_reports_signaled() {
        let (w, _lifecycle, rx) = watch(Err(io::Error::other("ECHILD")));
        run(w);
        assert_eq!(rx.recv().unwrap().code, ExitCode::Signaled);
    }

    #[test]
    fn test_suppressed_exit_records_code_without_event() {
        let (w, lifecycle, rx) = watch(Ok(0));
        lifecycle.suppress_exit.store(true, Ordering::Release);
        run(w);
        assert!(rx.try_recv().is_err());
        assert_eq!(lifecycle.exit_code(), Some(ExitCode::Code(0)));
    }

    #[test]
    fn test_waits_for_pump_before_notifying() {
        let lifecycle = Arc::new(SessionLifecycle::default());
        let (exit_tx, exit_rx) = mpsc::channel();
        let (pump_tx, pump_done) = mpsc::channel::<()>();
        let handle = spawn(ExitWatch {
            session_id: SessionId::new("t2"),
            child: FakeChild(Some(Ok(0))),
            lifecycle,
            pump_done,
            exit_tx,
            drain_timeout: Duration::from_secs(5),
        })
        .unwrap();

        assert!(exit_rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(pump_tx);
        assert_eq!(
            exit_rx.recv_timeout(Duration::from_secs(5)).unwrap().code,
            ExitCode::Code(0)
        );
        handle.join().unwrap();
    }
}
