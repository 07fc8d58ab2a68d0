use crate::types::SessionId;

/// Failures reported by the session backend.
///
/// `UnknownSession` is benign: the UI treats it as "already gone".
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("failed to spawn {shell:?} for session {id}: {source}")]
    SpawnFailure {
        id: SessionId,
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pty I/O error for session {id}: {source}")]
    DeviceIo {
        id: SessionId,
        #[source]
        source: std::io::Error,
    },

    #[error("could not allocate a pseudo-terminal: {0}")]
    PtyUnavailable(#[source] std::io::Error),
}

impl SessionError {
    /// True when the session simply no longer exists.
    pub fn is_unknown_session(&self) -> bool {
        matches!(self, Self::UnknownSession(_))
    }
}
