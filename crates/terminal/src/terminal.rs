//! Session backend.
//!
//! Spawns and supervises pty-backed shells, streams their output without
//! splitting UTF-8 sequences, and paces large input writes.
//! This crate has no UI dependencies; the renderer talks to it through
//! [`Supervisor`] and the typed channels in [`SessionEvents`].

pub mod dotenv;
pub mod environment;
mod error;
mod exit_watcher;
mod pty_handler;
pub mod pump;
mod supervisor;
pub mod types;
pub mod utf8;
pub mod writer;

pub use error::SessionError;
pub use pty_handler::{PtyHandle, SpawnSpec};
pub use supervisor::{CreateOutcome, SessionEvents, SessionRequest, Supervisor, SupervisorBuilder};
pub use types::*;
