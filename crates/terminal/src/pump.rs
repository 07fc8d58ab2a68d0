//! Output pump: pty reader to UTF-8 safe frames.
//!
//! One pump thread runs per session. It blocks in `read`, runs every chunk
//! through a [`Utf8Framer`] and hands complete frames to a [`FrameSink`].
//! The loop ends on EOF, a read error, the shutdown flag or a sink that
//! stops accepting frames. Bytes already read are always framed before the
//! shutdown flag is looked at again.

use crate::types::{OutputEvent, SessionId};
use crate::utf8::Utf8Framer;
use parking_lot::Mutex;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;

/// Receives frames from the pump.
pub trait FrameSink: Send {
    /// Deliver one frame. Returning `false` stops the pump.
    fn frame(&mut self, bytes: Vec<u8>) -> bool;
}

impl FrameSink for Vec<Vec<u8>> {
    fn frame(&mut self, bytes: Vec<u8>) -> bool {
        self.push(bytes);
        true
    }
}

/// Why the pump loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    Eof,
    ReadError,
    Shutdown,
    SinkClosed,
}

/// Read until the device closes, emitting UTF-8 safe frames.
///
/// An incomplete sequence still held back at the end is dropped; the
/// device will never complete it.
pub fn run_output_pump<R: Read, S: FrameSink>(
    mut reader: R,
    sink: &mut S,
    buffer_size: usize,
    shutdown: &AtomicBool,
) -> PumpEnd {
    let mut buf = vec![0u8; buffer_size.max(4)];
    let mut framer = Utf8Framer::new();

    loop {
        if shutdown.load(Ordering::Acquire) {
            return PumpEnd::Shutdown;
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => return PumpEnd::Eof,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO is how Linux reports a closed pty slave
                tracing::debug!("pty read ended: {}", e);
                return PumpEnd::ReadError;
            }
        };

        if let Some(frame) = framer.push(&buf[..n]) {
            if !sink.frame(frame) {
                return PumpEnd::SinkClosed;
            }
        }
    }
}

/// Sink that tags frames with their session and forwards them to the
/// supervisor's output channel.
pub(crate) struct OutputForwarder {
    pub(crate) session_id: SessionId,
    pub(crate) tx: Sender<OutputEvent>,
    pub(crate) last_activity: Arc<Mutex<Instant>>,
}

impl FrameSink for OutputForwarder {
    fn frame(&mut self, bytes: Vec<u8>) -> bool {
        *self.last_activity.lock() = Instant::now();
        self.tx
            .send(OutputEvent {
                session_id: self.session_id.clone(),
                bytes,
            })
            .is_ok()
    }
}
