//! UTF-8 boundary-safe framing of pty output.
//!
//! A read can stop anywhere, including between the bytes of one codepoint.
//! [`Utf8Framer`] holds back a trailing incomplete sequence (at most 3 bytes)
//! and prefixes it onto the next read, so no emitted frame ends mid-codepoint.
//! Invalid bytes are passed through untouched; the renderer decides how to
//! show them.

/// Length of the incomplete UTF-8 sequence at the end of `bytes`, or 0.
///
/// Only a valid lead byte followed by fewer continuation bytes than it
/// announces counts as incomplete.
pub fn incomplete_tail_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            // Continuation byte, keep looking for the lead
            continue;
        }
        let expected = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return 0,
        };
        return if back < expected { back } else { 0 };
    }
    0
}

/// Carries incomplete trailing sequences from one read into the next.
#[derive(Debug, Default)]
pub struct Utf8Framer {
    pending: Vec<u8>,
}

impl Utf8Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read's worth of bytes.
    ///
    /// Returns the frame to emit, or `None` when everything was held back.
    pub fn push(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        let mut frame = std::mem::take(&mut self.pending);
        frame.extend_from_slice(data);

        let keep = incomplete_tail_len(&frame);
        if keep > 0 {
            self.pending = frame.split_off(frame.len() - keep);
        }

        if frame.is_empty() {
            None
        } else {
            Some(frame)
        }
    }

    /// Bytes currently held back.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
