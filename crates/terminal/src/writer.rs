//! Chunked, paced input writes.
//!
//! Pasting a large buffer into a pty in one write can overflow the line
//! discipline or the foreground program's input handling. Writes larger than
//! one chunk are split and paced with a short sleep between chunks.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

/// Wraps a pty writer and applies the chunking policy.
///
/// Callers serialize access (the supervisor keeps one behind a mutex), so
/// bytes from different writes never interleave.
pub struct InputWriter<W: Write> {
    inner: W,
    chunk_size: usize,
    delay: Duration,
}

impl<W: Write> InputWriter<W> {
    pub fn new(inner: W, chunk_size: usize, delay: Duration) -> Self {
        Self {
            inner,
            chunk_size: chunk_size.max(1),
            delay,
        }
    }

    /// Write all of `data`, returning how many device writes were issued.
    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        if data.len() <= self.chunk_size {
            self.inner.write_all(data)?;
            self.inner.flush()?;
            return Ok(1);
        }

        let mut writes = 0;
        for (i, chunk) in data.chunks(self.chunk_size).enumerate() {
            if i > 0 && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            self.inner.write_all(chunk)?;
            self.inner.flush()?;
            writes += 1;
        }
        Ok(writes)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}
