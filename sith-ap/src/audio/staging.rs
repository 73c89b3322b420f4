//! Fixed-size staging buffer between decoded bytes and hardware writes
//!
//! Incoming chunks have arbitrary sizes; the hardware wants whole buffers.
//! Samples are converted into a buffer of exactly one hardware buffer length,
//! which is flushed each time it fills and then reused from the start.

use crate::error::Result;

pub struct StagingBuffer {
    samples: Vec<i16>,
    filled: usize,
}

impl StagingBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0; len],
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Samples waiting for the next flush
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Change the buffer length, discarding anything pending
    pub fn resize(&mut self, len: usize) {
        self.samples.clear();
        self.samples.resize(len, 0);
        self.filled = 0;
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Convert little-endian byte pairs into samples, flushing every full buffer
    ///
    /// A trailing odd byte is ignored. If `flush` fails the buffer is emptied
    /// and the rest of `bytes` is dropped.
    pub fn push_le_bytes<F>(&mut self, bytes: &[u8], mut flush: F) -> Result<()>
    where
        F: FnMut(&[i16]) -> Result<()>,
    {
        if self.samples.is_empty() {
            return Ok(());
        }

        for pair in bytes.chunks_exact(2) {
            self.samples[self.filled] = i16::from_le_bytes([pair[0], pair[1]]);
            self.filled += 1;

            if self.filled == self.samples.len() {
                self.filled = 0;
                flush(&self.samples)?;
            }
        }
        Ok(())
    }

    /// Flush whatever is pending, even if the buffer is not full
    pub fn flush_partial<F>(&mut self, mut flush: F) -> Result<()>
    where
        F: FnMut(&[i16]) -> Result<()>,
    {
        if self.filled == 0 {
            return Ok(());
        }
        let filled = self.filled;
        self.filled = 0;
        flush(&self.samples[..filled])
    }
}
