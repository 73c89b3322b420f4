//! Hardware audio backend seam
//!
//! The output pipeline drives exactly one implementation of [`AudioBackend`]
//! from its own thread. Implementations need not be `Send`: the backend is
//! created on that thread by an initializer closure and never leaves it.
//!
//! Lifecycle, strictly ordered:
//! `open -> start -> write* -> stop -> close` per stream, any number of streams,
//! then `terminate` exactly once.

use super::types::StreamParams;
use crate::error::Result;

pub trait AudioBackend {
    /// Open (but do not start) an output stream
    fn open(&mut self, params: StreamParams) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    /// Write interleaved samples, blocking until the device has room for them
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Release the stream opened by [`open`](Self::open)
    fn close(&mut self) -> Result<()>;

    /// Tear down the audio subsystem; no calls follow
    fn terminate(&mut self) -> Result<()>;
}
