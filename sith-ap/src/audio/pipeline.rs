//! Adaptive audio output pipeline
//!
//! The backend decoder hands over chunks of PCM from its own threads at
//! irregular sizes and intervals. [`AudioOutputPipeline::write_audio`] puts them
//! on a bounded queue without ever blocking; when the queue is full the chunk
//! is refused (0 bytes accepted) and the backend redelivers it later.
//!
//! A dedicated output thread drains the queue. For each chunk it makes sure the
//! hardware stream matches the chunk's channel count and sample rate, reopening
//! the stream when they differ, then converts the bytes into the staging buffer
//! and flushes full buffers to the device with a blocking write.
//!
//! Failures never stop the thread. They are logged and parked in an error slot
//! (latest wins) that the owner can poll with [`AudioOutputPipeline::take_error`].

use super::backend::AudioBackend;
use super::staging::StagingBuffer;
use super::types::{AudioFormat, AudioFrame, SampleType, StreamParams};
use crate::error::{Error, Result};
use sith_common::config::AudioConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often an idle output thread checks for shutdown
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Counters exposed for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Chunks accepted by `write_audio`
    pub frames_accepted: u64,
    /// Chunks refused because the queue was full (or the pipeline stopped)
    pub frames_dropped: u64,
    /// Chunks fully processed by the output thread
    pub frames_rendered: u64,
    /// Hardware streams opened so far
    pub streams_opened: u64,
}

#[derive(Default)]
struct Counters {
    frames_accepted: AtomicU64,
    frames_dropped: AtomicU64,
    frames_rendered: AtomicU64,
    streams_opened: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
        }
    }
}

/// Single-value error slot; a newer error replaces an unread one
#[derive(Clone, Default)]
struct ErrorSlot(Arc<Mutex<Option<Error>>>);

impl ErrorSlot {
    fn report(&self, err: Error) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    fn take(&self) -> Option<Error> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Producer side of the pipeline
pub struct AudioOutputPipeline {
    tx: SyncSender<AudioFrame>,
    running: Arc<AtomicBool>,
    errors: ErrorSlot,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AudioOutputPipeline {
    /// Start the output thread
    ///
    /// `init` runs on the output thread and brings up the audio subsystem. Its
    /// failure is fatal and returned here.
    pub fn start<B, F>(config: &AudioConfig, init: F) -> Result<Self>
    where
        B: AudioBackend + 'static,
        F: FnOnce() -> Result<B> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(config.queue_capacity);
        let (ready_tx, ready_rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let errors = ErrorSlot::default();
        let counters = Arc::new(Counters::default());

        let worker_running = Arc::clone(&running);
        let worker_errors = errors.clone();
        let worker_counters = Arc::clone(&counters);
        let buffer_frames = config.buffer_frames;
        let backoff = config.reconfigure_backoff();

        let worker = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let backend = match init() {
                    Ok(backend) => {
                        let _ = ready_tx.send(Ok(()));
                        backend
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                OutputWorker {
                    backend,
                    rx,
                    running: worker_running,
                    errors: worker_errors,
                    counters: worker_counters,
                    stream: None,
                    staging: StagingBuffer::new(0),
                    buffer_frames,
                    backoff,
                    consecutive_failures: 0,
                }
                .run();
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(Error::AudioOutput(
                    "Audio output thread exited during initialization".to_string(),
                ));
            }
        }

        info!(
            queue_capacity = config.queue_capacity,
            buffer_frames, "Audio output pipeline started"
        );

        Ok(Self {
            tx,
            running,
            errors,
            counters,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Hand over one chunk of decoded audio
    ///
    /// Never blocks. Returns `bytes.len()` when the chunk was queued, or 0 when
    /// it was refused because the queue is full or the pipeline has stopped.
    pub fn write_audio(&self, format: AudioFormat, bytes: &[u8]) -> usize {
        if !self.running.load(Ordering::Acquire) {
            return 0;
        }

        match self.tx.try_send(AudioFrame::new(format, bytes)) {
            Ok(()) => {
                self.counters.frames_accepted.fetch_add(1, Ordering::Relaxed);
                bytes.len()
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Most recent unread error from the output thread
    pub fn take_error(&self) -> Option<Error> {
        self.errors.take()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the output thread and wait for it to release the device
    ///
    /// Queued chunks are discarded. Idempotent.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("Audio output thread panicked");
            }
            info!("Audio output pipeline stopped");
        }
    }
}

impl Drop for AudioOutputPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Consumer side, owned by the output thread
struct OutputWorker<B: AudioBackend> {
    backend: B,
    rx: Receiver<AudioFrame>,
    running: Arc<AtomicBool>,
    errors: ErrorSlot,
    counters: Arc<Counters>,
    /// Parameters of the open stream, if any
    stream: Option<StreamParams>,
    staging: StagingBuffer,
    buffer_frames: u32,
    backoff: Duration,
    consecutive_failures: u32,
}

impl<B: AudioBackend> OutputWorker<B> {
    fn run(mut self) {
        debug!("Audio output thread running");
        while self.running.load(Ordering::Acquire) {
            match self.rx.recv_timeout(SHUTDOWN_POLL) {
                Ok(frame) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    self.render(frame);
                    self.counters.frames_rendered.fetch_add(1, Ordering::Relaxed);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.shutdown();
    }

    fn render(&mut self, frame: AudioFrame) {
        match self.ensure_stream(&frame.format) {
            Ok(()) => self.consecutive_failures = 0,
            Err(e) => {
                self.report(e);
                self.consecutive_failures += 1;
                if self.consecutive_failures > 1 {
                    warn!(
                        failures = self.consecutive_failures,
                        "Repeated stream configuration failures, backing off for {:?}",
                        self.backoff
                    );
                    std::thread::sleep(self.backoff);
                }
                return;
            }
        }

        let backend = &mut self.backend;
        if let Err(e) = self
            .staging
            .push_le_bytes(&frame.bytes, |samples| backend.write(samples))
        {
            self.report(e);
            // Reopen on the next chunk rather than keep writing to a broken stream.
            self.close_stream();
        }
    }

    /// Make the open stream match `format`, reopening it if needed
    fn ensure_stream(&mut self, format: &AudioFormat) -> Result<()> {
        if format.sample_type != SampleType::Int16 {
            return Err(Error::UnsupportedFormat(format.to_string()));
        }
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(Error::UnsupportedFormat(format.to_string()));
        }

        if let Some(current) = self.stream {
            if current.matches(format) {
                return Ok(());
            }
            info!(
                from_rate = current.sample_rate,
                from_channels = current.channels,
                to_rate = format.sample_rate,
                to_channels = format.channels,
                "Audio format changed, reopening output stream"
            );
            // Samples of the old format go to the old stream only.
            let backend = &mut self.backend;
            if let Err(e) = self.staging.flush_partial(|samples| backend.write(samples)) {
                warn!("Failed to flush pending samples before reconfiguration: {}", e);
            }
            self.close_stream();
        }

        let params = StreamParams {
            channels: format.channels,
            sample_rate: format.sample_rate,
            buffer_frames: self.buffer_frames,
        };

        self.backend.open(params)?;
        if let Err(e) = self.backend.start() {
            if let Err(close_err) = self.backend.close() {
                warn!("Failed to close stream after start failure: {}", close_err);
            }
            return Err(e);
        }

        self.staging.resize(params.buffer_len());
        self.stream = Some(params);
        self.counters.streams_opened.fetch_add(1, Ordering::Relaxed);
        info!(
            sample_rate = params.sample_rate,
            channels = params.channels,
            buffer_frames = params.buffer_frames,
            "Output stream opened"
        );
        Ok(())
    }

    /// Stop then close the open stream, if any
    fn close_stream(&mut self) {
        if self.stream.take().is_none() {
            return;
        }
        self.staging.clear();
        if let Err(e) = self.backend.stop() {
            warn!("Failed to stop output stream: {}", e);
        }
        if let Err(e) = self.backend.close() {
            warn!("Failed to close output stream: {}", e);
        }
    }

    fn report(&self, err: Error) {
        error!("Audio output error: {}", err);
        self.errors.report(err);
    }

    /// Stop stream, close stream, release the subsystem; in that order
    fn shutdown(mut self) {
        self.close_stream();
        if let Err(e) = self.backend.terminate() {
            warn!("Failed to terminate audio subsystem: {}", e);
        }
        debug!("Audio output thread finished");
    }
}
