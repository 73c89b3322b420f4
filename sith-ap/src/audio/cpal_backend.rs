//! Audio output using cpal
//!
//! cpal is callback driven while the pipeline writes whole buffers. The two
//! meet in a lock-free single-producer single-consumer ring buffer sized to two
//! hardware buffers: [`AudioBackend::write`] pushes into it and sleeps while it
//! is full, and the device callback pops from it, emitting silence on underrun.
//! The write therefore blocks at real-time playback rate.

use super::backend::AudioBackend;
use super::types::StreamParams;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Give up on a write when the device consumed nothing for this long
const WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// cpal implementation of [`AudioBackend`]
pub struct CpalBackend {
    device: Device,
    stream: Option<Stream>,
    producer: Option<ringbuf::HeapProd<i16>>,
    params: Option<StreamParams>,
    underruns: Arc<AtomicU64>,
    stream_errors: Arc<AtomicU64>,
}

impl CpalBackend {
    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Initialize the audio subsystem on the default output device
    pub fn initialize() -> Result<Self> {
        Self::with_device(None)
    }

    /// Initialize the audio subsystem on a named device
    ///
    /// Falls back to the default device when the name is not found.
    pub fn with_device(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;

                match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    Some(device) => device,
                    None => {
                        warn!("Requested device '{}' not found, falling back to default device", name);
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        info!(
            device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
            "Audio subsystem initialized"
        );

        Ok(Self {
            device,
            stream: None,
            producer: None,
            params: None,
            underruns: Arc::new(AtomicU64::new(0)),
            stream_errors: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Device callbacks that found the ring buffer short
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Errors reported by the cpal error callback
    pub fn stream_errors(&self) -> u64 {
        self.stream_errors.load(Ordering::Relaxed)
    }

    fn build_stream(
        &self,
        config: &StreamConfig,
        sample_format: SampleFormat,
        mut consumer: ringbuf::HeapCons<i16>,
    ) -> Result<Stream> {
        let underruns = Arc::clone(&self.underruns);
        let stream_errors = Arc::clone(&self.stream_errors);
        let error_callback = move |err: cpal::StreamError| {
            error!("Audio stream error: {}", err);
            stream_errors.fetch_add(1, Ordering::Relaxed);
        };

        let stream = match sample_format {
            SampleFormat::I16 => self.device.build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let read = consumer.pop_slice(data);
                    if read < data.len() {
                        data[read..].fill(0);
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }
                },
                error_callback,
                None,
            ),
            SampleFormat::F32 => self.device.build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut short = false;
                    for sample in data.iter_mut() {
                        *sample = match consumer.try_pop() {
                            Some(s) => s as f32 / 32768.0,
                            None => {
                                short = true;
                                0.0
                            }
                        };
                    }
                    if short {
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }
                },
                error_callback,
                None,
            ),
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "Device sample format {:?}",
                    other
                )))
            }
        };

        stream.map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }
}

impl AudioBackend for CpalBackend {
    fn open(&mut self, params: StreamParams) -> Result<()> {
        let sample_format = self
            .device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?
            .sample_format();

        let config = StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(params.buffer_frames),
        };

        // Two hardware buffers: one being played, one being filled.
        let (producer, consumer) = HeapRb::<i16>::new(params.buffer_len() * 2).split();
        let stream = self.build_stream(&config, sample_format, consumer)?;

        debug!(
            "Opened output stream: sample_rate={}, channels={}, format={:?}, buffer_frames={}",
            params.sample_rate, params.channels, sample_format, params.buffer_frames
        );

        self.stream = Some(stream);
        self.producer = Some(producer);
        self.params = Some(params);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| Error::AudioOutput("No stream open".to_string()))?;
        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let (Some(producer), Some(params)) = (self.producer.as_mut(), self.params) else {
            return Err(Error::AudioOutput("No stream open".to_string()));
        };

        // Poll at a quarter of a buffer so the ring never runs dry while we sleep.
        let buffer_duration =
            Duration::from_secs_f64(params.buffer_frames as f64 / params.sample_rate as f64);
        let poll = (buffer_duration / 4).max(Duration::from_millis(1));

        let mut written = 0;
        let mut last_progress = Instant::now();
        while written < samples.len() {
            let pushed = producer.push_slice(&samples[written..]);
            written += pushed;
            if written == samples.len() {
                break;
            }

            if pushed > 0 {
                last_progress = Instant::now();
            } else if last_progress.elapsed() > WRITE_STALL_TIMEOUT {
                return Err(Error::AudioOutput(format!(
                    "Output stream stalled with {} samples unwritten",
                    samples.len() - written
                )));
            }
            std::thread::sleep(poll);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_ref() {
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stream = None;
        self.producer = None;
        self.params = None;
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        info!(
            underruns = self.underruns(),
            stream_errors = self.stream_errors(),
            "Audio subsystem terminated"
        );
        Ok(())
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        let _ = self.stop();
        let _ = self.close();
    }
}
