//! Audio output
//!
//! Decoded PCM flows from the backend's decoder threads through
//! [`AudioOutputPipeline`] to a hardware [`AudioBackend`] ([`CpalBackend`] in
//! production).

pub mod backend;
pub mod cpal_backend;
pub mod pipeline;
pub mod staging;
pub mod types;

pub use backend::AudioBackend;
pub use cpal_backend::CpalBackend;
pub use pipeline::{AudioOutputPipeline, PipelineStats};
pub use types::{AudioFormat, AudioFrame, SampleType, StreamParams};
