//! pcm-play - feed raw PCM through the audio output pipeline
//!
//! Reads interleaved signed 16-bit little-endian samples from a file (or stdin)
//! and delivers them in fixed-size chunks, the way the streaming backend does.
//! Refused chunks are retried after a short sleep. The input is padded with
//! silence up to a whole hardware buffer so the last samples are played rather
//! than left in the staging buffer at shutdown.
//!
//! Usage: `ffmpeg -i song.flac -f s16le -ar 44100 -ac 2 - | pcm-play --rate 44100`

use anyhow::{Context, Result};
use clap::Parser;
use sith_ap::audio::{AudioFormat, AudioOutputPipeline, CpalBackend};
use sith_common::Config;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sleep before redelivering a refused chunk
const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Command-line arguments for pcm-play
#[derive(Parser, Debug)]
#[command(name = "pcm-play")]
#[command(about = "Play raw s16le PCM through the sith-ap output pipeline")]
#[command(version)]
struct Args {
    /// Configuration file (falls back to SITH_CONFIG, then ~/.config/sith/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sample rate of the input
    #[arg(short, long, default_value = "44100", env = "SITH_PCM_RATE")]
    rate: u32,

    /// Channel count of the input
    #[arg(long, default_value = "2", env = "SITH_PCM_CHANNELS")]
    channels: u16,

    /// Bytes per delivered chunk
    #[arg(long, default_value = "8192", env = "SITH_PCM_CHUNK_BYTES")]
    chunk_bytes: usize,

    /// Input file; stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Print the available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    sith_ap::logging::init(&config.logging).context("Failed to initialize logging")?;

    if args.list_devices {
        for name in CpalBackend::list_devices().context("Failed to list output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut input: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let format = AudioFormat::int16(args.rate, args.channels);
    info!(%format, chunk_bytes = args.chunk_bytes, "Starting playback");

    let pipeline = AudioOutputPipeline::start(&config.audio, CpalBackend::initialize)
        .context("Failed to start audio output")?;

    // Whole samples only, so no chunk splits one
    let mut chunk = vec![0u8; args.chunk_bytes.max(2) & !1];
    let mut total: u64 = 0;
    loop {
        let read = read_chunk(&mut input, &mut chunk).context("Failed to read input")?;
        if read == 0 {
            break;
        }

        deliver(&pipeline, format, &chunk[..read]);
        total += read as u64;

        if let Some(e) = pipeline.take_error() {
            warn!("Audio output reported: {}", e);
        }
    }

    let padding = tail_padding(total, config.audio.buffer_frames, args.channels);
    if padding > 0 {
        debug!(bytes = padding, "Padding final buffer with silence");
        deliver(&pipeline, format, &vec![0u8; padding]);
    }

    // Let the queue drain before tearing down the device
    while pipeline.stats().frames_rendered < pipeline.stats().frames_accepted {
        std::thread::sleep(RETRY_DELAY);
    }
    pipeline.shutdown();

    info!(bytes = total, stats = ?pipeline.stats(), "Playback finished");
    Ok(())
}

/// Hand a chunk to the pipeline, retrying while it is refused
fn deliver(pipeline: &AudioOutputPipeline, format: AudioFormat, bytes: &[u8]) {
    while pipeline.write_audio(format, bytes) == 0 {
        std::thread::sleep(RETRY_DELAY);
    }
}

/// Zero bytes needed after `total` input bytes to complete the last hardware buffer
///
/// A trailing odd byte is not a sample and does not count.
fn tail_padding(total: u64, buffer_frames: u32, channels: u16) -> usize {
    let buffer_len = u64::from(buffer_frames) * u64::from(channels);
    if buffer_len == 0 {
        return 0;
    }
    let samples = total / 2;
    (((buffer_len - samples % buffer_len) % buffer_len) * 2) as usize
}

/// Fill `buf` as far as the input allows; returns 0 only at end of input
fn read_chunk(input: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
