//! CLI entry point for sdr-daq.
//!
//! Runs acquisitions against the software emulator:
//!
//! ```bash
//! # Stream for two seconds and report segment statistics
//! sdr-daq capture --buffer-size 512000 --packet-size 153600 --seconds 2
//!
//! # Acquire exactly one packet and write it to a file
//! sdr-daq capture --single --output samples.bin
//!
//! # Load transfer parameters from a TOML profile
//! sdr-daq capture --config profile.toml
//!
//! # Verify the diagnostic counter pattern end to end
//! sdr-daq selftest
//! ```
//!
//! Persistence and statistics live here, on the caller side of the handler
//! seam; the engine itself never touches files.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use sdr_core::config::{TransferConfig, TransferMode};
use sdr_core::source::SampleSource;
use sdr_core::state::EngineState;
use sdr_driver_emulator::SdrEmulator;
use sdr_engine::StreamEngine;
use serde::Deserialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "sdr-daq")]
#[command(about = "Ring-buffered sample acquisition against the software emulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream samples into the ring buffer and report segment statistics
    Capture {
        /// TOML profile with transfer parameters; overrides the size/mode
        /// flags below
        #[arg(long)]
        config: Option<PathBuf>,

        /// Ring buffer capacity in bytes
        #[arg(long, default_value_t = 512_000)]
        buffer_size: usize,

        /// Packet (chunk) size in bytes
        #[arg(long, default_value_t = 128_000)]
        packet_size: usize,

        /// Acquire exactly one packet instead of streaming
        #[arg(long)]
        single: bool,

        /// Streaming duration in seconds (loop mode)
        #[arg(long, default_value_t = 2.0)]
        seconds: f64,

        /// Center frequency in Hz
        #[arg(long, default_value_t = 100_000_000)]
        frequency: u64,

        /// Sample rate in samples per second
        #[arg(long, default_value_t = 1_000_000)]
        sample_rate: u32,

        /// Effective gain level in tenths of a dB
        #[arg(long)]
        gain: Option<u32>,

        /// Write received segments to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Emulator seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Stream the diagnostic counter pattern and verify its continuity
    Selftest {
        /// Ring buffer capacity in bytes
        #[arg(long, default_value_t = 1000)]
        buffer_size: usize,

        /// Packet (chunk) size in bytes; non-divisible sizes exercise the
        /// wraparound path
        #[arg(long, default_value_t = 350)]
        packet_size: usize,

        /// Streaming duration in seconds
        #[arg(long, default_value_t = 1.0)]
        seconds: f64,
    },
}

/// Acquisition profile loadable from a TOML file.
#[derive(Debug, Clone, Deserialize)]
struct Profile {
    transfer: TransferConfig,
    #[serde(default)]
    frequency_hz: Option<u64>,
    #[serde(default)]
    sample_rate_hz: Option<u32>,
    #[serde(default)]
    gain_tenth_db: Option<u32>,
}

fn load_profile(path: &Path) -> Result<Profile> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .build()
        .with_context(|| format!("failed to read profile {}", path.display()))?;
    settings
        .try_deserialize()
        .with_context(|| format!("invalid profile {}", path.display()))
}

fn wait_for_waiting(engine: &StreamEngine, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while engine.state() != EngineState::Waiting {
        if Instant::now() >= deadline {
            bail!("acquisition did not finish within {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_capture(
    config: Option<PathBuf>,
    buffer_size: usize,
    packet_size: usize,
    single: bool,
    seconds: f64,
    frequency: u64,
    sample_rate: u32,
    gain: Option<u32>,
    output: Option<PathBuf>,
    seed: u64,
) -> Result<()> {
    let mode = if single {
        TransferMode::Single
    } else {
        TransferMode::Loop
    };
    let (transfer, frequency, sample_rate, gain) = match config {
        Some(path) => {
            let profile = load_profile(&path)?;
            (
                profile.transfer,
                profile.frequency_hz.unwrap_or(frequency),
                profile.sample_rate_hz.unwrap_or(sample_rate),
                profile.gain_tenth_db.or(gain),
            )
        }
        None => (
            TransferConfig::new(mode, buffer_size, packet_size)?,
            frequency,
            sample_rate,
            gain,
        ),
    };

    let mut emulator = SdrEmulator::builder().seed(seed).build();
    emulator.open()?;
    let mut engine = StreamEngine::with_source(emulator, transfer)?;
    engine.set_sample_rate(sample_rate)?;
    engine.set_frequency(frequency)?;
    if let Some(gain) = gain {
        engine.set_level(gain)?;
        info!(
            requested = gain,
            applied = engine.level(),
            "gain level set"
        );
    }

    let bytes = Arc::new(AtomicU64::new(0));
    let segments = Arc::new(AtomicU64::new(0));
    let bytes_for_handler = Arc::clone(&bytes);
    let segments_for_handler = Arc::clone(&segments);
    let mut sink = match output {
        Some(path) => Some(
            File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => None,
    };
    engine.set_handler(move |_offset, data| {
        bytes_for_handler.fetch_add(data.len() as u64, Ordering::Relaxed);
        segments_for_handler.fetch_add(1, Ordering::Relaxed);
        if let Some(file) = sink.as_mut() {
            if let Err(err) = file.write_all(data) {
                // The handler must not panic; report and keep streaming.
                error!(error = %err, "failed to write segment");
            }
        }
    });

    engine.initialize()?;
    let started = Instant::now();
    engine.start()?;

    match transfer.mode {
        TransferMode::Single => {
            wait_for_waiting(&engine, Duration::from_secs(600))?;
        }
        TransferMode::Loop => {
            std::thread::sleep(Duration::from_secs_f64(seconds));
            if let Err(err) = engine.stop() {
                warn!(error = %err, "acquisition stopped on error");
            }
        }
    }
    if let Some(err) = engine.take_last_error() {
        warn!(error = %err, "worker recorded an error");
    }
    info!(
        bytes = bytes.load(Ordering::Relaxed),
        segments = segments.load(Ordering::Relaxed),
        elapsed_s = started.elapsed().as_secs_f64(),
        "capture finished"
    );
    engine.finalize();
    Ok(())
}

fn run_selftest(buffer_size: usize, packet_size: usize, seconds: f64) -> Result<()> {
    let mut emulator = SdrEmulator::builder().unpaced().build();
    emulator.open()?;
    let transfer = TransferConfig::new(TransferMode::Loop, buffer_size, packet_size)?;
    let mut engine = StreamEngine::with_source(emulator, transfer)?;

    let collected: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    engine.set_handler(move |_offset, data| sink.lock().extend_from_slice(data));

    engine.initialize()?;
    engine.start_diagnostic()?;
    std::thread::sleep(Duration::from_secs_f64(seconds));
    engine.stop()?;
    engine.finalize();

    let data = std::mem::take(&mut *collected.lock());
    if data.is_empty() {
        bail!("self-test produced no data");
    }
    for (i, &byte) in data.iter().enumerate() {
        let expected = (i % 256) as u8;
        if byte != expected {
            bail!(
                "counter discontinuity at byte {}: expected {}, got {}",
                i,
                expected,
                byte
            );
        }
    }
    info!(bytes = data.len(), "self-test passed");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Capture {
            config,
            buffer_size,
            packet_size,
            single,
            seconds,
            frequency,
            sample_rate,
            gain,
            output,
            seed,
        } => run_capture(
            config,
            buffer_size,
            packet_size,
            single,
            seconds,
            frequency,
            sample_rate,
            gain,
            output,
            seed,
        ),
        Commands::Selftest {
            buffer_size,
            packet_size,
            seconds,
        } => run_selftest(buffer_size, packet_size, seconds),
    }
}
