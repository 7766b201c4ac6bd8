//! Record microphone audio, process it through vqe, and write WAV files.
//!
//! Writes both raw (unprocessed) and processed audio to separate files so you
//! can compare them. Optionally records a debug trace that the `unpack`
//! example turns back into WAV files.
//!
//! The input device must support the requested rate (8, 16 or 32 kHz).
//!
//! ```sh
//! cargo run -p vqe --features examples --example recording -- --duration 5 --ns --agc
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::WavWriter;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{info, warn};

use vqe::config::GainControlMode;
use vqe::{AudioFrame, AudioProcessing};

mod common;

#[derive(Parser, Debug)]
#[command(about = "Record and process microphone audio through vqe")]
struct Args {
    /// Recording duration in seconds.
    #[arg(short, long, default_value_t = 5)]
    duration: u64,

    /// Processing rate in Hz (8000, 16000 or 32000).
    #[arg(long, default_value_t = 16_000)]
    sample_rate: u32,

    /// Path for the raw (unprocessed) recording.
    #[arg(long, default_value = "raw.wav")]
    raw_output: PathBuf,

    /// Path for the processed recording.
    #[arg(long, default_value = "processed.wav")]
    processed_output: PathBuf,

    /// Also write a debug trace of every input frame.
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Enable the high-pass filter.
    #[arg(long)]
    hpf: bool,

    /// Enable noise suppression.
    #[arg(long)]
    ns: bool,

    /// Enable adaptive digital gain control.
    #[arg(long)]
    agc: bool,

    /// Enable voice activity detection.
    #[arg(long)]
    vad: bool,
}

fn main() -> Result<()> {
    common::init_tracing();
    let args = Args::parse();
    let frame_size = args.sample_rate as usize / 100;

    let apm = AudioProcessing::builder()
        .sample_rate_hz(args.sample_rate)
        .build()
        .context("unsupported sample rate")?;
    apm.high_pass_filter().enable(args.hpf)?;
    apm.noise_suppression().enable(args.ns)?;
    if args.agc {
        let mut agc = apm.gain_control();
        agc.set_mode(GainControlMode::AdaptiveDigital)?;
        agc.enable(true)?;
    }
    apm.voice_detection().enable(args.vad)?;
    if let Some(trace) = &args.trace {
        apm.start_debug_recording(trace)
            .with_context(|| format!("cannot open {}", trace.display()))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc::set_handler({
        let running = running.clone();
        move || running.store(false, Ordering::SeqCst)
    })?;

    let host = cpal::default_host();
    let input_device = host
        .default_input_device()
        .context("no input device available")?;
    info!(device = %input_device.name()?, "recording");

    let cpal_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(args.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let (mut prod, mut cons) = HeapRb::<f32>::new(frame_size * 8).split();
    let input_stream = input_device.build_input_stream(
        &cpal_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            prod.push_slice(data);
        },
        |err| eprintln!("input error: {err}"),
        None,
    )?;
    input_stream.play()?;

    let spec = common::wav_spec(args.sample_rate, 1);
    let mut raw_writer = WavWriter::create(&args.raw_output, spec)?;
    let mut proc_writer = WavWriter::create(&args.processed_output, spec)?;

    println!("Recording for {} seconds (Ctrl+C to stop early)...", args.duration);

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut input_buf = vec![0.0f32; frame_size];
    let mut voiced_frames = 0usize;
    let mut total_frames = 0usize;

    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        if cons.occupied_len() < frame_size {
            thread::sleep(Duration::from_millis(1));
            continue;
        }
        cons.pop_slice(&mut input_buf);

        let samples: Vec<i16> = input_buf.iter().copied().map(common::f32_to_i16).collect();
        for &s in &samples {
            raw_writer.write_sample(s)?;
        }

        let mut frame = AudioFrame::from_interleaved(args.sample_rate, 1, samples)?;
        if let Err(err) = apm.process_stream(&mut frame) {
            warn!(%err, "frame dropped");
            continue;
        }
        total_frames += 1;
        if args.vad && apm.voice_detection().stream_has_voice() {
            voiced_frames += 1;
        }

        for &s in frame.data() {
            proc_writer.write_sample(s)?;
        }
    }

    apm.stop_debug_recording()?;
    raw_writer.finalize()?;
    proc_writer.finalize()?;

    if args.vad {
        println!("Voice in {voiced_frames} of {total_frames} frames");
    }
    println!(
        "Wrote {} and {}",
        args.raw_output.display(),
        args.processed_output.display()
    );

    Ok(())
}
