//! Convert a debug trace into WAV files.
//!
//! Writes `<prefix>_render.wav` and `<prefix>_capture.wav`. A stream starts a
//! new numbered file whenever a frame's rate or channel count differs from
//! the previous frame in the same direction.
//!
//! ```sh
//! cargo run -p vqe --features examples --example unpack -- session.trace --prefix session
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hound::WavWriter;
use tracing::{debug, info};

use vqe::AudioFrame;
use vqe::debug_recorder::{TraceEvent, TraceReader};

#[allow(dead_code, reason = "shared helpers across examples")]
mod common;

#[derive(Parser, Debug)]
#[command(about = "Unpack a vqe debug trace into WAV files")]
struct Args {
    /// Trace file to read.
    input: PathBuf,

    /// Output file prefix.
    #[arg(long, default_value = "unpacked")]
    prefix: String,
}

type Writer = WavWriter<std::io::BufWriter<File>>;

/// WAV writer for one direction that restarts on layout changes.
#[derive(Default)]
struct Stream {
    name: &'static str,
    writer: Option<(Writer, u32, u16)>,
    segments: usize,
    frames: usize,
}

impl Stream {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    fn write(&mut self, prefix: &str, frame: &AudioFrame) -> Result<()> {
        let rate = frame.sample_rate_hz();
        let channels = u16::try_from(frame.num_channels())?;
        let reopen = !matches!(&self.writer, Some((_, r, c)) if *r == rate && *c == channels);
        if reopen {
            self.finish()?;
            let path = if self.segments == 0 {
                format!("{prefix}_{}.wav", self.name)
            } else {
                format!("{prefix}_{}_{}.wav", self.name, self.segments)
            };
            info!(%path, rate, channels, "writing");
            let writer = WavWriter::create(&path, common::wav_spec(rate, channels))?;
            self.writer = Some((writer, rate, channels));
            self.segments += 1;
        }
        if let Some((writer, _, _)) = &mut self.writer {
            for &s in frame.data() {
                writer.write_sample(s)?;
            }
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some((writer, _, _)) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    common::init_tracing();
    let args = Args::parse();

    let file = File::open(&args.input)
        .with_context(|| format!("cannot open {}", args.input.display()))?;
    let reader = TraceReader::new(BufReader::new(file)).context("not a vqe trace")?;

    let mut render = Stream::new("render");
    let mut capture = Stream::new("capture");
    for event in reader {
        match event? {
            TraceEvent::Initialize { sample_rate_hz } => {
                debug!(sample_rate_hz, "initialize");
            }
            TraceEvent::Render(frame) => render.write(&args.prefix, &frame)?,
            TraceEvent::Capture(frame) => capture.write(&args.prefix, &frame)?,
        }
    }
    render.finish()?;
    capture.finish()?;

    println!(
        "Unpacked {} render and {} capture frames",
        render.frames, capture.frames
    );
    Ok(())
}
