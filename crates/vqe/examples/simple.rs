//! Minimal noise suppression and voice detection demo.
//!
//! Feeds a synthetic tone buried in noise through the engine and prints the
//! voice decision and output level for each frame.
//!
//! ```sh
//! RUST_LOG=vqe=debug cargo run -p vqe --example simple
//! ```

use tracing_subscriber::EnvFilter;
use vqe::config::NoiseSuppressionLevel;
use vqe::{AudioFrame, AudioProcessing};

const SAMPLE_RATE: u32 = 16_000;
const FRAME_SIZE: usize = (SAMPLE_RATE / 100) as usize;

fn main() -> Result<(), vqe::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let apm = AudioProcessing::builder().id(1).sample_rate_hz(SAMPLE_RATE).build()?;
    apm.high_pass_filter().enable(true)?;
    apm.noise_suppression().set_level(NoiseSuppressionLevel::High)?;
    apm.noise_suppression().enable(true)?;
    apm.voice_detection().enable(true)?;

    println!("{}", apm.version());

    let mut seed = 1u32;
    for n in 0..100 {
        // One second of noise, then a tone on top.
        let with_tone = n >= 50;
        let data = (0..FRAME_SIZE)
            .map(|i| {
                seed = seed.wrapping_mul(69069).wrapping_add(1);
                let noise = f32::from((seed >> 16) as u16 as i16) / 64.0;
                let t = (n * FRAME_SIZE + i) as f32 / SAMPLE_RATE as f32;
                let tone = if with_tone {
                    6000.0 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                } else {
                    0.0
                };
                (noise + tone) as i16
            })
            .collect();
        let mut frame = AudioFrame::from_interleaved(SAMPLE_RATE, 1, data)?;
        apm.process_stream(&mut frame)?;

        if n % 10 == 9 {
            let energy: f64 = frame.data().iter().map(|&s| f64::from(s).powi(2)).sum();
            let rms = (energy / FRAME_SIZE as f64).sqrt();
            println!(
                "frame {n:3}: voice={} rms={rms:.0}",
                apm.voice_detection().stream_has_voice()
            );
        }
    }

    Ok(())
}
