//! Helpers shared by multiple examples.

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber honoring `RUST_LOG` (default `info`).
pub(crate) fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// 16-bit PCM WAV layout for `channels` at `sample_rate_hz`.
pub(crate) fn wav_spec(sample_rate_hz: u32, channels: u16) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Convert a `[-1, 1]` float sample to 16-bit PCM, saturating.
pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(-32768.0, 32767.0) as i16
}
