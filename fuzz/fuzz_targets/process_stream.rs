#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vqe::config::GainControlMode;
use vqe::{AudioFrame, AudioProcessing};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Sample rate index: 0=8k, 1=16k, 2=32k
    sample_rate_idx: u8,
    /// Number of channels (clamped to 1-2)
    channels: u8,
    delay_ms: i32,
    /// Interleaved samples (truncated to one frame)
    samples: Vec<i16>,
    render: Vec<i16>,
}

fn sample_rate(idx: u8) -> u32 {
    match idx % 3 {
        0 => 8000,
        1 => 16000,
        _ => 32000,
    }
}

fuzz_target!(|input: FuzzInput| {
    let rate = sample_rate(input.sample_rate_idx);
    let channels = (input.channels % 2) as usize + 1;
    let total = rate as usize / 100 * channels;

    if input.samples.len() < total || input.render.len() < total {
        return;
    }

    let Ok(apm) = AudioProcessing::builder()
        .sample_rate_hz(rate)
        .num_channels(channels, channels)
        .num_reverse_channels(channels)
        .build()
    else {
        return;
    };
    let _ = apm.high_pass_filter().enable(true);
    let _ = apm.echo_cancellation().enable(true);
    let _ = apm.noise_suppression().enable(true);
    let _ = apm.voice_detection().enable(true);
    let _ = apm.level_estimator().enable(true);
    {
        let mut agc = apm.gain_control();
        let _ = agc.set_mode(GainControlMode::AdaptiveDigital);
        let _ = agc.enable(true);
    }

    let render = AudioFrame::from_interleaved(rate, channels, input.render[..total].to_vec())
        .expect("render frame");
    let mut capture = AudioFrame::from_interleaved(rate, channels, input.samples[..total].to_vec())
        .expect("capture frame");

    for _ in 0..3 {
        let _ = apm.analyze_reverse_stream(&render);
        let _ = apm.set_stream_delay_ms(input.delay_ms);
        let _ = apm.process_stream(&mut capture);
        assert_eq!(capture.data().len(), total);
    }
});
