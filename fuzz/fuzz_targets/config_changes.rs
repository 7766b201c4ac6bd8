#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vqe::config::{
    GainControlMode, NoiseSuppressionLevel, RoutingMode, SuppressionLevel, VadLikelihood,
};
use vqe::{AudioFrame, AudioProcessing, ComponentKind};

#[derive(Debug, Arbitrary)]
enum FuzzOp {
    SetSampleRate(u32),
    SetChannels(u8, u8),
    SetReverseChannels(u8),
    Enable(u8, bool),
    SetDelay(i32),
    SetAnalogLevel(i32),
    SetAnalogLimits(i32, i32),
    SetTargetLevel(i32),
    SetCompressionGain(i32),
    SetAgcMode(u8),
    SetNsLevel(u8),
    SetVadLikelihood(u8),
    SetVadFrameSize(u32),
    SetSuppressionLevel(u8),
    SetRoutingMode(u8),
    SetDriftSamples(i32),
    EnableDrift(bool),
    ProcessCapture(i16),
    AnalyzeRender(i16),
    ReadRms,
    Initialize,
}

const KINDS: [ComponentKind; 7] = [
    ComponentKind::EchoCancellation,
    ComponentKind::EchoControlMobile,
    ComponentKind::GainControl,
    ComponentKind::HighPassFilter,
    ComponentKind::LevelEstimator,
    ComponentKind::NoiseSuppression,
    ComponentKind::VoiceDetection,
];

fn pick<T: Copy>(options: &[T], idx: u8) -> T {
    options[idx as usize % options.len()]
}

fuzz_target!(|ops: Vec<FuzzOp>| {
    let Ok(apm) = AudioProcessing::create(0) else {
        return;
    };

    for op in ops {
        match op {
            FuzzOp::SetSampleRate(rate) => {
                let _ = apm.set_sample_rate_hz(rate);
            }
            FuzzOp::SetChannels(input, output) => {
                let _ = apm.set_num_channels(input as usize, output as usize);
            }
            FuzzOp::SetReverseChannels(channels) => {
                let _ = apm.set_num_reverse_channels(channels as usize);
            }
            FuzzOp::Enable(kind, enable) => {
                let _ = apm.enable_component(pick(&KINDS, kind), enable);
            }
            FuzzOp::SetDelay(delay) => {
                let _ = apm.set_stream_delay_ms(delay);
            }
            FuzzOp::SetAnalogLevel(level) => {
                let _ = apm.gain_control().set_stream_analog_level(level);
            }
            FuzzOp::SetAnalogLimits(min, max) => {
                let _ = apm.gain_control().set_analog_level_limits(min, max);
            }
            FuzzOp::SetTargetLevel(level) => {
                let _ = apm.gain_control().set_target_level_dbfs(level);
            }
            FuzzOp::SetCompressionGain(gain) => {
                let _ = apm.gain_control().set_compression_gain_db(gain);
            }
            FuzzOp::SetAgcMode(mode) => {
                let mode = pick(
                    &[
                        GainControlMode::AdaptiveAnalog,
                        GainControlMode::AdaptiveDigital,
                        GainControlMode::FixedDigital,
                    ],
                    mode,
                );
                let _ = apm.gain_control().set_mode(mode);
            }
            FuzzOp::SetNsLevel(level) => {
                let level = pick(
                    &[
                        NoiseSuppressionLevel::Low,
                        NoiseSuppressionLevel::Moderate,
                        NoiseSuppressionLevel::High,
                        NoiseSuppressionLevel::VeryHigh,
                    ],
                    level,
                );
                let _ = apm.noise_suppression().set_level(level);
            }
            FuzzOp::SetVadLikelihood(likelihood) => {
                let likelihood = pick(
                    &[
                        VadLikelihood::VeryLow,
                        VadLikelihood::Low,
                        VadLikelihood::Moderate,
                        VadLikelihood::High,
                    ],
                    likelihood,
                );
                let _ = apm.voice_detection().set_likelihood(likelihood);
            }
            FuzzOp::SetVadFrameSize(ms) => {
                let _ = apm.voice_detection().set_frame_size_ms(ms);
            }
            FuzzOp::SetSuppressionLevel(level) => {
                let level = pick(
                    &[SuppressionLevel::Low, SuppressionLevel::Moderate, SuppressionLevel::High],
                    level,
                );
                let _ = apm.echo_cancellation().set_suppression_level(level);
            }
            FuzzOp::SetRoutingMode(mode) => {
                let mode = pick(
                    &[
                        RoutingMode::QuietEarpieceOrHeadset,
                        RoutingMode::Earpiece,
                        RoutingMode::LoudEarpiece,
                        RoutingMode::Speakerphone,
                        RoutingMode::LoudSpeakerphone,
                    ],
                    mode,
                );
                let _ = apm.echo_control_mobile().set_routing_mode(mode);
            }
            FuzzOp::SetDriftSamples(drift) => {
                let _ = apm.echo_cancellation().set_stream_drift_samples(drift);
            }
            FuzzOp::EnableDrift(enable) => {
                let _ = apm.echo_cancellation().enable_drift_compensation(enable);
            }
            FuzzOp::ProcessCapture(value) => {
                let format = apm.format();
                let mut frame = AudioFrame::from_interleaved(
                    format.sample_rate_hz(),
                    format.num_input_channels(),
                    vec![value; format.samples_per_channel() * format.num_input_channels()],
                )
                .expect("capture frame");
                let _ = apm.process_stream(&mut frame);
            }
            FuzzOp::AnalyzeRender(value) => {
                let format = apm.format();
                let frame = AudioFrame::from_interleaved(
                    format.sample_rate_hz(),
                    format.num_reverse_channels(),
                    vec![value; format.samples_per_channel() * format.num_reverse_channels()],
                )
                .expect("render frame");
                let _ = apm.analyze_reverse_stream(&frame);
            }
            FuzzOp::ReadRms => {
                let mut estimator = apm.level_estimator();
                let _ = estimator.rms();
                let _ = estimator.reverse_rms();
            }
            FuzzOp::Initialize => {
                let _ = apm.initialize();
            }
        }
    }
});
