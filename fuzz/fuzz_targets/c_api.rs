#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vqe_ffi::*;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    operations: Vec<FuzzOp>,
    samples: Vec<i16>,
}

#[derive(Debug, Arbitrary)]
enum FuzzOp {
    Process { rate: i32, channels: i32, samples_per_channel: i32 },
    AnalyzeReverse { rate: i32, channels: i32, samples_per_channel: i32 },
    SetSampleRate(i32),
    SetChannels(i32, i32),
    SetReverseChannels(i32),
    Enable(u8, bool),
    SetDelay(i32),
    Version { len: u8, position: u8 },
    ChangeId(i32),
    Initialize,
}

/// Whether `samples` covers the frame the call will read.
fn fits(samples: &[i16], channels: i32, samples_per_channel: i32) -> bool {
    match (usize::try_from(channels), usize::try_from(samples_per_channel)) {
        (Ok(c), Ok(s)) => c.checked_mul(s).is_some_and(|n| n <= samples.len()),
        _ => true,
    }
}

fuzz_target!(|input: FuzzInput| {
    let apm = vqe_create(0);
    if apm.is_null() {
        return;
    }
    let mut samples = input.samples;

    for op in &input.operations {
        unsafe {
            match *op {
                FuzzOp::Process { rate, channels, samples_per_channel } => {
                    if fits(&samples, channels, samples_per_channel) {
                        let _ = vqe_process_stream(
                            apm,
                            samples.as_mut_ptr(),
                            rate,
                            channels,
                            samples_per_channel,
                        );
                    }
                }
                FuzzOp::AnalyzeReverse { rate, channels, samples_per_channel } => {
                    if fits(&samples, channels, samples_per_channel) {
                        let _ = vqe_analyze_reverse_stream(
                            apm,
                            samples.as_ptr(),
                            rate,
                            channels,
                            samples_per_channel,
                        );
                    }
                }
                FuzzOp::SetSampleRate(rate) => {
                    let _ = vqe_set_sample_rate_hz(apm, rate);
                }
                FuzzOp::SetChannels(input, output) => {
                    let _ = vqe_set_num_channels(apm, input, output);
                }
                FuzzOp::SetReverseChannels(channels) => {
                    let _ = vqe_set_num_reverse_channels(apm, channels);
                }
                FuzzOp::Enable(idx, enable) => {
                    // -1..=7 covers every component plus an unknown code on each side.
                    let component = i32::from(idx % 9) - 1;
                    let _ = vqe_component_enable(apm, component, enable);
                    let _ = vqe_component_is_enabled(apm, component);
                }
                FuzzOp::SetDelay(delay) => {
                    let _ = vqe_set_stream_delay_ms(apm, delay);
                    let _ = vqe_stream_delay_ms(apm);
                }
                FuzzOp::Version { len, position } => {
                    let mut buffer = vec![0 as std::ffi::c_char; len as usize];
                    let mut position = position as usize;
                    let _ = vqe_version(apm, buffer.as_mut_ptr(), buffer.len(), &mut position);
                }
                FuzzOp::ChangeId(id) => {
                    let _ = vqe_change_unique_id(apm, id);
                }
                FuzzOp::Initialize => {
                    let _ = vqe_initialize(apm);
                }
            }
        }
    }

    unsafe { vqe_destroy(apm) };
});
