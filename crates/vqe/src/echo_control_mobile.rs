//! Lightweight echo control for handsets.
//!
//! Compares delay-aligned far-end energy with near-end energy per frame.
//! The echo path gain is tracked as a slowly rising minimum of the
//! near/far energy ratio, and the near end is attenuated by how much of it
//! that echo estimate explains, scaled by the routing mode. When noise
//! suppression runs first, the unsuppressed low-band snapshot is used for
//! the energy comparison. Suppressed frames can be filled with comfort
//! noise at the background level measured while the far end was silent.

use vqe_common_audio::audio_util::float_s16_to_s16;

use crate::audio_buffer::AudioBuffer;
use crate::config::RoutingMode;
use crate::processing_component::{ComponentGuard, ProcessingComponent, StreamContext};
use crate::Error;

const VERSION: &str = "AECM 1.2.0";

const MAX_DELAY_MS: usize = 500;
const FAR_END_ACTIVE_POWER: f32 = 10_000.0;
/// Per-frame rise of the echo path estimate.
const ECHO_PATH_CREEP: f32 = 1.01;
const MIN_SUPPRESSION_GAIN: f32 = 0.1;
const GAIN_SMOOTHING: f32 = 0.5;
const NOISE_FLOOR_CREEP: f32 = 1.0002;

#[derive(Debug, Clone)]
struct MobileChannel {
    echo_path_gain: f32,
    suppression_gain: f32,
    noise_floor: Option<f32>,
}

impl MobileChannel {
    fn new() -> Self {
        Self {
            echo_path_gain: 1.0,
            suppression_gain: 1.0,
            noise_floor: None,
        }
    }
}

fn power(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&x| x * x).sum::<f32>() / samples.len() as f32
}

fn power_i16(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples
        .iter()
        .map(|&s| f32::from(s) * f32::from(s))
        .sum::<f32>()
        / samples.len() as f32
}

/// Mobile echo controller component.
#[derive(Debug)]
pub struct EchoControlMobile {
    enabled: bool,
    routing_mode: RoutingMode,
    comfort_noise_enabled: bool,

    samples_per_ms: usize,
    max_delay_samples: usize,
    far_end: Vec<f32>,
    channels: Vec<MobileChannel>,
    seed: u32,
}

impl Default for EchoControlMobile {
    fn default() -> Self {
        Self {
            enabled: false,
            routing_mode: RoutingMode::default(),
            comfort_noise_enabled: true,
            samples_per_ms: 0,
            max_delay_samples: 0,
            far_end: Vec::new(),
            channels: Vec::new(),
            seed: 42,
        }
    }
}

impl EchoControlMobile {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.routing_mode
    }

    pub fn is_comfort_noise_enabled(&self) -> bool {
        self.comfort_noise_enabled
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    /// Uniform noise in `[-1, 1)`.
    fn next_noise(&mut self) -> f32 {
        self.seed = self.seed.wrapping_mul(69069).wrapping_add(1) & 0x7fff_ffff;
        (self.seed >> 15) as f32 / 32768.0 - 1.0
    }
}

impl ProcessingComponent for EchoControlMobile {
    fn initialize(&mut self, ctx: &StreamContext) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        if ctx.sample_rate_hz == 32_000 {
            return Err(Error::BadSampleRate);
        }
        self.samples_per_ms = ctx.split_sample_rate_hz as usize / 1000;
        self.max_delay_samples = MAX_DELAY_MS * self.samples_per_ms;
        self.far_end = vec![0.0; self.max_delay_samples + ctx.samples_per_split_channel];
        self.channels = vec![MobileChannel::new(); ctx.num_output_channels];
        self.seed = 42;
        Ok(())
    }

    fn destroy(&mut self) {
        self.far_end = Vec::new();
        self.channels = Vec::new();
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn process_render_audio(&mut self, audio: &AudioBuffer, _ctx: &StreamContext) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        let frame_len = audio.samples_per_split_channel();
        if self.far_end.len() != self.max_delay_samples + frame_len {
            return Err(Error::Unspecified);
        }
        let channels = audio.num_channels();
        let start = self.max_delay_samples;
        self.far_end.copy_within(frame_len.., 0);
        for (i, dst) in self.far_end[start..].iter_mut().enumerate() {
            let sum: f32 = (0..channels)
                .map(|ch| f32::from(audio.low_pass_split_data(ch)[i]))
                .sum();
            *dst = sum / channels.max(1) as f32;
        }
        Ok(())
    }

    fn process_capture_audio(
        &mut self,
        audio: &mut AudioBuffer,
        ctx: &StreamContext,
    ) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        if !ctx.was_stream_delay_set {
            return Err(Error::StreamParameterNotSet);
        }
        let frame_len = audio.samples_per_split_channel();
        if self.far_end.len() != self.max_delay_samples + frame_len
            || audio.num_channels() > self.channels.len()
        {
            return Err(Error::Unspecified);
        }

        let delay_ms = usize::try_from(ctx.stream_delay_ms).unwrap_or(0);
        let delay = (delay_ms * self.samples_per_ms).min(self.max_delay_samples);
        let start = self.max_delay_samples - delay;
        let far_power = power(&self.far_end[start..start + frame_len]);
        let far_active = far_power > FAR_END_ACTIVE_POWER;
        let overdrive = self.routing_mode.overdrive();

        for ch in 0..audio.num_channels() {
            let (clean, reference) = audio.low_pass_split_data_with_reference(ch);
            let noisy_power = match reference {
                Some(noisy) => power_i16(noisy),
                None => power_i16(clean),
            };

            let state = &mut self.channels[ch];
            let target_gain = if far_active && noisy_power > 0.0 {
                let ratio = noisy_power / far_power;
                state.echo_path_gain = (state.echo_path_gain * ECHO_PATH_CREEP).min(ratio);
                let echo_power = state.echo_path_gain * far_power;
                (1.0 - overdrive * echo_power / noisy_power).max(MIN_SUPPRESSION_GAIN)
            } else {
                if noisy_power > 0.0 {
                    state.noise_floor = Some(match state.noise_floor {
                        None => noisy_power,
                        Some(n) if noisy_power < n => {
                            (0.9 * noisy_power + 0.1 * n) * NOISE_FLOOR_CREEP
                        }
                        Some(n) => n * NOISE_FLOOR_CREEP,
                    });
                }
                1.0
            };
            state.suppression_gain =
                GAIN_SMOOTHING * state.suppression_gain + (1.0 - GAIN_SMOOTHING) * target_gain;
            let gain = state.suppression_gain;
            let comfort_amplitude = match state.noise_floor {
                Some(floor) if self.comfort_noise_enabled && gain < 1.0 => {
                    floor.sqrt() * (1.0 - gain)
                }
                _ => 0.0,
            };

            for s in clean.iter_mut() {
                let noise = if comfort_amplitude > 0.0 {
                    comfort_amplitude * self.next_noise()
                } else {
                    0.0
                };
                *s = float_s16_to_s16(f32::from(*s) * gain + noise);
            }
        }
        Ok(())
    }

    fn version(&self) -> &'static str {
        VERSION
    }
}

impl ComponentGuard<'_, EchoControlMobile> {
    pub fn set_routing_mode(&mut self, mode: RoutingMode) -> Result<(), Error> {
        self.component_mut().routing_mode = mode;
        Ok(())
    }

    pub fn enable_comfort_noise(&mut self, enable: bool) -> Result<(), Error> {
        self.component_mut().comfort_noise_enabled = enable;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_frame::AudioFrame;

    const FRAME: usize = 160;

    fn controller(comfort_noise: bool) -> EchoControlMobile {
        let mut aecm = EchoControlMobile {
            comfort_noise_enabled: comfort_noise,
            ..Default::default()
        };
        aecm.set_enabled(true);
        aecm.initialize(&StreamContext::for_rate(16_000)).unwrap();
        aecm
    }

    fn noise(seed: &mut u32, amplitude: i32) -> Vec<i16> {
        (0..FRAME)
            .map(|_| {
                *seed = seed.wrapping_mul(69069).wrapping_add(1);
                ((*seed >> 16) as i32 % (2 * amplitude) - amplitude) as i16
            })
            .collect()
    }

    fn buffer(samples: Vec<i16>) -> AudioBuffer {
        let mut audio = AudioBuffer::new(1, FRAME, false);
        audio.deinterleave_from(&AudioFrame::from_interleaved(16_000, 1, samples).unwrap());
        audio
    }

    /// Returns output power over the last ten of `frames` echo-only frames.
    fn run_echo(aecm: &mut EchoControlMobile, frames: usize) -> (f32, f32) {
        let ctx = StreamContext::for_rate(16_000);
        let mut seed = 99;
        let (mut input_power, mut output_power) = (0.0, 0.0);
        for t in 0..frames {
            let far = noise(&mut seed, 5000);
            aecm.process_render_audio(&buffer(far.clone()), &ctx).unwrap();
            let near: Vec<i16> = far.iter().map(|&s| s / 2).collect();
            let mut audio = buffer(near.clone());
            aecm.process_capture_audio(&mut audio, &ctx).unwrap();
            if t >= frames - 10 {
                input_power += power_i16(&near);
                output_power += power_i16(audio.data(0));
            }
        }
        (input_power, output_power)
    }

    #[test]
    fn suppresses_echo() {
        let mut aecm = controller(false);
        let (input, output) = run_echo(&mut aecm, 40);
        assert!(output < 0.05 * input, "output {output} vs input {input}");
    }

    #[test]
    fn comfort_noise_fills_suppressed_frames() {
        let ctx = StreamContext::for_rate(16_000);
        let mut with_noise = controller(true);
        let mut without_noise = controller(false);
        for aecm in [&mut with_noise, &mut without_noise] {
            let mut seed = 3;
            for _ in 0..20 {
                aecm.process_render_audio(&buffer(vec![0; FRAME]), &ctx).unwrap();
                let mut audio = buffer(noise(&mut seed, 300));
                aecm.process_capture_audio(&mut audio, &ctx).unwrap();
            }
        }
        let (input, quiet) = run_echo(&mut without_noise, 40);
        let (_, filled) = run_echo(&mut with_noise, 40);
        assert!(filled > quiet);
        assert!(filled < 0.1 * input);
    }

    #[test]
    fn uses_reference_snapshot_when_present() {
        let ctx = StreamContext::for_rate(16_000);
        let mut aecm = controller(false);
        let mut seed = 1;
        let far = noise(&mut seed, 5000);
        aecm.process_render_audio(&buffer(far.clone()), &ctx).unwrap();

        // The snapshot holds the echo while the low band was already
        // cleaned; the echo path must be estimated from the snapshot.
        let mut audio = buffer(far.iter().map(|&s| s / 2).collect());
        audio.copy_low_pass_to_reference();
        audio.low_pass_split_data_mut(0).fill(100);
        aecm.process_capture_audio(&mut audio, &ctx).unwrap();
        let echo_path_gain = aecm.channels[0].echo_path_gain;
        assert!((0.2..0.3).contains(&echo_path_gain), "gain = {echo_path_gain}");
        assert!(audio.data(0).iter().all(|&s| s < 100));
    }

    #[test]
    fn rejects_super_wideband() {
        let mut aecm = EchoControlMobile::default();
        let ctx = StreamContext::for_rate(32_000);
        assert_eq!(aecm.initialize(&ctx), Ok(()));
        aecm.set_enabled(true);
        assert_eq!(aecm.initialize(&ctx), Err(Error::BadSampleRate));
    }

    #[test]
    fn requires_stream_delay() {
        let mut aecm = controller(true);
        let ctx = StreamContext {
            was_stream_delay_set: false,
            ..StreamContext::for_rate(16_000)
        };
        let mut audio = buffer(vec![0; FRAME]);
        assert_eq!(
            aecm.process_capture_audio(&mut audio, &ctx),
            Err(Error::StreamParameterNotSet)
        );
    }

    #[test]
    fn defaults() {
        let aecm = EchoControlMobile::default();
        assert_eq!(aecm.routing_mode(), RoutingMode::Speakerphone);
        assert!(aecm.is_comfort_noise_enabled());
        assert_eq!(aecm.version(), "AECM 1.2.0");
    }
}
