//! Second-order high-pass filter removing DC and low-frequency rumble.
//!
//! Runs on the low band of every capture channel in fixed point. The
//! recursive part keeps its output history split into a high word and a
//! Q15 remainder so the poles near `z = 1` stay accurate.

use crate::audio_buffer::AudioBuffer;
use crate::processing_component::{ProcessingComponent, StreamContext};
use crate::Error;

/// `[b0, b1, b2, -a1, -a2]`, numerator in Q12, denominator in Q12 after the
/// implicit doubling of the split feedback.
const COEFFICIENTS_8KHZ: [i16; 5] = [3798, -7596, 3798, 7807, -3733];
const COEFFICIENTS_16KHZ: [i16; 5] = [4012, -8024, 4012, 8002, -3913];

#[derive(Debug, Clone)]
struct FilterState {
    /// `x[n-1]`, `x[n-2]`.
    x: [i16; 2],
    /// High/low words of `y[n-1]` then `y[n-2]`.
    y: [i16; 4],
    ba: &'static [i16; 5],
}

impl FilterState {
    fn new(split_sample_rate_hz: u32) -> Self {
        let ba = if split_sample_rate_hz == 8_000 {
            &COEFFICIENTS_8KHZ
        } else {
            &COEFFICIENTS_16KHZ
        };
        Self {
            x: [0; 2],
            y: [0; 4],
            ba,
        }
    }

    fn filter(&mut self, data: &mut [i16]) {
        let ba = self.ba.map(i32::from);
        let Self { x, y, .. } = self;

        for sample in data {
            let mut acc = i32::from(y[1]) * ba[3];
            acc = acc.wrapping_add(i32::from(y[3]) * ba[4]);
            acc >>= 15;
            acc = acc.wrapping_add(i32::from(y[0]) * ba[3]);
            acc = acc.wrapping_add(i32::from(y[2]) * ba[4]);
            acc = acc.wrapping_shl(1);

            acc = acc.wrapping_add(i32::from(*sample) * ba[0]);
            acc = acc.wrapping_add(i32::from(x[0]) * ba[1]);
            acc = acc.wrapping_add(i32::from(x[1]) * ba[2]);

            x[1] = x[0];
            x[0] = *sample;

            y[2] = y[0];
            y[3] = y[1];
            y[0] = (acc >> 13) as i16;
            y[1] = (acc.wrapping_sub(i32::from(y[0]) << 13) << 2) as i16;

            // Round in Q12, saturate to 2^27 and return to Q0.
            let rounded = acc.saturating_add(2048).clamp(-134_217_728, 134_217_727);
            *sample = (rounded >> 12) as i16;
        }
    }
}

/// High-pass filter component. Has no version string and no settings.
#[derive(Debug, Default)]
pub struct HighPassFilter {
    enabled: bool,
    filters: Vec<FilterState>,
}

impl HighPassFilter {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn version(&self) -> &'static str {
        ""
    }
}

impl ProcessingComponent for HighPassFilter {
    fn initialize(&mut self, ctx: &StreamContext) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        self.filters = vec![FilterState::new(ctx.split_sample_rate_hz); ctx.num_output_channels];
        Ok(())
    }

    fn destroy(&mut self) {
        self.filters = Vec::new();
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn process_capture_audio(
        &mut self,
        audio: &mut AudioBuffer,
        _ctx: &StreamContext,
    ) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        if audio.num_channels() > self.filters.len() {
            return Err(Error::Unspecified);
        }
        for (ch, filter) in self.filters.iter_mut().enumerate().take(audio.num_channels()) {
            filter.filter(audio.low_pass_split_data_mut(ch));
        }
        Ok(())
    }

    fn version(&self) -> &'static str {
        ""
    }
}

#[cfg(test)]
mod tests {
    use vqe_common_audio::audio_util::mean_square;

    use super::*;
    use crate::audio_frame::AudioFrame;

    fn enabled_filter(ctx: &StreamContext) -> HighPassFilter {
        let mut hpf = HighPassFilter::default();
        hpf.set_enabled(true);
        hpf.initialize(ctx).unwrap();
        hpf
    }

    fn run_frame(hpf: &mut HighPassFilter, ctx: &StreamContext, samples: Vec<i16>) -> Vec<i16> {
        let mut audio = AudioBuffer::new(1, ctx.samples_per_channel, false);
        let frame = AudioFrame::from_interleaved(ctx.sample_rate_hz, 1, samples).unwrap();
        audio.deinterleave_from(&frame);
        hpf.process_capture_audio(&mut audio, ctx).unwrap();
        audio.data(0).to_vec()
    }

    #[test]
    fn removes_dc() {
        for rate in [8_000, 16_000] {
            let ctx = StreamContext::for_rate(rate);
            let mut hpf = enabled_filter(&ctx);
            let mut out = Vec::new();
            for _ in 0..50 {
                out = run_frame(&mut hpf, &ctx, vec![5000; ctx.samples_per_channel]);
            }
            assert!(out.iter().all(|s| s.abs() < 50), "rate {rate}: {:?}", &out[..8]);
        }
    }

    #[test]
    fn passes_speech_band_tone() {
        let ctx = StreamContext::for_rate(16_000);
        let mut hpf = enabled_filter(&ctx);
        let mut n = 0usize;
        let mut ratio = 0.0;
        for _ in 0..20 {
            let input: Vec<i16> = (0..160)
                .map(|_| {
                    n += 1;
                    let phase = 2.0 * std::f32::consts::PI * 1000.0 * n as f32 / 16_000.0;
                    (10_000.0 * phase.sin()) as i16
                })
                .collect();
            let output = run_frame(&mut hpf, &ctx, input.clone());
            ratio = (mean_square(&output) / mean_square(&input)).sqrt();
        }
        assert!((0.9..1.1).contains(&ratio), "ratio = {ratio}");
    }

    #[test]
    fn disabled_filter_is_transparent() {
        let ctx = StreamContext::for_rate(16_000);
        let mut hpf = HighPassFilter::default();
        hpf.initialize(&ctx).unwrap();
        let input = vec![1234; 160];
        assert_eq!(run_frame(&mut hpf, &ctx, input.clone()), input);
    }

    #[test]
    fn destroy_is_idempotent() {
        let ctx = StreamContext::for_rate(8_000);
        let mut hpf = enabled_filter(&ctx);
        hpf.destroy();
        hpf.destroy();
        assert!(hpf.is_enabled());
        assert_eq!(hpf.version(), "");
    }
}
