//! Acoustic echo cancellation.
//!
//! The render path keeps a history of the far-end low band (averaged over
//! render channels). On capture, each channel runs a normalized LMS filter
//! against that history, aligned by the reported stream delay, and
//! subtracts the echo estimate. A residual suppressor then attenuates what
//! the linear stage leaves behind, scaled by the suppression level.

use vqe_common_audio::audio_util::float_s16_to_s16;

use crate::audio_buffer::AudioBuffer;
use crate::config::SuppressionLevel;
use crate::processing_component::{ComponentGuard, ProcessingComponent, StreamContext};
use crate::stats::{EchoMetrics, StatisticTracker};
use crate::Error;

const VERSION: &str = "AEC 2.5.0";

/// Length of the adaptive filter.
const FILTER_LENGTH_MS: usize = 8;
/// Longest stream delay the far-end history covers.
const MAX_DELAY_MS: usize = 500;
const STEP_SIZE: f32 = 0.5;
/// Regularization per tap, in S16² units (about -50 dBFS).
const REGULARIZATION_PER_TAP: f32 = 10_000.0;
/// Far-end mean square below which the far end counts as silent.
const FAR_END_ACTIVE_POWER: f32 = 10_000.0;
const MIN_SUPPRESSION_GAIN: f32 = 0.05;
const GAIN_SMOOTHING: f32 = 0.5;
/// Echo estimate share of the near end that counts as echo present.
const ECHO_PRESENT_RATIO: f32 = 0.1;

pub const MIN_DEVICE_SAMPLE_RATE_HZ: u32 = 8_000;
pub const MAX_DEVICE_SAMPLE_RATE_HZ: u32 = 96_000;

#[derive(Debug, Clone)]
struct ChannelCanceller {
    weights: Vec<f32>,
    suppression_gain: f32,
    linear_output: Vec<f32>,
    echo_estimate: Vec<f32>,
}

impl ChannelCanceller {
    fn new(taps: usize, frame_len: usize) -> Self {
        Self {
            weights: vec![0.0; taps],
            suppression_gain: 1.0,
            linear_output: vec![0.0; frame_len],
            echo_estimate: vec![0.0; frame_len],
        }
    }

    /// Runs the adaptive filter over one frame. `far_end[newest]` is the
    /// reference sample aligned with `near[0]`.
    fn filter(&mut self, near: &[i16], far_end: &[f32], newest: usize) {
        let taps = self.weights.len();
        let regularization = REGULARIZATION_PER_TAP * taps as f32;
        for (i, &sample) in near.iter().enumerate() {
            let pos = newest + i;
            let window = &far_end[pos + 1 - taps..=pos];
            // weights[k] pairs with far_end[pos - k].
            let (estimate, norm) = self
                .weights
                .iter()
                .zip(window.iter().rev())
                .fold((0.0f32, 0.0f32), |(y, n), (&w, &x)| (y + w * x, n + x * x));
            let error = f32::from(sample) - estimate;
            let step = STEP_SIZE * error / (norm + regularization);
            for (w, &x) in self.weights.iter_mut().zip(window.iter().rev()) {
                *w += step * x;
            }
            self.linear_output[i] = error;
            self.echo_estimate[i] = estimate;
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MetricsTrackers {
    erl: StatisticTracker,
    erle: StatisticTracker,
    rerl: StatisticTracker,
    a_nlp: StatisticTracker,
}

fn power(samples: impl IntoIterator<Item = f32>) -> f32 {
    let (sum, n) = samples
        .into_iter()
        .fold((0.0f64, 0usize), |(s, n), x| (s + f64::from(x * x), n + 1));
    if n == 0 { 0.0 } else { (sum / n as f64) as f32 }
}

fn ratio_db(numerator: f32, denominator: f32) -> f32 {
    10.0 * ((numerator + 1.0) / (denominator + 1.0)).log10()
}

/// Echo canceller component.
#[derive(Debug)]
pub struct EchoCancellation {
    enabled: bool,
    suppression_level: SuppressionLevel,
    drift_compensation_enabled: bool,
    metrics_enabled: bool,
    device_sample_rate_hz: u32,
    stream_drift_samples: i32,
    was_stream_drift_set: bool,
    stream_has_echo: bool,

    taps: usize,
    max_delay_samples: usize,
    samples_per_ms: usize,
    /// Far-end history, oldest first.
    far_end: Vec<f32>,
    channels: Vec<ChannelCanceller>,
    metrics: MetricsTrackers,
}

impl Default for EchoCancellation {
    fn default() -> Self {
        Self {
            enabled: false,
            suppression_level: SuppressionLevel::default(),
            drift_compensation_enabled: false,
            metrics_enabled: true,
            device_sample_rate_hz: 48_000,
            stream_drift_samples: 0,
            was_stream_drift_set: false,
            stream_has_echo: false,
            taps: 0,
            max_delay_samples: 0,
            samples_per_ms: 0,
            far_end: Vec::new(),
            channels: Vec::new(),
            metrics: MetricsTrackers::default(),
        }
    }
}

impl EchoCancellation {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn suppression_level(&self) -> SuppressionLevel {
        self.suppression_level
    }

    pub fn is_drift_compensation_enabled(&self) -> bool {
        self.drift_compensation_enabled
    }

    /// Sample rate of the sound card the streams come from.
    pub fn device_sample_rate_hz(&self) -> u32 {
        self.device_sample_rate_hz
    }

    /// Last drift reported through `set_stream_drift_samples`.
    pub fn stream_drift_samples(&self) -> i32 {
        self.stream_drift_samples
    }

    pub fn are_metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }

    /// Whether echo was present in the last capture frame.
    pub fn stream_has_echo(&self) -> bool {
        self.stream_has_echo
    }

    /// Quality metrics accumulated while the far end was active.
    ///
    /// Returns [`Error::NotEnabled`] unless both the canceller and its
    /// metrics are enabled.
    pub fn metrics(&self) -> Result<EchoMetrics, Error> {
        if !self.enabled || !self.metrics_enabled {
            return Err(Error::NotEnabled);
        }
        Ok(EchoMetrics {
            residual_echo_return_loss: self.metrics.rerl.statistic(),
            echo_return_loss: self.metrics.erl.statistic(),
            echo_return_loss_enhancement: self.metrics.erle.statistic(),
            a_nlp: self.metrics.a_nlp.statistic(),
        })
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    fn history_len(&self, frame_len: usize) -> usize {
        self.max_delay_samples + self.taps + frame_len
    }
}

impl ProcessingComponent for EchoCancellation {
    fn initialize(&mut self, ctx: &StreamContext) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        let frame_len = ctx.samples_per_split_channel;
        self.samples_per_ms = ctx.split_sample_rate_hz as usize / 1000;
        self.taps = FILTER_LENGTH_MS * self.samples_per_ms;
        self.max_delay_samples = MAX_DELAY_MS * self.samples_per_ms;
        self.far_end = vec![0.0; self.history_len(frame_len)];
        self.channels = vec![ChannelCanceller::new(self.taps, frame_len); ctx.num_output_channels];
        self.metrics = MetricsTrackers::default();
        self.stream_has_echo = false;
        self.was_stream_drift_set = false;
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
        if self.far_end.len() != self.history_len(frame_len) {
            return Err(Error::Unspecified);
        }
        let channels = audio.num_channels();
        let start = self.far_end.len() - frame_len;
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
        if self.drift_compensation_enabled && !self.was_stream_drift_set {
            return Err(Error::StreamParameterNotSet);
        }
        self.was_stream_drift_set = false;

        let frame_len = audio.samples_per_split_channel();
        if self.far_end.len() != self.history_len(frame_len)
            || audio.num_channels() > self.channels.len()
        {
            return Err(Error::Unspecified);
        }

        let delay_ms = usize::try_from(ctx.stream_delay_ms).unwrap_or(0);
        let delay = (delay_ms * self.samples_per_ms).min(self.max_delay_samples);
        let newest = self.far_end.len() - frame_len - delay;
        let far_power = power(self.far_end[newest..newest + frame_len].iter().copied());
        let far_active = far_power > FAR_END_ACTIVE_POWER;
        let overdrive = self.suppression_level.overdrive();

        self.stream_has_echo = false;
        for ch in 0..audio.num_channels() {
            let canceller = &mut self.channels[ch];
            canceller.filter(audio.low_pass_split_data(ch), &self.far_end, newest);

            let near_power = power(audio.low_pass_split_data(ch).iter().map(|&s| f32::from(s)));
            let echo_power = power(canceller.echo_estimate.iter().copied());
            let target_gain = if far_active && near_power > 0.0 {
                (1.0 - overdrive * echo_power / near_power).max(MIN_SUPPRESSION_GAIN)
            } else {
                1.0
            };
            canceller.suppression_gain =
                GAIN_SMOOTHING * canceller.suppression_gain + (1.0 - GAIN_SMOOTHING) * target_gain;
            let gain = canceller.suppression_gain;

            if far_active && echo_power > ECHO_PRESENT_RATIO * near_power {
                self.stream_has_echo = true;
            }

            let linear_power = power(canceller.linear_output.iter().copied());
            for (out, &e) in audio
                .low_pass_split_data_mut(ch)
                .iter_mut()
                .zip(&canceller.linear_output)
            {
                *out = float_s16_to_s16(e * gain);
            }
            if let Some(high) = audio.high_pass_split_data_mut(ch) {
                for s in high {
                    *s = float_s16_to_s16(f32::from(*s) * gain);
                }
            }

            if ch == 0 && self.metrics_enabled && far_active {
                let out_power = linear_power * gain * gain;
                let erl = ratio_db(far_power, near_power);
                let erle = ratio_db(near_power, out_power);
                self.metrics.erl.update(erl);
                self.metrics.erle.update(erle);
                self.metrics.rerl.update(erl + erle);
                self.metrics.a_nlp.update(ratio_db(linear_power, out_power));
            }
        }
        Ok(())
    }

    fn version(&self) -> &'static str {
        VERSION
    }
}

impl ComponentGuard<'_, EchoCancellation> {
    pub fn set_suppression_level(&mut self, level: SuppressionLevel) -> Result<(), Error> {
        self.component_mut().suppression_level = level;
        Ok(())
    }

    /// When enabled, [`set_stream_drift_samples`](Self::set_stream_drift_samples)
    /// must be called before every capture frame.
    pub fn enable_drift_compensation(&mut self, enable: bool) -> Result<(), Error> {
        self.component_mut().drift_compensation_enabled = enable;
        Ok(())
    }

    /// Sets the device sample rate, `8000..=96000` Hz.
    pub fn set_device_sample_rate_hz(&mut self, rate: u32) -> Result<(), Error> {
        if !(MIN_DEVICE_SAMPLE_RATE_HZ..=MAX_DEVICE_SAMPLE_RATE_HZ).contains(&rate) {
            return Err(Error::BadParameter);
        }
        self.component_mut().device_sample_rate_hz = rate;
        Ok(())
    }

    /// Reports the clock drift between render and capture devices for the
    /// next capture frame.
    pub fn set_stream_drift_samples(&mut self, drift: i32) -> Result<(), Error> {
        let aec = self.component_mut();
        aec.stream_drift_samples = drift;
        aec.was_stream_drift_set = true;
        Ok(())
    }

    /// Enables metric collection; resets the accumulated metrics.
    pub fn enable_metrics(&mut self, enable: bool) -> Result<(), Error> {
        let aec = self.component_mut();
        aec.metrics_enabled = enable;
        aec.metrics = MetricsTrackers::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_frame::AudioFrame;

    const FRAME: usize = 160;

    fn canceller() -> EchoCancellation {
        let mut aec = EchoCancellation::default();
        aec.set_enabled(true);
        aec.initialize(&StreamContext::for_rate(16_000)).unwrap();
        aec
    }

    fn far_end_signal(frames: usize) -> Vec<i16> {
        let mut seed = 12_345u32;
        (0..frames * FRAME)
            .map(|_| {
                seed = seed.wrapping_mul(69069).wrapping_add(1);
                ((seed >> 16) as i32 % 10_000 - 5_000) as i16
            })
            .collect()
    }

    fn buffer(samples: &[i16]) -> AudioBuffer {
        let mut audio = AudioBuffer::new(1, FRAME, false);
        audio.deinterleave_from(&AudioFrame::from_interleaved(16_000, 1, samples.to_vec()).unwrap());
        audio
    }

    /// Feeds render frames and captures containing the render signal
    /// attenuated by half and delayed by `delay_ms`. Returns
    /// `(input_power, output_power)` over the last ten frames.
    fn run_echo(aec: &mut EchoCancellation, delay_ms: i32, frames: usize) -> (f32, f32) {
        let far = far_end_signal(frames);
        let delay = delay_ms as usize * 16;
        let ctx = StreamContext {
            stream_delay_ms: delay_ms,
            ..StreamContext::for_rate(16_000)
        };
        let (mut input_power, mut output_power) = (0.0, 0.0);
        for t in 0..frames {
            let render = &far[t * FRAME..(t + 1) * FRAME];
            aec.process_render_audio(&buffer(render), &ctx).unwrap();

            let near: Vec<i16> = (0..FRAME)
                .map(|i| {
                    let n = t * FRAME + i;
                    if n >= delay { far[n - delay] / 2 } else { 0 }
                })
                .collect();
            let mut audio = buffer(&near);
            aec.process_capture_audio(&mut audio, &ctx).unwrap();
            if t >= frames - 10 {
                input_power += power(near.iter().map(|&s| f32::from(s)));
                output_power += power(audio.data(0).iter().map(|&s| f32::from(s)));
            }
        }
        (input_power, output_power)
    }

    #[test]
    fn cancels_delayed_echo() {
        let mut aec = canceller();
        let (input, output) = run_echo(&mut aec, 10, 60);
        assert!(output < 0.01 * input, "output {output} vs input {input}");
        assert!(aec.stream_has_echo());
    }

    #[test]
    fn metrics_report_enhancement() {
        let mut aec = canceller();
        run_echo(&mut aec, 20, 60);
        let metrics = aec.metrics().unwrap();
        assert!(metrics.echo_return_loss_enhancement.instant > 10);
        assert!(metrics.echo_return_loss.average > 0);
        assert!(
            metrics.echo_return_loss_enhancement.maximum
                >= metrics.echo_return_loss_enhancement.minimum
        );
    }

    #[test]
    fn near_end_passes_without_far_end() {
        let mut aec = canceller();
        let ctx = StreamContext::for_rate(16_000);
        let near: Vec<i16> = (0..FRAME as i16).map(|i| i * 50 - 4000).collect();
        aec.process_render_audio(&buffer(&[0; FRAME]), &ctx).unwrap();
        let mut audio = buffer(&near);
        aec.process_capture_audio(&mut audio, &ctx).unwrap();
        assert_eq!(audio.data(0), near.as_slice());
        assert!(!aec.stream_has_echo());
    }

    #[test]
    fn requires_stream_delay() {
        let mut aec = canceller();
        let ctx = StreamContext {
            was_stream_delay_set: false,
            ..StreamContext::for_rate(16_000)
        };
        let mut audio = buffer(&[0; FRAME]);
        assert_eq!(
            aec.process_capture_audio(&mut audio, &ctx),
            Err(Error::StreamParameterNotSet)
        );
    }

    #[test]
    fn drift_compensation_requires_drift_each_frame() {
        let mut aec = canceller();
        aec.drift_compensation_enabled = true;
        let ctx = StreamContext::for_rate(16_000);
        let mut audio = buffer(&[0; FRAME]);
        assert_eq!(
            aec.process_capture_audio(&mut audio, &ctx),
            Err(Error::StreamParameterNotSet)
        );
        aec.was_stream_drift_set = true;
        assert_eq!(aec.process_capture_audio(&mut audio, &ctx), Ok(()));
        assert_eq!(
            aec.process_capture_audio(&mut audio, &ctx),
            Err(Error::StreamParameterNotSet)
        );
    }

    #[test]
    fn metrics_need_both_flags() {
        let mut aec = EchoCancellation::default();
        assert_eq!(aec.metrics(), Err(Error::NotEnabled));
        aec.set_enabled(true);
        aec.metrics_enabled = false;
        assert_eq!(aec.metrics(), Err(Error::NotEnabled));
        aec.metrics_enabled = true;
        assert_eq!(aec.metrics(), Ok(EchoMetrics::default()));
    }
}
