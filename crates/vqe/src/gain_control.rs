//! Automatic gain control.
//!
//! Capture frames are measured before any other effect runs
//! ([`GainControl::analyze_capture_audio`]) and the digital gain is applied
//! at the very end of the pipeline. Adaptive modes move the gain toward the
//! target level at a bounded rate; far-end activity freezes gain increases
//! so echo is not amplified. In adaptive analog mode the controller also
//! recommends a device volume through [`GainControl::stream_analog_level`].

use vqe_common_audio::audio_util::{db_to_ratio, float_s16_to_s16, mean_square, mean_square_to_dbfs};

use crate::audio_buffer::AudioBuffer;
use crate::config::GainControlMode;
use crate::processing_component::{ComponentGuard, ProcessingComponent, StreamContext};
use crate::Error;

const VERSION: &str = "AGC 1.7.0";

/// Largest analog level accepted by [`ComponentGuard::set_analog_level_limits`].
pub const MAX_ANALOG_LEVEL: i32 = 65_535;
pub const MAX_TARGET_LEVEL_DBFS: i32 = 31;
pub const MAX_COMPRESSION_GAIN_DB: i32 = 90;

/// Input below this level is treated as background and does not steer the gain.
const SPEECH_LEVEL_DBFS: f32 = -60.0;
/// Render level above which the far end is considered active.
const FAR_END_ACTIVE_DBFS: f32 = -50.0;
const MAX_GAIN_INCREASE_DB: f32 = 0.5;
const MAX_GAIN_DECREASE_DB: f32 = 2.0;
const LIMITER_CEILING: f32 = 32_000.0;
const SATURATION_LEVEL: i32 = 32_000;
/// Analog steps per limit range.
const ANALOG_STEPS: i32 = 16;

/// Gain controller component.
#[derive(Debug)]
pub struct GainControl {
    enabled: bool,
    mode: GainControlMode,
    analog_level_minimum: i32,
    analog_level_maximum: i32,
    target_level_dbfs: i32,
    compression_gain_db: i32,
    limiter_enabled: bool,

    analog_capture_level: i32,
    was_analog_level_set: bool,
    recommended_analog_level: i32,
    stream_is_saturated: bool,
    capture_level_dbfs: f32,
    far_end_active: bool,
    gain_db: f32,
}

impl Default for GainControl {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: GainControlMode::default(),
            analog_level_minimum: 0,
            analog_level_maximum: 255,
            target_level_dbfs: 3,
            compression_gain_db: 9,
            limiter_enabled: true,
            analog_capture_level: 0,
            was_analog_level_set: false,
            recommended_analog_level: 0,
            stream_is_saturated: false,
            capture_level_dbfs: mean_square_to_dbfs(0.0),
            far_end_active: false,
            gain_db: 0.0,
        }
    }
}

impl GainControl {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn mode(&self) -> GainControlMode {
        self.mode
    }

    pub fn analog_level_minimum(&self) -> i32 {
        self.analog_level_minimum
    }

    pub fn analog_level_maximum(&self) -> i32 {
        self.analog_level_maximum
    }

    /// Target peak level in -dBFS.
    pub fn target_level_dbfs(&self) -> i32 {
        self.target_level_dbfs
    }

    /// Upper bound of the digital gain in dB.
    pub fn compression_gain_db(&self) -> i32 {
        self.compression_gain_db
    }

    pub fn is_limiter_enabled(&self) -> bool {
        self.limiter_enabled
    }

    /// Recommended analog level after the last capture frame.
    pub fn stream_analog_level(&self) -> i32 {
        self.recommended_analog_level
    }

    /// Whether the last analyzed capture frame clipped.
    pub fn stream_is_saturated(&self) -> bool {
        self.stream_is_saturated
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    /// Measures the capture frame before other effects modify it.
    pub(crate) fn analyze_capture_audio(
        &mut self,
        audio: &AudioBuffer,
        _ctx: &StreamContext,
    ) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        let channels = audio.num_channels();
        let energy = (0..channels)
            .map(|ch| mean_square(audio.low_pass_split_data(ch)))
            .sum::<f32>()
            / channels.max(1) as f32;
        self.capture_level_dbfs = mean_square_to_dbfs(energy);
        self.stream_is_saturated = (0..channels).any(|ch| {
            audio
                .data(ch)
                .iter()
                .any(|&s| i32::from(s).abs() >= SATURATION_LEVEL)
        });
        Ok(())
    }

    fn desired_gain_db(&self) -> f32 {
        let max_gain = self.compression_gain_db as f32;
        match self.mode {
            GainControlMode::FixedDigital => max_gain,
            GainControlMode::AdaptiveAnalog | GainControlMode::AdaptiveDigital => {
                if self.capture_level_dbfs > SPEECH_LEVEL_DBFS {
                    (-(self.target_level_dbfs as f32) - self.capture_level_dbfs).clamp(0.0, max_gain)
                } else {
                    self.gain_db
                }
            }
        }
    }

    fn update_gain(&mut self) {
        let desired = self.desired_gain_db();
        if self.mode == GainControlMode::FixedDigital {
            self.gain_db = desired;
            return;
        }
        let mut delta = desired - self.gain_db;
        if self.far_end_active {
            delta = delta.min(0.0);
        }
        self.gain_db += delta.clamp(-MAX_GAIN_DECREASE_DB, MAX_GAIN_INCREASE_DB);
    }

    fn update_analog_level(&mut self) {
        let step = ((self.analog_level_maximum - self.analog_level_minimum) / ANALOG_STEPS).max(1);
        let mut level = self.analog_capture_level;
        let too_quiet = self.capture_level_dbfs > SPEECH_LEVEL_DBFS
            && self.capture_level_dbfs < -(self.target_level_dbfs as f32) - 10.0
            && self.gain_db >= self.compression_gain_db as f32 - MAX_GAIN_INCREASE_DB;
        if self.stream_is_saturated {
            level -= 2 * step;
        } else if too_quiet && !self.far_end_active {
            level += step;
        }
        self.recommended_analog_level =
            level.clamp(self.analog_level_minimum, self.analog_level_maximum);
    }
}

fn peak(samples: &[i16]) -> f32 {
    samples
        .iter()
        .map(|&s| f32::from(s).abs())
        .fold(0.0, f32::max)
}

impl ProcessingComponent for GainControl {
    fn initialize(&mut self, _ctx: &StreamContext) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        self.gain_db = 0.0;
        self.far_end_active = false;
        self.stream_is_saturated = false;
        self.capture_level_dbfs = mean_square_to_dbfs(0.0);
        self.recommended_analog_level = self
            .analog_capture_level
            .clamp(self.analog_level_minimum, self.analog_level_maximum);
        Ok(())
    }

    fn destroy(&mut self) {
        self.gain_db = 0.0;
        self.was_analog_level_set = false;
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
        if self.mode == GainControlMode::AdaptiveAnalog && !self.was_analog_level_set {
            return Err(Error::StreamParameterNotSet);
        }

        self.update_gain();
        let ratio = db_to_ratio(self.gain_db);
        for ch in 0..audio.num_channels() {
            let mut frame_peak = peak(audio.low_pass_split_data(ch));
            if let Some(high) = audio.high_pass_split_data(ch) {
                frame_peak = frame_peak.max(peak(high));
            }
            let ratio = if self.limiter_enabled && frame_peak * ratio > LIMITER_CEILING {
                LIMITER_CEILING / frame_peak
            } else {
                ratio
            };
            for s in audio.low_pass_split_data_mut(ch) {
                *s = float_s16_to_s16(f32::from(*s) * ratio);
            }
            if let Some(high) = audio.high_pass_split_data_mut(ch) {
                for s in high {
                    *s = float_s16_to_s16(f32::from(*s) * ratio);
                }
            }
        }

        if self.mode == GainControlMode::AdaptiveAnalog {
            self.update_analog_level();
            self.was_analog_level_set = false;
        }
        Ok(())
    }

    fn process_render_audio(&mut self, audio: &AudioBuffer, _ctx: &StreamContext) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        let channels = audio.num_channels();
        let energy = (0..channels)
            .map(|ch| mean_square(audio.low_pass_split_data(ch)))
            .sum::<f32>()
            / channels.max(1) as f32;
        self.far_end_active = mean_square_to_dbfs(energy) > FAR_END_ACTIVE_DBFS;
        Ok(())
    }

    fn version(&self) -> &'static str {
        VERSION
    }
}

impl ComponentGuard<'_, GainControl> {
    pub fn set_mode(&mut self, mode: GainControlMode) -> Result<(), Error> {
        self.component_mut().mode = mode;
        Ok(())
    }

    /// Sets the analog level range; requires `0 <= minimum < maximum <= 65535`.
    pub fn set_analog_level_limits(&mut self, minimum: i32, maximum: i32) -> Result<(), Error> {
        if minimum < 0 || maximum > MAX_ANALOG_LEVEL || maximum <= minimum {
            return Err(Error::BadParameter);
        }
        let agc = self.component_mut();
        agc.analog_level_minimum = minimum;
        agc.analog_level_maximum = maximum;
        agc.recommended_analog_level = agc.recommended_analog_level.clamp(minimum, maximum);
        Ok(())
    }

    /// Sets the target level in -dBFS, `0..=31`.
    pub fn set_target_level_dbfs(&mut self, level: i32) -> Result<(), Error> {
        if !(0..=MAX_TARGET_LEVEL_DBFS).contains(&level) {
            return Err(Error::BadParameter);
        }
        self.component_mut().target_level_dbfs = level;
        Ok(())
    }

    /// Sets the maximum digital gain in dB, `0..=90`.
    pub fn set_compression_gain_db(&mut self, gain: i32) -> Result<(), Error> {
        if !(0..=MAX_COMPRESSION_GAIN_DB).contains(&gain) {
            return Err(Error::BadParameter);
        }
        self.component_mut().compression_gain_db = gain;
        Ok(())
    }

    pub fn enable_limiter(&mut self, enable: bool) -> Result<(), Error> {
        self.component_mut().limiter_enabled = enable;
        Ok(())
    }

    /// Reports the current device volume. Required before every capture
    /// frame in [`GainControlMode::AdaptiveAnalog`].
    pub fn set_stream_analog_level(&mut self, level: i32) -> Result<(), Error> {
        let agc = self.component_mut();
        if level < agc.analog_level_minimum || level > agc.analog_level_maximum {
            return Err(Error::BadParameter);
        }
        agc.analog_capture_level = level;
        agc.was_analog_level_set = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_frame::AudioFrame;

    fn controller(mode: GainControlMode, compression_gain_db: i32) -> (GainControl, StreamContext) {
        let ctx = StreamContext::for_rate(16_000);
        let mut agc = GainControl {
            mode,
            compression_gain_db,
            ..Default::default()
        };
        agc.set_enabled(true);
        agc.initialize(&ctx).unwrap();
        (agc, ctx)
    }

    fn tone(amplitude: f32) -> Vec<i16> {
        (0..160)
            .map(|n| (amplitude * (2.0 * std::f32::consts::PI * n as f32 / 32.0).sin()) as i16)
            .collect()
    }

    fn capture(agc: &mut GainControl, ctx: &StreamContext, input: Vec<i16>) -> Result<Vec<i16>, Error> {
        let mut audio = AudioBuffer::new(1, 160, false);
        audio.deinterleave_from(&AudioFrame::from_interleaved(16_000, 1, input).unwrap());
        agc.analyze_capture_audio(&audio, ctx)?;
        agc.process_capture_audio(&mut audio, ctx)?;
        Ok(audio.data(0).to_vec())
    }

    fn render(agc: &mut GainControl, ctx: &StreamContext, input: Vec<i16>) {
        let mut audio = AudioBuffer::new(1, 160, false);
        audio.deinterleave_from(&AudioFrame::from_interleaved(16_000, 1, input).unwrap());
        agc.process_render_audio(&audio, ctx).unwrap();
    }

    fn gain(input: &[i16], output: &[i16]) -> f32 {
        (mean_square(output) / mean_square(input)).sqrt()
    }

    #[test]
    fn fixed_digital_applies_compression_gain() {
        let (mut agc, ctx) = controller(GainControlMode::FixedDigital, 6);
        let input = tone(1000.0);
        let output = capture(&mut agc, &ctx, input.clone()).unwrap();
        let g = gain(&input, &output);
        assert!((1.9..2.1).contains(&g), "gain = {g}");
    }

    #[test]
    fn adaptive_digital_ramps_to_compression_gain() {
        let (mut agc, ctx) = controller(GainControlMode::AdaptiveDigital, 9);
        let input = tone(463.0);
        let first = capture(&mut agc, &ctx, input.clone()).unwrap();
        assert!(gain(&input, &first) < 1.1);
        let mut output = first;
        for _ in 0..40 {
            output = capture(&mut agc, &ctx, input.clone()).unwrap();
        }
        let g = gain(&input, &output);
        assert!((2.6..3.0).contains(&g), "gain = {g}");
    }

    #[test]
    fn far_end_activity_freezes_gain_increase() {
        let (mut agc, ctx) = controller(GainControlMode::AdaptiveDigital, 9);
        let input = tone(463.0);
        let mut output = Vec::new();
        for _ in 0..20 {
            render(&mut agc, &ctx, tone(10_000.0));
            output = capture(&mut agc, &ctx, input.clone()).unwrap();
        }
        let g = gain(&input, &output);
        assert!(g < 1.05, "gain = {g}");
    }

    #[test]
    fn limiter_caps_peaks() {
        let (mut agc, ctx) = controller(GainControlMode::FixedDigital, 20);
        let output = capture(&mut agc, &ctx, tone(10_000.0)).unwrap();
        assert!(output.iter().all(|&s| f32::from(s).abs() <= LIMITER_CEILING));

        agc.limiter_enabled = false;
        let output = capture(&mut agc, &ctx, tone(10_000.0)).unwrap();
        assert!(output.contains(&i16::MAX));
    }

    #[test]
    fn analog_mode_requires_level_every_frame() {
        let (mut agc, ctx) = controller(GainControlMode::AdaptiveAnalog, 9);
        assert_eq!(
            capture(&mut agc, &ctx, tone(1000.0)),
            Err(Error::StreamParameterNotSet)
        );
        agc.analog_capture_level = 100;
        agc.was_analog_level_set = true;
        assert!(capture(&mut agc, &ctx, tone(1000.0)).is_ok());
        assert_eq!(
            capture(&mut agc, &ctx, tone(1000.0)),
            Err(Error::StreamParameterNotSet)
        );
    }

    #[test]
    fn saturation_lowers_recommended_level() {
        let (mut agc, ctx) = controller(GainControlMode::AdaptiveAnalog, 9);
        agc.analog_capture_level = 128;
        agc.was_analog_level_set = true;
        let clipped: Vec<i16> = (0..160).map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN }).collect();
        capture(&mut agc, &ctx, clipped).unwrap();
        assert!(agc.stream_is_saturated());
        assert!(agc.stream_analog_level() < 128);
    }

    #[test]
    fn quiet_input_raises_recommended_level() {
        let (mut agc, ctx) = controller(GainControlMode::AdaptiveAnalog, 0);
        agc.analog_capture_level = 100;
        agc.was_analog_level_set = true;
        capture(&mut agc, &ctx, tone(200.0)).unwrap();
        assert!(!agc.stream_is_saturated());
        assert!(agc.stream_analog_level() > 100);
    }

    #[test]
    fn defaults() {
        let agc = GainControl::default();
        assert_eq!(agc.mode(), GainControlMode::AdaptiveAnalog);
        assert_eq!((agc.analog_level_minimum(), agc.analog_level_maximum()), (0, 255));
        assert_eq!(agc.target_level_dbfs(), 3);
        assert_eq!(agc.compression_gain_db(), 9);
        assert!(agc.is_limiter_enabled());
        assert_eq!(agc.version(), "AGC 1.7.0");
    }
}
