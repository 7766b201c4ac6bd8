//! RMS level of the processed streams in -dBFS.
//!
//! Only scheduled in the pipelines when the crate is built with the
//! `level-estimation` feature; without it the estimator can be enabled but
//! never sees audio and reports silence.

use crate::audio_buffer::AudioBuffer;
use crate::processing_component::{ComponentGuard, ProcessingComponent, StreamContext};
use crate::Error;

/// Level reported for digital silence or when nothing was measured.
pub const MIN_LEVEL: u8 = 127;

const FULL_SCALE_POWER: f64 = 32768.0 * 32768.0;

fn sum_square(samples: &[i16]) -> f64 {
    samples
        .iter()
        .map(|&s| f64::from(s) * f64::from(s))
        .sum()
}

#[derive(Debug, Clone, Default)]
struct RmsLevel {
    sum_square: f64,
    sample_count: usize,
}

impl RmsLevel {
    fn analyze(&mut self, samples: &[i16]) {
        self.sum_square += sum_square(samples);
        self.sample_count += samples.len();
    }

    /// Accumulates one channel of the buffer. At 32 kHz both bands carry
    /// the signal at full amplitude, so their energies add over the
    /// split-band sample count.
    fn analyze_channel(&mut self, audio: &AudioBuffer, channel: usize) {
        let low = audio.low_pass_split_data(channel);
        self.analyze(low);
        if let Some(high) = audio.high_pass_split_data(channel) {
            self.sum_square += sum_square(high);
        }
    }

    /// Level since the previous call, negated and rounded to whole dB.
    fn take(&mut self) -> u8 {
        let Self {
            sum_square,
            sample_count,
        } = std::mem::take(self);
        if sample_count == 0 || sum_square <= 0.0 {
            return MIN_LEVEL;
        }
        let dbfs = 10.0 * (sum_square / (sample_count as f64 * FULL_SCALE_POWER)).log10();
        (-dbfs).round().clamp(0.0, f64::from(MIN_LEVEL)) as u8
    }
}

/// Level estimator component. Has no version string.
#[derive(Debug, Default)]
pub struct LevelEstimator {
    enabled: bool,
    capture: RmsLevel,
    render: RmsLevel,
}

impl LevelEstimator {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn version(&self) -> &'static str {
        ""
    }
}

impl ProcessingComponent for LevelEstimator {
    fn initialize(&mut self, _ctx: &StreamContext) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        self.capture = RmsLevel::default();
        self.render = RmsLevel::default();
        Ok(())
    }

    fn destroy(&mut self) {
        self.capture = RmsLevel::default();
        self.render = RmsLevel::default();
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
        for ch in 0..audio.num_channels() {
            self.capture.analyze_channel(audio, ch);
        }
        Ok(())
    }

    fn process_render_audio(&mut self, audio: &AudioBuffer, _ctx: &StreamContext) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        for ch in 0..audio.num_channels() {
            self.render.analyze_channel(audio, ch);
        }
        Ok(())
    }

    fn version(&self) -> &'static str {
        ""
    }
}

impl ComponentGuard<'_, LevelEstimator> {
    /// Capture level since the previous call, in -dBFS (`0..=127`).
    ///
    /// Returns [`Error::NotEnabled`] when the estimator is disabled.
    pub fn rms(&mut self) -> Result<u8, Error> {
        let estimator = self.component_mut();
        if !estimator.enabled {
            return Err(Error::NotEnabled);
        }
        Ok(estimator.capture.take())
    }

    /// Render level since the previous call, in -dBFS (`0..=127`).
    pub fn reverse_rms(&mut self) -> Result<u8, Error> {
        let estimator = self.component_mut();
        if !estimator.enabled {
            return Err(Error::NotEnabled);
        }
        Ok(estimator.render.take())
    }
}
