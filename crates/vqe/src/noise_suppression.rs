//! Stationary noise suppression.
//!
//! Each capture channel is processed in short sub-blocks. A per-channel
//! noise floor follows the sub-block energy down quickly and creeps up
//! slowly, and every sub-block is scaled by a spectral-subtraction style
//! gain bounded below by the configured level's floor.

use vqe_common_audio::audio_util::{float_s16_to_s16, mean_square};

use crate::audio_buffer::AudioBuffer;
use crate::config::NoiseSuppressionLevel;
use crate::processing_component::{ComponentGuard, ProcessingComponent, StreamContext};
use crate::Error;

const VERSION: &str = "NS 2.1.0";

const SUB_BLOCKS_PER_FRAME: usize = 4;
/// Per-sub-block growth of the noise floor while the input is louder.
const NOISE_FLOOR_CREEP: f32 = 1.0002;
/// How much of the noise estimate is subtracted.
const OVER_SUBTRACTION: f32 = 2.0;
const GAIN_SMOOTHING: f32 = 0.5;

#[derive(Debug, Clone, Default)]
struct ChannelState {
    /// Mean-square noise estimate; `None` until the first non-silent block.
    noise_floor: Option<f32>,
    gain: f32,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            noise_floor: None,
            gain: 1.0,
        }
    }

    /// Updates the noise estimate and returns the gain for one sub-block.
    fn update(&mut self, energy: f32, gain_floor: f32) -> f32 {
        if energy > 0.0 {
            let floor = match self.noise_floor {
                None => energy,
                Some(n) if energy < n => (0.9 * energy + 0.1 * n) * NOISE_FLOOR_CREEP,
                Some(n) => n * NOISE_FLOOR_CREEP,
            };
            self.noise_floor = Some(floor);
            let target = (1.0 - OVER_SUBTRACTION * floor / energy).max(gain_floor);
            self.gain = GAIN_SMOOTHING * self.gain + (1.0 - GAIN_SMOOTHING) * target;
        }
        self.gain
    }
}

/// Noise suppressor component.
#[derive(Debug, Default)]
pub struct NoiseSuppression {
    enabled: bool,
    level: NoiseSuppressionLevel,
    channels: Vec<ChannelState>,
}

impl NoiseSuppression {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn level(&self) -> NoiseSuppressionLevel {
        self.level
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }
}

fn scale(samples: &mut [i16], gain: f32) {
    for s in samples {
        *s = float_s16_to_s16(f32::from(*s) * gain);
    }
}

impl ProcessingComponent for NoiseSuppression {
    fn initialize(&mut self, ctx: &StreamContext) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        self.channels = vec![ChannelState::new(); ctx.num_output_channels];
        Ok(())
    }

    fn destroy(&mut self) {
        self.channels = Vec::new();
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
        if audio.num_channels() > self.channels.len() {
            return Err(Error::Unspecified);
        }

        let gain_floor = self.level.gain_floor();
        let block_len = audio.samples_per_split_channel() / SUB_BLOCKS_PER_FRAME;
        for (ch, state) in self.channels.iter_mut().enumerate().take(audio.num_channels()) {
            let mut gains = [1.0f32; SUB_BLOCKS_PER_FRAME];
            for (block, gain) in audio
                .low_pass_split_data_mut(ch)
                .chunks_mut(block_len)
                .zip(gains.iter_mut())
            {
                *gain = state.update(mean_square(block), gain_floor);
                scale(block, *gain);
            }
            if let Some(high) = audio.high_pass_split_data_mut(ch) {
                for (block, gain) in high.chunks_mut(block_len).zip(gains) {
                    scale(block, gain);
                }
            }
        }
        Ok(())
    }

    fn version(&self) -> &'static str {
        VERSION
    }
}

impl ComponentGuard<'_, NoiseSuppression> {
    /// Sets the suppression strength. Takes effect on the next frame.
    pub fn set_level(&mut self, level: NoiseSuppressionLevel) -> Result<(), Error> {
        self.component_mut().level = level;
        Ok(())
    }
}
