//! Voice activity detection on the channel-averaged low band.
//!
//! An energy detector: a decision window is voice when its level clears an
//! adaptive noise floor by a likelihood-dependent margin. A short hangover
//! bridges gaps between syllables.

use vqe_common_audio::audio_util::mean_square_to_dbfs;

use crate::audio_buffer::AudioBuffer;
use crate::config::VadLikelihood;
use crate::processing_component::{ComponentGuard, ProcessingComponent, StreamContext};
use crate::Error;

const VERSION: &str = "VAD 1.3.0";

/// Windows below this level are never voice.
const MIN_VOICE_LEVEL_DBFS: f32 = -70.0;
/// Noise floor rise per decision window while the input is louder.
const NOISE_FLOOR_RISE_DB: f32 = 0.05;
const HANGOVER_WINDOWS: u32 = 3;

/// Voice activity detector component.
#[derive(Debug)]
pub struct VoiceDetection {
    enabled: bool,
    likelihood: VadLikelihood,
    frame_size_ms: u32,
    stream_has_voice: bool,
    using_external_vad: bool,
    noise_floor_dbfs: Option<f32>,
    hangover: u32,
    window_energy: f32,
    window_frames: u32,
}

impl Default for VoiceDetection {
    fn default() -> Self {
        Self {
            enabled: false,
            likelihood: VadLikelihood::default(),
            frame_size_ms: 10,
            stream_has_voice: false,
            using_external_vad: false,
            noise_floor_dbfs: None,
            hangover: 0,
            window_energy: 0.0,
            window_frames: 0,
        }
    }
}

impl VoiceDetection {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Decision for the most recent capture frame.
    pub fn stream_has_voice(&self) -> bool {
        self.stream_has_voice
    }

    pub fn likelihood(&self) -> VadLikelihood {
        self.likelihood
    }

    /// Length of the decision window in milliseconds.
    pub fn frame_size_ms(&self) -> u32 {
        self.frame_size_ms
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    fn reset(&mut self) {
        self.stream_has_voice = false;
        self.using_external_vad = false;
        self.noise_floor_dbfs = None;
        self.hangover = 0;
        self.window_energy = 0.0;
        self.window_frames = 0;
    }

    fn decide(&mut self, level_dbfs: f32) {
        let floor = match self.noise_floor_dbfs {
            None => level_dbfs,
            Some(floor) => level_dbfs.min(floor + NOISE_FLOOR_RISE_DB),
        };
        self.noise_floor_dbfs = Some(floor);

        let active = level_dbfs > MIN_VOICE_LEVEL_DBFS
            && level_dbfs > floor + self.likelihood.threshold_db();
        if active {
            self.hangover = HANGOVER_WINDOWS;
            self.stream_has_voice = true;
        } else if self.hangover > 0 {
            self.hangover -= 1;
            self.stream_has_voice = true;
        } else {
            self.stream_has_voice = false;
        }
    }
}

/// Mean square of the per-sample channel average.
fn mixed_mean_square(audio: &AudioBuffer) -> f32 {
    let channels = audio.num_channels();
    let len = audio.samples_per_split_channel();
    if channels == 0 || len == 0 {
        return 0.0;
    }
    let sum: f64 = (0..len)
        .map(|i| {
            let mixed = (0..channels)
                .map(|ch| f64::from(audio.low_pass_split_data(ch)[i]))
                .sum::<f64>()
                / channels as f64;
            mixed * mixed
        })
        .sum();
    (sum / len as f64) as f32
}

impl ProcessingComponent for VoiceDetection {
    fn initialize(&mut self, _ctx: &StreamContext) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        self.reset();
        Ok(())
    }

    fn destroy(&mut self) {
        self.reset();
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
        if self.using_external_vad {
            self.using_external_vad = false;
            return Ok(());
        }

        self.window_energy += mixed_mean_square(audio);
        self.window_frames += 1;
        if self.window_frames * 10 < self.frame_size_ms {
            return Ok(());
        }
        let energy = self.window_energy / self.window_frames as f32;
        self.window_energy = 0.0;
        self.window_frames = 0;
        self.decide(mean_square_to_dbfs(energy));
        Ok(())
    }

    fn version(&self) -> &'static str {
        VERSION
    }
}

impl ComponentGuard<'_, VoiceDetection> {
    pub fn set_likelihood(&mut self, likelihood: VadLikelihood) -> Result<(), Error> {
        self.component_mut().likelihood = likelihood;
        Ok(())
    }

    /// Sets the decision window. Accepts 10, 20 or 30 ms; anything else
    /// returns [`Error::BadParameter`].
    pub fn set_frame_size_ms(&mut self, frame_size_ms: u32) -> Result<(), Error> {
        if !matches!(frame_size_ms, 10 | 20 | 30) {
            return Err(Error::BadParameter);
        }
        let vad = self.component_mut();
        vad.frame_size_ms = frame_size_ms;
        vad.window_energy = 0.0;
        vad.window_frames = 0;
        Ok(())
    }

    /// Overrides the decision for the next capture frame with an external
    /// detector's result.
    pub fn set_stream_has_voice(&mut self, has_voice: bool) -> Result<(), Error> {
        let vad = self.component_mut();
        vad.stream_has_voice = has_voice;
        vad.using_external_vad = true;
        Ok(())
    }
}
