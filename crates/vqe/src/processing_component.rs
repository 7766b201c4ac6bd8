//! Effect component contract and the handle type used to reach components.

use std::ops::Deref;

use parking_lot::MutexGuard;

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::echo_cancellation::EchoCancellation;
use crate::echo_control_mobile::EchoControlMobile;
use crate::gain_control::GainControl;
use crate::high_pass_filter::HighPassFilter;
use crate::level_estimator::LevelEstimator;
use crate::noise_suppression::NoiseSuppression;
use crate::voice_detection::VoiceDetection;
use crate::Error;

/// Identifies one of the engine's effect components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    EchoCancellation,
    EchoControlMobile,
    GainControl,
    HighPassFilter,
    LevelEstimator,
    NoiseSuppression,
    VoiceDetection,
}

impl ComponentKind {
    /// Short human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::EchoCancellation => "echo_cancellation",
            Self::EchoControlMobile => "echo_control_mobile",
            Self::GainControl => "gain_control",
            Self::HighPassFilter => "high_pass_filter",
            Self::LevelEstimator => "level_estimator",
            Self::NoiseSuppression => "noise_suppression",
            Self::VoiceDetection => "voice_detection",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine state a component needs at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StreamContext {
    pub(crate) sample_rate_hz: u32,
    pub(crate) split_sample_rate_hz: u32,
    pub(crate) samples_per_channel: usize,
    pub(crate) samples_per_split_channel: usize,
    pub(crate) num_reverse_channels: usize,
    pub(crate) num_input_channels: usize,
    pub(crate) num_output_channels: usize,
    pub(crate) stream_delay_ms: i32,
    pub(crate) was_stream_delay_set: bool,
}

#[cfg(test)]
impl StreamContext {
    /// Mono context at `sample_rate_hz` with the stream delay set to zero.
    pub(crate) fn for_rate(sample_rate_hz: u32) -> Self {
        let split_sample_rate_hz = sample_rate_hz.min(16_000);
        Self {
            sample_rate_hz,
            split_sample_rate_hz,
            samples_per_channel: sample_rate_hz as usize / 100,
            samples_per_split_channel: split_sample_rate_hz as usize / 100,
            num_reverse_channels: 1,
            num_input_channels: 1,
            num_output_channels: 1,
            stream_delay_ms: 0,
            was_stream_delay_set: true,
        }
    }
}

/// Lifecycle and processing hooks shared by every effect.
///
/// A disabled component succeeds without touching the buffer. Components
/// keep whatever per-channel state they need between frames; `initialize`
/// resets it for the current format.
pub(crate) trait ProcessingComponent: std::fmt::Debug + Send {
    /// Allocates and resets state for `ctx`. No-op when disabled.
    fn initialize(&mut self, ctx: &StreamContext) -> Result<(), Error>;

    /// Releases state. Safe to call repeatedly.
    fn destroy(&mut self);

    fn is_enabled(&self) -> bool;

    /// Flips the enabled flag without initializing.
    fn set_enabled(&mut self, enabled: bool);

    fn process_capture_audio(
        &mut self,
        audio: &mut AudioBuffer,
        ctx: &StreamContext,
    ) -> Result<(), Error>;

    fn process_render_audio(&mut self, _audio: &AudioBuffer, _ctx: &StreamContext) -> Result<(), Error> {
        Ok(())
    }

    /// Version string; empty when the component has none.
    fn version(&self) -> &'static str;
}

/// Every component an engine owns.
#[derive(Debug, Default)]
pub(crate) struct Components {
    pub(crate) echo_cancellation: EchoCancellation,
    pub(crate) echo_control_mobile: EchoControlMobile,
    pub(crate) gain_control: GainControl,
    pub(crate) high_pass_filter: HighPassFilter,
    pub(crate) level_estimator: LevelEstimator,
    pub(crate) noise_suppression: NoiseSuppression,
    pub(crate) voice_detection: VoiceDetection,
}

impl Components {
    pub(crate) fn get(&self, kind: ComponentKind) -> &dyn ProcessingComponent {
        match kind {
            ComponentKind::EchoCancellation => &self.echo_cancellation,
            ComponentKind::EchoControlMobile => &self.echo_control_mobile,
            ComponentKind::GainControl => &self.gain_control,
            ComponentKind::HighPassFilter => &self.high_pass_filter,
            ComponentKind::LevelEstimator => &self.level_estimator,
            ComponentKind::NoiseSuppression => &self.noise_suppression,
            ComponentKind::VoiceDetection => &self.voice_detection,
        }
    }

    pub(crate) fn get_mut(&mut self, kind: ComponentKind) -> &mut dyn ProcessingComponent {
        match kind {
            ComponentKind::EchoCancellation => &mut self.echo_cancellation,
            ComponentKind::EchoControlMobile => &mut self.echo_control_mobile,
            ComponentKind::GainControl => &mut self.gain_control,
            ComponentKind::HighPassFilter => &mut self.high_pass_filter,
            ComponentKind::LevelEstimator => &mut self.level_estimator,
            ComponentKind::NoiseSuppression => &mut self.noise_suppression,
            ComponentKind::VoiceDetection => &mut self.voice_detection,
        }
    }
}

/// Handle to one component of an engine.
///
/// Holds the engine lock for its whole lifetime: every other call on the
/// same engine blocks until the handle is dropped. Read-only queries are
/// reached through `Deref`; setters live on the handle.
///
/// # Deadlocks
///
/// The engine lock is not reentrant. Calling any method on the same
/// [`AudioProcessing`](crate::AudioProcessing) while a handle is alive, for
/// example from a `let` binding or a `match` scrutinee, blocks the thread
/// forever. Drop the handle first, or use a temporary per call:
///
/// ```no_run
/// # let apm = vqe::AudioProcessing::create(0)?;
/// let agc = apm.gain_control();
/// apm.process_stream(&mut vqe::AudioFrame::new(16_000, 1, 160))?; // deadlocks
/// # drop(agc);
/// # Ok::<(), vqe::Error>(())
/// ```
///
/// ```
/// use vqe::AudioProcessing;
/// use vqe::config::NoiseSuppressionLevel;
///
/// let apm = AudioProcessing::create(0)?;
/// let mut ns = apm.noise_suppression();
/// ns.set_level(NoiseSuppressionLevel::High)?;
/// ns.enable(true)?;
/// assert!(ns.is_enabled());
/// # Ok::<(), vqe::Error>(())
/// ```
pub struct ComponentGuard<'a, C> {
    core: MutexGuard<'a, AudioProcessingImpl>,
    kind: ComponentKind,
    select: fn(&Components) -> &C,
    select_mut: fn(&mut Components) -> &mut C,
}

impl<'a, C> ComponentGuard<'a, C> {
    pub(crate) fn new(
        core: MutexGuard<'a, AudioProcessingImpl>,
        kind: ComponentKind,
        select: fn(&Components) -> &C,
        select_mut: fn(&mut Components) -> &mut C,
    ) -> Self {
        Self {
            core,
            kind,
            select,
            select_mut,
        }
    }

    /// Which component this handle reaches.
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Enables or disables the component.
    ///
    /// Enabling a disabled component initializes it for the current format;
    /// if that fails the component stays disabled and the error is returned.
    /// Echo cancellation and mobile echo control are mutually exclusive:
    /// enabling one while the other is on fails with
    /// [`Error::BadParameter`].
    pub fn enable(&mut self, enable: bool) -> Result<(), Error> {
        self.core.enable_component(self.kind, enable)
    }

    pub(crate) fn component_mut(&mut self) -> &mut C {
        (self.select_mut)(&mut self.core.components)
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for ComponentGuard<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentGuard")
            .field("kind", &self.kind)
            .field("component", &**self)
            .finish_non_exhaustive()
    }
}

impl<C> Deref for ComponentGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        (self.select)(&self.core.components)
    }
}
