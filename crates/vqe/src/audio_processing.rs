//! Public engine API.

use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audio_frame::AudioFrame;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::echo_cancellation::EchoCancellation;
use crate::echo_control_mobile::EchoControlMobile;
use crate::gain_control::GainControl;
use crate::high_pass_filter::HighPassFilter;
use crate::level_estimator::LevelEstimator;
use crate::noise_suppression::NoiseSuppression;
use crate::processing_component::{ComponentGuard, ComponentKind};
use crate::stream_config::{StreamConfigError, StreamFormat};
use crate::voice_detection::VoiceDetection;

/// Engine version string, the first line of [`AudioProcessing::version`].
pub const VERSION: &str = "AudioProcessing 1.0.0";

/// Errors returned by the engine.
///
/// [`Error::BadStreamParameterWarning`] is the only non-fatal kind: the
/// call took effect with an adjusted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// Internal failure with no more specific kind.
    Unspecified,
    /// A required pointer was null (C ABI only).
    NullPointer,
    /// An argument was out of range.
    BadParameter,
    /// A frame's rate differs from the configured rate.
    BadSampleRate,
    /// A frame's length differs from the configured frame length.
    BadDataLength,
    /// A frame's channel count differs from the configuration.
    BadNumberChannels,
    /// The debug trace could not be opened, written or closed.
    File,
    /// A per-frame stream parameter was not provided.
    StreamParameterNotSet,
    /// The queried component or feature is disabled.
    NotEnabled,
    /// A stream parameter was clamped into range.
    BadStreamParameterWarning,
}

impl Error {
    /// Legacy integer code.
    pub const fn code(self) -> i32 {
        match self {
            Self::Unspecified => -1,
            Self::NullPointer => -5,
            Self::BadParameter => -6,
            Self::BadSampleRate => -7,
            Self::BadDataLength => -8,
            Self::BadNumberChannels => -9,
            Self::File => -10,
            Self::StreamParameterNotSet => -11,
            Self::NotEnabled => -12,
            Self::BadStreamParameterWarning => -13,
        }
    }

    /// Whether the error is a warning rather than a failure.
    pub const fn is_warning(self) -> bool {
        matches!(self, Self::BadStreamParameterWarning)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::Unspecified => "unspecified error",
            Self::NullPointer => "null pointer",
            Self::BadParameter => "parameter out of range",
            Self::BadSampleRate => "frame sample rate does not match configuration",
            Self::BadDataLength => "frame length does not match configuration",
            Self::BadNumberChannels => "frame channel count does not match configuration",
            Self::File => "debug trace file error",
            Self::StreamParameterNotSet => "stream parameter not set for this frame",
            Self::NotEnabled => "component not enabled",
            Self::BadStreamParameterWarning => "stream parameter clamped",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

impl From<StreamConfigError> for Error {
    fn from(err: StreamConfigError) -> Self {
        warn!(%err, "rejected stream configuration");
        Self::BadParameter
    }
}

/// Builder for an [`AudioProcessing`] instance.
///
/// Values are validated by [`build`](Self::build).
///
/// ```
/// use vqe::AudioProcessing;
///
/// let apm = AudioProcessing::builder()
///     .id(7)
///     .sample_rate_hz(32_000)
///     .num_channels(2, 1)
///     .num_reverse_channels(2)
///     .build()?;
/// assert_eq!(apm.sample_rate_hz(), 32_000);
/// assert_eq!(apm.num_output_channels(), 1);
/// # Ok::<(), vqe::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct AudioProcessingBuilder {
    id: i32,
    sample_rate_hz: u32,
    num_input_channels: usize,
    num_output_channels: usize,
    num_reverse_channels: usize,
}

impl Default for AudioProcessingBuilder {
    fn default() -> Self {
        let format = StreamFormat::default();
        Self {
            id: 0,
            sample_rate_hz: format.sample_rate_hz(),
            num_input_channels: format.num_input_channels(),
            num_output_channels: format.num_output_channels(),
            num_reverse_channels: format.num_reverse_channels(),
        }
    }
}

impl AudioProcessingBuilder {
    /// Diagnostic id attached to every log event.
    pub fn id(mut self, id: i32) -> Self {
        self.id = id;
        self
    }

    pub fn sample_rate_hz(mut self, sample_rate_hz: u32) -> Self {
        self.sample_rate_hz = sample_rate_hz;
        self
    }

    /// Capture input and output channel counts.
    pub fn num_channels(mut self, input: usize, output: usize) -> Self {
        self.num_input_channels = input;
        self.num_output_channels = output;
        self
    }

    /// Render channel count.
    pub fn num_reverse_channels(mut self, channels: usize) -> Self {
        self.num_reverse_channels = channels;
        self
    }

    /// Validates the format and creates an initialized engine.
    pub fn build(self) -> Result<AudioProcessing, Error> {
        let format = StreamFormat::default()
            .with_sample_rate_hz(self.sample_rate_hz)?
            .with_num_channels(self.num_input_channels, self.num_output_channels)?
            .with_num_reverse_channels(self.num_reverse_channels)?;
        let mut core = AudioProcessingImpl::new(self.id, format);
        core.initialize()?;
        debug!(id = self.id, "audio processing created");
        Ok(AudioProcessing {
            core: Mutex::new(core),
        })
    }
}

/// Voice enhancement engine.
///
/// Every method takes `&self` and runs under one per-instance lock, so an
/// instance can be shared between a capture thread and a render thread.
/// Component handles returned by the accessors hold that lock until
/// dropped.
///
/// Dropping the engine releases every component in registration order
/// and closes an open debug trace.
#[derive(Debug)]
pub struct AudioProcessing {
    core: Mutex<AudioProcessingImpl>,
}

impl AudioProcessing {
    /// Creates an engine at 16 kHz mono with every component disabled.
    pub fn create(id: i32) -> Result<Self, Error> {
        Self::builder().id(id).build()
    }

    pub fn builder() -> AudioProcessingBuilder {
        AudioProcessingBuilder::default()
    }

    /// Reallocates buffers and reinitializes every component for the
    /// current format.
    ///
    /// Components are initialized in registration order; the first failure
    /// is returned and components initialized before it are not rolled
    /// back. Also clears the stream delay flag.
    pub fn initialize(&self) -> Result<(), Error> {
        self.core.lock().initialize()
    }

    /// Sets the processing rate (8000, 16000 or 32000 Hz) and reinitializes.
    ///
    /// Invalid rates return [`Error::BadParameter`] without changing
    /// anything. A component failing to initialize at the new rate is
    /// reported, but the rate change itself is kept.
    pub fn set_sample_rate_hz(&self, rate: u32) -> Result<(), Error> {
        let mut core = self.core.lock();
        let format = core.format.with_sample_rate_hz(rate)?;
        core.reconfigure(format)
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.core.lock().format.sample_rate_hz()
    }

    /// Sets the render channel count (1 or 2) and reinitializes.
    pub fn set_num_reverse_channels(&self, channels: usize) -> Result<(), Error> {
        let mut core = self.core.lock();
        let format = core.format.with_num_reverse_channels(channels)?;
        core.reconfigure(format)
    }

    pub fn num_reverse_channels(&self) -> usize {
        self.core.lock().format.num_reverse_channels()
    }

    /// Sets capture input and output channel counts and reinitializes.
    ///
    /// Both must be 1 or 2 and `output <= input`; stereo input with mono
    /// output is averaged before processing.
    pub fn set_num_channels(&self, input: usize, output: usize) -> Result<(), Error> {
        let mut core = self.core.lock();
        let format = core.format.with_num_channels(input, output)?;
        core.reconfigure(format)
    }

    pub fn num_input_channels(&self) -> usize {
        self.core.lock().format.num_input_channels()
    }

    pub fn num_output_channels(&self) -> usize {
        self.core.lock().format.num_output_channels()
    }

    /// Snapshot of the current format.
    pub fn format(&self) -> StreamFormat {
        self.core.lock().format
    }

    /// Processes one near-end frame in place.
    ///
    /// The frame must match the configured rate, input channel count and
    /// frame length; a mismatch is rejected before anything is touched.
    /// With fewer output than input channels the frame comes back with the
    /// output channel count. If a component fails, its error is returned
    /// and the frame content is unspecified.
    pub fn process_stream(&self, frame: &mut AudioFrame) -> Result<(), Error> {
        self.core.lock().process_stream(frame)
    }

    /// Feeds one far-end frame to the components that model echo.
    ///
    /// On success the stream delay must be set again before the next
    /// [`process_stream`](Self::process_stream) when echo control is on.
    pub fn analyze_reverse_stream(&self, frame: &AudioFrame) -> Result<(), Error> {
        self.core.lock().analyze_reverse_stream(frame)
    }

    /// Reports the delay between a far-end frame being analyzed and its
    /// echo reaching the capture path.
    ///
    /// Negative delays return [`Error::BadParameter`] and keep the previous
    /// value. Delays above 500 ms are clamped and reported with
    /// [`Error::BadStreamParameterWarning`]. Either way the delay counts as
    /// set for the next capture frame.
    pub fn set_stream_delay_ms(&self, delay: i32) -> Result<(), Error> {
        self.core.lock().set_stream_delay_ms(delay)
    }

    pub fn stream_delay_ms(&self) -> i32 {
        self.core.lock().stream_delay_ms
    }

    /// Whether the delay was set since the last reinitialization or
    /// analyzed far-end frame.
    pub fn was_stream_delay_set(&self) -> bool {
        self.core.lock().was_stream_delay_set
    }

    /// Starts recording a debug trace to `path`, replacing any open trace.
    pub fn start_debug_recording(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.core.lock().start_debug_recording(path.as_ref())
    }

    /// Starts recording a debug trace into an arbitrary sink.
    pub fn start_debug_recording_to<W: Write + Send + 'static>(&self, sink: W) -> Result<(), Error> {
        self.core.lock().start_debug_recording_to(Box::new(sink))
    }

    /// Flushes and closes the trace. A no-op when none is open.
    pub fn stop_debug_recording(&self) -> Result<(), Error> {
        self.core.lock().stop_debug_recording()
    }

    pub fn is_debug_recording(&self) -> bool {
        self.core.lock().is_recording()
    }

    /// Replaces the diagnostic id carried on log events.
    pub fn change_unique_id(&self, id: i32) {
        let mut core = self.core.lock();
        debug!(old = core.id, new = id, "unique id changed");
        core.id = id;
    }

    pub fn id(&self) -> i32 {
        self.core.lock().id
    }

    /// Writes the engine and component versions into `buffer` at
    /// `position`, one per line, skipping components without a version.
    ///
    /// Everything from `position` to the end of the buffer is zeroed first.
    /// Returns [`Error::BadParameter`] as soon as the next line does not
    /// fit; `position` then points past the last line written.
    pub fn version_into(&self, buffer: &mut [u8], position: &mut usize) -> Result<(), Error> {
        self.core.lock().version_into(buffer, position)
    }

    /// Engine and component versions, one per line.
    pub fn version(&self) -> String {
        let core = self.core.lock();
        let mut buffer = vec![0u8; 256];
        let mut position = 0;
        // 256 bytes hold every version line.
        if core.version_into(&mut buffer, &mut position).is_err() {
            return VERSION.to_owned();
        }
        buffer.truncate(position);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn echo_cancellation(&self) -> ComponentGuard<'_, EchoCancellation> {
        ComponentGuard::new(
            self.core.lock(),
            ComponentKind::EchoCancellation,
            |c| &c.echo_cancellation,
            |c| &mut c.echo_cancellation,
        )
    }

    pub fn echo_control_mobile(&self) -> ComponentGuard<'_, EchoControlMobile> {
        ComponentGuard::new(
            self.core.lock(),
            ComponentKind::EchoControlMobile,
            |c| &c.echo_control_mobile,
            |c| &mut c.echo_control_mobile,
        )
    }

    pub fn gain_control(&self) -> ComponentGuard<'_, GainControl> {
        ComponentGuard::new(
            self.core.lock(),
            ComponentKind::GainControl,
            |c| &c.gain_control,
            |c| &mut c.gain_control,
        )
    }

    pub fn high_pass_filter(&self) -> ComponentGuard<'_, HighPassFilter> {
        ComponentGuard::new(
            self.core.lock(),
            ComponentKind::HighPassFilter,
            |c| &c.high_pass_filter,
            |c| &mut c.high_pass_filter,
        )
    }

    pub fn level_estimator(&self) -> ComponentGuard<'_, LevelEstimator> {
        ComponentGuard::new(
            self.core.lock(),
            ComponentKind::LevelEstimator,
            |c| &c.level_estimator,
            |c| &mut c.level_estimator,
        )
    }

    pub fn noise_suppression(&self) -> ComponentGuard<'_, NoiseSuppression> {
        ComponentGuard::new(
            self.core.lock(),
            ComponentKind::NoiseSuppression,
            |c| &c.noise_suppression,
            |c| &mut c.noise_suppression,
        )
    }

    pub fn voice_detection(&self) -> ComponentGuard<'_, VoiceDetection> {
        ComponentGuard::new(
            self.core.lock(),
            ComponentKind::VoiceDetection,
            |c| &c.voice_detection,
            |c| &mut c.voice_detection,
        )
    }

    /// Enables or disables a component by kind.
    pub fn enable_component(&self, kind: ComponentKind, enable: bool) -> Result<(), Error> {
        self.core.lock().enable_component(kind, enable)
    }

    /// Whether a component is enabled, by kind.
    pub fn is_component_enabled(&self, kind: ComponentKind) -> bool {
        self.core.lock().components.get(kind).is_enabled()
    }
}
