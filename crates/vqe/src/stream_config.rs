//! Stream format: sample rate and channel layout shared by both streams.

/// Maximum number of channels on any stream.
pub const MAX_NUM_CHANNELS: usize = 2;

/// Error returned when building or updating a [`StreamFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamConfigError {
    /// Sample rate is not one of 8000, 16000 or 32000 Hz.
    UnsupportedSampleRate { sample_rate_hz: u32 },
    /// Channel count is outside `1..=2`.
    UnsupportedChannelCount { num_channels: usize },
    /// More output than input channels were requested.
    OutputExceedsInput { input: usize, output: usize },
}

impl std::fmt::Display for StreamConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::UnsupportedSampleRate { sample_rate_hz } => write!(
                f,
                "unsupported sample rate {sample_rate_hz}; expected 8000, 16000 or 32000",
            ),
            Self::UnsupportedChannelCount { num_channels } => write!(
                f,
                "unsupported channel count {num_channels}; expected 1..={MAX_NUM_CHANNELS}",
            ),
            Self::OutputExceedsInput { input, output } => write!(
                f,
                "{output} output channels requested from {input} input channels",
            ),
        }
    }
}

impl std::error::Error for StreamConfigError {}

/// Supported processing rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRate {
    /// 8 kHz narrowband.
    Rate8kHz,
    /// 16 kHz wideband.
    Rate16kHz,
    /// 32 kHz super-wideband, processed as two 16 kHz bands.
    Rate32kHz,
}

impl SampleRate {
    /// The rate in Hz.
    pub const fn hz(self) -> u32 {
        match self {
            Self::Rate8kHz => 8_000,
            Self::Rate16kHz => 16_000,
            Self::Rate32kHz => 32_000,
        }
    }

    /// Rate of the band the effect components run on.
    pub const fn split_hz(self) -> u32 {
        match self {
            Self::Rate32kHz => 16_000,
            other => other.hz(),
        }
    }

    /// Whether frames are split into low and high bands.
    pub const fn is_split(self) -> bool {
        matches!(self, Self::Rate32kHz)
    }

    /// Samples per channel in one 10 ms frame.
    pub const fn samples_per_channel(self) -> usize {
        self.hz() as usize / 100
    }

    /// Samples per channel per band in one 10 ms frame.
    pub const fn samples_per_split_channel(self) -> usize {
        self.split_hz() as usize / 100
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = StreamConfigError;

    fn try_from(sample_rate_hz: u32) -> Result<Self, Self::Error> {
        match sample_rate_hz {
            8_000 => Ok(Self::Rate8kHz),
            16_000 => Ok(Self::Rate16kHz),
            32_000 => Ok(Self::Rate32kHz),
            _ => Err(StreamConfigError::UnsupportedSampleRate { sample_rate_hz }),
        }
    }
}

/// Validated engine format.
///
/// Invariants:
/// - the sample rate is one of the [`SampleRate`] variants;
/// - every channel count is in `1..=2`;
/// - `num_output_channels <= num_input_channels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    sample_rate: SampleRate,
    num_reverse_channels: usize,
    num_input_channels: usize,
    num_output_channels: usize,
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Rate16kHz,
            num_reverse_channels: 1,
            num_input_channels: 1,
            num_output_channels: 1,
        }
    }
}

impl StreamFormat {
    /// Returns a copy with a new sample rate.
    pub fn with_sample_rate_hz(self, sample_rate_hz: u32) -> Result<Self, StreamConfigError> {
        Ok(Self {
            sample_rate: SampleRate::try_from(sample_rate_hz)?,
            ..self
        })
    }

    /// Returns a copy with a new render channel count.
    pub fn with_num_reverse_channels(self, channels: usize) -> Result<Self, StreamConfigError> {
        check_channel_count(channels)?;
        Ok(Self {
            num_reverse_channels: channels,
            ..self
        })
    }

    /// Returns a copy with new capture input/output channel counts.
    pub fn with_num_channels(
        self,
        input_channels: usize,
        output_channels: usize,
    ) -> Result<Self, StreamConfigError> {
        if output_channels > input_channels {
            return Err(StreamConfigError::OutputExceedsInput {
                input: input_channels,
                output: output_channels,
            });
        }
        check_channel_count(input_channels)?;
        check_channel_count(output_channels)?;
        Ok(Self {
            num_input_channels: input_channels,
            num_output_channels: output_channels,
            ..self
        })
    }

    /// The processing rate.
    #[inline]
    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// The processing rate in Hz.
    #[inline]
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate.hz()
    }

    /// The rate the effect components run at, in Hz.
    #[inline]
    pub fn split_sample_rate_hz(&self) -> u32 {
        self.sample_rate.split_hz()
    }

    /// Samples per channel in one 10 ms frame.
    #[inline]
    pub fn samples_per_channel(&self) -> usize {
        self.sample_rate.samples_per_channel()
    }

    /// Samples per channel per band in one 10 ms frame.
    #[inline]
    pub fn samples_per_split_channel(&self) -> usize {
        self.sample_rate.samples_per_split_channel()
    }

    /// Channels on the render stream.
    #[inline]
    pub fn num_reverse_channels(&self) -> usize {
        self.num_reverse_channels
    }

    /// Channels on the capture stream as delivered.
    #[inline]
    pub fn num_input_channels(&self) -> usize {
        self.num_input_channels
    }

    /// Channels on the capture stream after processing.
    #[inline]
    pub fn num_output_channels(&self) -> usize {
        self.num_output_channels
    }
}

fn check_channel_count(num_channels: usize) -> Result<(), StreamConfigError> {
    if (1..=MAX_NUM_CHANNELS).contains(&num_channels) {
        Ok(())
    } else {
        Err(StreamConfigError::UnsupportedChannelCount { num_channels })
    }
}
