//! C-compatible types.

use crate::AudioProcessing;

/// Opaque engine handle.
#[derive(Debug)]
pub struct VqeAudioProcessing {
    pub(crate) inner: AudioProcessing,
}

/// Status codes returned by the C functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VqeError {
    NoError = 0,
    Unspecified = -1,
    NullPointer = -5,
    BadParameter = -6,
    BadSampleRate = -7,
    BadDataLength = -8,
    BadNumberChannels = -9,
    File = -10,
    StreamParameterNotSet = -11,
    NotEnabled = -12,
    BadStreamParameterWarning = -13,
}

/// Component selector for [`vqe_component_enable`](super::functions::vqe_component_enable).
///
/// Passed across the C boundary as a plain `int`; values outside this
/// enum are rejected with [`VqeError::BadParameter`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VqeComponent {
    EchoCancellation = 0,
    EchoControlMobile = 1,
    GainControl = 2,
    HighPassFilter = 3,
    LevelEstimator = 4,
    NoiseSuppression = 5,
    VoiceDetection = 6,
}
