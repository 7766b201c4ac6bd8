//! Component settings.
//!
//! Each enum maps to one knob on a component handle. Defaults match what a
//! freshly created engine reports.

/// Aggressiveness of the echo canceller's residual suppression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SuppressionLevel {
    /// Preserve double talk at the cost of some residual echo.
    Low,
    /// Balanced suppression.
    #[default]
    Moderate,
    /// Remove as much residual echo as possible.
    High,
}

impl SuppressionLevel {
    /// Scale applied to the echo estimate before computing the suppression
    /// gain.
    pub(crate) fn overdrive(self) -> f32 {
        match self {
            Self::Low => 0.5,
            Self::Moderate => 1.0,
            Self::High => 2.0,
        }
    }
}

/// Acoustic routing the mobile echo controller is tuned for.
///
/// Louder routings expect a stronger echo path and suppress harder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RoutingMode {
    /// Headset or quiet earpiece.
    QuietEarpieceOrHeadset,
    /// Handset earpiece.
    Earpiece,
    /// Handset earpiece at high volume.
    LoudEarpiece,
    /// Hands-free speaker.
    #[default]
    Speakerphone,
    /// Hands-free speaker at high volume.
    LoudSpeakerphone,
}

impl RoutingMode {
    pub(crate) fn overdrive(self) -> f32 {
        match self {
            Self::QuietEarpieceOrHeadset => 1.0,
            Self::Earpiece => 1.5,
            Self::LoudEarpiece => 2.0,
            Self::Speakerphone => 3.0,
            Self::LoudSpeakerphone => 4.0,
        }
    }
}

/// Gain control strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GainControlMode {
    /// Recommends an analog (device) volume and applies digital gain.
    /// Requires the current analog level before every capture frame.
    #[default]
    AdaptiveAnalog,
    /// Digital gain only, adapted toward the target level.
    AdaptiveDigital,
    /// Constant digital gain of `compression_gain_db`.
    FixedDigital,
}

/// Noise suppression strength.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NoiseSuppressionLevel {
    /// Up to 6 dB of attenuation.
    Low,
    /// Up to 12 dB of attenuation.
    #[default]
    Moderate,
    /// Up to 18 dB of attenuation.
    High,
    /// Up to 21 dB of attenuation.
    VeryHigh,
}

impl NoiseSuppressionLevel {
    /// Lowest linear gain the suppressor applies.
    pub(crate) fn gain_floor(self) -> f32 {
        match self {
            Self::Low => 0.5,
            Self::Moderate => 0.25,
            Self::High => 0.125,
            Self::VeryHigh => 0.089,
        }
    }
}

/// Likelihood that the voice detector reports voice.
///
/// Lower likelihood means fewer false positives and more missed voice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VadLikelihood {
    VeryLow,
    #[default]
    Low,
    Moderate,
    High,
}

impl VadLikelihood {
    /// Margin above the noise floor a frame must reach to count as voice.
    pub(crate) fn threshold_db(self) -> f32 {
        match self {
            Self::VeryLow => 12.0,
            Self::Low => 9.0,
            Self::Moderate => 6.0,
            Self::High => 3.0,
        }
    }
}
