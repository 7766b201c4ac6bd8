//! Fixed processing order for both streams.
//!
//! Lifecycle operations (initialize, destroy, version) visit components in
//! [`REGISTRATION_ORDER`]. Stream processing follows the stage tables, which
//! differ from registration order and include the non-component reference
//! snapshot step.

use crate::processing_component::ComponentKind;

pub(crate) const REGISTRATION_ORDER: [ComponentKind; 7] = [
    ComponentKind::EchoCancellation,
    ComponentKind::EchoControlMobile,
    ComponentKind::GainControl,
    ComponentKind::HighPassFilter,
    ComponentKind::LevelEstimator,
    ComponentKind::NoiseSuppression,
    ComponentKind::VoiceDetection,
];

/// One step of the near-end pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CaptureStage {
    HighPassFilter,
    /// Gain control measures the input before any other effect runs.
    AnalyzeGain,
    EchoCancellation,
    /// Copy the low band for mobile echo control when noise suppression
    /// will modify it first.
    SnapshotReference,
    NoiseSuppression,
    EchoControlMobile,
    VoiceDetection,
    ApplyGain,
    #[cfg_attr(
        not(feature = "level-estimation"),
        allow(dead_code, reason = "stage is only scheduled with level-estimation")
    )]
    LevelEstimation,
}

#[cfg(not(feature = "level-estimation"))]
pub(crate) const CAPTURE_PIPELINE: &[CaptureStage] = &[
    CaptureStage::HighPassFilter,
    CaptureStage::AnalyzeGain,
    CaptureStage::EchoCancellation,
    CaptureStage::SnapshotReference,
    CaptureStage::NoiseSuppression,
    CaptureStage::EchoControlMobile,
    CaptureStage::VoiceDetection,
    CaptureStage::ApplyGain,
];

#[cfg(feature = "level-estimation")]
pub(crate) const CAPTURE_PIPELINE: &[CaptureStage] = &[
    CaptureStage::HighPassFilter,
    CaptureStage::AnalyzeGain,
    CaptureStage::EchoCancellation,
    CaptureStage::SnapshotReference,
    CaptureStage::NoiseSuppression,
    CaptureStage::EchoControlMobile,
    CaptureStage::VoiceDetection,
    CaptureStage::ApplyGain,
    CaptureStage::LevelEstimation,
];

/// One step of the far-end pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderStage {
    EchoCancellation,
    EchoControlMobile,
    GainControl,
    #[cfg_attr(
        not(feature = "level-estimation"),
        allow(dead_code, reason = "stage is only scheduled with level-estimation")
    )]
    LevelEstimation,
}

#[cfg(not(feature = "level-estimation"))]
pub(crate) const RENDER_PIPELINE: &[RenderStage] = &[
    RenderStage::EchoCancellation,
    RenderStage::EchoControlMobile,
    RenderStage::GainControl,
];

#[cfg(feature = "level-estimation")]
pub(crate) const RENDER_PIPELINE: &[RenderStage] = &[
    RenderStage::EchoCancellation,
    RenderStage::EchoControlMobile,
    RenderStage::GainControl,
    RenderStage::LevelEstimation,
];
