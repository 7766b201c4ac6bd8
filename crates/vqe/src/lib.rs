//! Voice quality enhancement engine.
//!
//! Conditions a near-end (capture) stream before transmission and analyzes
//! the far-end (render) stream to support echo control. Frames are 10 ms of
//! interleaved 16-bit PCM at 8, 16 or 32 kHz, mono or stereo.
//!
//! # Quick Start
//!
//! ```
//! use vqe::{AudioFrame, AudioProcessing};
//!
//! let apm = AudioProcessing::create(0)?;
//! apm.noise_suppression().enable(true)?;
//! apm.voice_detection().enable(true)?;
//!
//! // For each 10 ms frame:
//! let render = AudioFrame::new(16_000, 1, 160);
//! apm.analyze_reverse_stream(&render)?;
//!
//! let mut capture = AudioFrame::new(16_000, 1, 160);
//! apm.process_stream(&mut capture)?;
//! let _has_voice = apm.voice_detection().stream_has_voice();
//! # Ok::<(), vqe::Error>(())
//! ```

pub(crate) mod audio_buffer;
pub mod audio_frame;
mod audio_processing;
pub(crate) mod audio_processing_impl;
pub mod config;
pub mod debug_recorder;
pub mod echo_cancellation;
pub mod echo_control_mobile;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod gain_control;
pub mod high_pass_filter;
pub mod level_estimator;
pub mod noise_suppression;
pub(crate) mod pipeline;
pub mod processing_component;
pub mod stats;
pub mod stream_config;
pub mod voice_detection;

// Public re-exports.
pub use audio_frame::AudioFrame;
pub use audio_processing::{AudioProcessing, AudioProcessingBuilder, Error, VERSION};
pub use processing_component::{ComponentGuard, ComponentKind};
pub use stream_config::{SampleRate, StreamFormat};
