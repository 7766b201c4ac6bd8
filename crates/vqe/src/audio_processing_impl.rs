//! Engine state behind the instance lock.

use std::io::Write;
use std::path::Path;

use tracing::{debug, error, trace, warn};

use crate::audio_buffer::AudioBuffer;
use crate::audio_frame::AudioFrame;
use crate::audio_processing::{Error, VERSION};
use crate::debug_recorder::{DebugRecorder, StreamDirection};
use crate::pipeline::{CAPTURE_PIPELINE, CaptureStage, REGISTRATION_ORDER, RENDER_PIPELINE, RenderStage};
use crate::processing_component::{ComponentKind, Components, ProcessingComponent, StreamContext};
use crate::stream_config::{MAX_NUM_CHANNELS, StreamFormat};

/// Largest accepted stream delay; larger values are clamped.
pub(crate) const MAX_STREAM_DELAY_MS: i32 = 500;

#[derive(Debug)]
pub(crate) struct AudioProcessingImpl {
    pub(crate) id: i32,
    pub(crate) format: StreamFormat,
    pub(crate) stream_delay_ms: i32,
    pub(crate) was_stream_delay_set: bool,
    capture_audio: AudioBuffer,
    render_audio: AudioBuffer,
    pub(crate) components: Components,
    debug_recorder: DebugRecorder,
}

fn allocate_buffers(format: &StreamFormat) -> (AudioBuffer, AudioBuffer) {
    let split = format.sample_rate().is_split();
    let samples = format.samples_per_channel();
    (
        AudioBuffer::new(MAX_NUM_CHANNELS, samples, split),
        AudioBuffer::new(MAX_NUM_CHANNELS, samples, split),
    )
}

impl AudioProcessingImpl {
    pub(crate) fn new(id: i32, format: StreamFormat) -> Self {
        let (capture_audio, render_audio) = allocate_buffers(&format);
        Self {
            id,
            format,
            stream_delay_ms: 0,
            was_stream_delay_set: false,
            capture_audio,
            render_audio,
            components: Components::default(),
            debug_recorder: DebugRecorder::default(),
        }
    }

    pub(crate) fn stream_context(&self) -> StreamContext {
        StreamContext {
            sample_rate_hz: self.format.sample_rate_hz(),
            split_sample_rate_hz: self.format.split_sample_rate_hz(),
            samples_per_channel: self.format.samples_per_channel(),
            samples_per_split_channel: self.format.samples_per_split_channel(),
            num_reverse_channels: self.format.num_reverse_channels(),
            num_input_channels: self.format.num_input_channels(),
            num_output_channels: self.format.num_output_channels(),
            stream_delay_ms: self.stream_delay_ms,
            was_stream_delay_set: self.was_stream_delay_set,
        }
    }

    /// Reallocates buffers and initializes every component in registration
    /// order. Stops at the first failure; components initialized before it
    /// keep their new state.
    pub(crate) fn initialize(&mut self) -> Result<(), Error> {
        let (capture_audio, render_audio) = allocate_buffers(&self.format);
        self.capture_audio = capture_audio;
        self.render_audio = render_audio;
        self.was_stream_delay_set = false;

        let ctx = self.stream_context();
        for kind in REGISTRATION_ORDER {
            self.components.get_mut(kind).initialize(&ctx).inspect_err(|err| {
                error!(id = self.id, component = %kind, %err, "component initialization failed");
            })?;
        }

        debug!(
            id = self.id,
            sample_rate_hz = self.format.sample_rate_hz(),
            input_channels = self.format.num_input_channels(),
            output_channels = self.format.num_output_channels(),
            reverse_channels = self.format.num_reverse_channels(),
            "initialized"
        );
        Ok(())
    }

    /// Swaps in a new format and reinitializes.
    pub(crate) fn reconfigure(&mut self, format: StreamFormat) -> Result<(), Error> {
        self.format = format;
        self.initialize()
    }

    pub(crate) fn enable_component(&mut self, kind: ComponentKind, enable: bool) -> Result<(), Error> {
        let conflict = match kind {
            ComponentKind::EchoCancellation => self.components.echo_control_mobile.is_enabled(),
            ComponentKind::EchoControlMobile => self.components.echo_cancellation.is_enabled(),
            _ => false,
        };
        if enable && conflict {
            warn!(id = self.id, component = %kind, "echo cancellation and mobile echo control are exclusive");
            return Err(Error::BadParameter);
        }

        let ctx = self.stream_context();
        let component = self.components.get_mut(kind);
        if enable && !component.is_enabled() {
            component.set_enabled(true);
            if let Err(err) = component.initialize(&ctx) {
                component.set_enabled(false);
                error!(id = self.id, component = %kind, %err, "failed to enable component");
                return Err(err);
            }
        } else {
            component.set_enabled(enable);
        }
        debug!(id = self.id, component = %kind, enable, "component toggled");
        Ok(())
    }

    pub(crate) fn set_stream_delay_ms(&mut self, delay: i32) -> Result<(), Error> {
        self.was_stream_delay_set = true;
        if delay < 0 {
            return Err(Error::BadParameter);
        }
        if delay > MAX_STREAM_DELAY_MS {
            warn!(id = self.id, delay, "stream delay clamped to {MAX_STREAM_DELAY_MS} ms");
            self.stream_delay_ms = MAX_STREAM_DELAY_MS;
            return Err(Error::BadStreamParameterWarning);
        }
        self.stream_delay_ms = delay;
        Ok(())
    }

    pub(crate) fn start_debug_recording(&mut self, path: &Path) -> Result<(), Error> {
        self.debug_recorder
            .start_file(path, self.format.sample_rate_hz())
    }

    pub(crate) fn start_debug_recording_to(&mut self, sink: Box<dyn Write + Send>) -> Result<(), Error> {
        self.debug_recorder
            .start(sink, self.format.sample_rate_hz())
    }

    pub(crate) fn stop_debug_recording(&mut self) -> Result<(), Error> {
        self.debug_recorder.stop()
    }

    pub(crate) fn is_recording(&self) -> bool {
        self.debug_recorder.is_open()
    }

    fn check_frame(&self, frame: &AudioFrame, num_channels: usize) -> Result<(), Error> {
        if frame.sample_rate_hz() != self.format.sample_rate_hz() {
            return Err(Error::BadSampleRate);
        }
        if frame.num_channels() != num_channels {
            return Err(Error::BadNumberChannels);
        }
        if frame.samples_per_channel() != self.format.samples_per_channel() {
            return Err(Error::BadDataLength);
        }
        Ok(())
    }

    pub(crate) fn process_stream(&mut self, frame: &mut AudioFrame) -> Result<(), Error> {
        let format = self.format;
        self.check_frame(frame, format.num_input_channels())?;
        self.debug_recorder
            .record_frame(StreamDirection::Capture, frame)?;

        self.capture_audio.deinterleave_from(frame);
        if format.num_output_channels() < format.num_input_channels() {
            self.capture_audio.mix(format.num_output_channels());
            frame.set_num_channels(format.num_output_channels());
        }
        if self.capture_audio.is_split() {
            for ch in 0..format.num_input_channels() {
                self.capture_audio.split_channel(ch);
            }
        }

        let ctx = self.stream_context();
        for &stage in CAPTURE_PIPELINE {
            self.run_capture_stage(stage, &ctx).inspect_err(|err| {
                trace!(id = self.id, ?stage, %err, "capture stage failed");
            })?;
        }

        if self.capture_audio.is_split() {
            for ch in 0..format.num_output_channels() {
                self.capture_audio.merge_channel(ch);
            }
        }
        self.capture_audio.interleave_to(frame);
        trace!(id = self.id, "capture frame processed");
        Ok(())
    }

    fn run_capture_stage(&mut self, stage: CaptureStage, ctx: &StreamContext) -> Result<(), Error> {
        let audio = &mut self.capture_audio;
        let components = &mut self.components;
        match stage {
            CaptureStage::HighPassFilter => components.high_pass_filter.process_capture_audio(audio, ctx),
            CaptureStage::AnalyzeGain => components.gain_control.analyze_capture_audio(audio, ctx),
            CaptureStage::EchoCancellation => {
                components.echo_cancellation.process_capture_audio(audio, ctx)
            }
            CaptureStage::SnapshotReference => {
                if components.echo_control_mobile.is_enabled()
                    && components.noise_suppression.is_enabled()
                {
                    audio.copy_low_pass_to_reference();
                }
                Ok(())
            }
            CaptureStage::NoiseSuppression => {
                components.noise_suppression.process_capture_audio(audio, ctx)
            }
            CaptureStage::EchoControlMobile => {
                components.echo_control_mobile.process_capture_audio(audio, ctx)
            }
            CaptureStage::VoiceDetection => components.voice_detection.process_capture_audio(audio, ctx),
            CaptureStage::ApplyGain => components.gain_control.process_capture_audio(audio, ctx),
            CaptureStage::LevelEstimation => components.level_estimator.process_capture_audio(audio, ctx),
        }
    }

    pub(crate) fn analyze_reverse_stream(&mut self, frame: &AudioFrame) -> Result<(), Error> {
        self.check_frame(frame, self.format.num_reverse_channels())?;
        self.debug_recorder
            .record_frame(StreamDirection::Render, frame)?;

        self.render_audio.deinterleave_from(frame);
        if self.render_audio.is_split() {
            for ch in 0..frame.num_channels() {
                self.render_audio.split_channel(ch);
            }
        }

        let ctx = self.stream_context();
        for &stage in RENDER_PIPELINE {
            let audio = &self.render_audio;
            let components = &mut self.components;
            let result = match stage {
                RenderStage::EchoCancellation => {
                    components.echo_cancellation.process_render_audio(audio, &ctx)
                }
                RenderStage::EchoControlMobile => {
                    components.echo_control_mobile.process_render_audio(audio, &ctx)
                }
                RenderStage::GainControl => components.gain_control.process_render_audio(audio, &ctx),
                RenderStage::LevelEstimation => {
                    components.level_estimator.process_render_audio(audio, &ctx)
                }
            };
            result.inspect_err(|err| trace!(id = self.id, ?stage, %err, "render stage failed"))?;
        }

        self.was_stream_delay_set = false;
        trace!(id = self.id, "render frame analyzed");
        Ok(())
    }

    /// Writes the engine and component versions into `buffer` from
    /// `position`, advancing `position` past what was written.
    pub(crate) fn version_into(&self, buffer: &mut [u8], position: &mut usize) -> Result<(), Error> {
        let Some(tail) = buffer.get_mut(*position..) else {
            return Err(Error::BadParameter);
        };
        tail.fill(0);

        write_piece(buffer, position, &[VERSION.as_bytes()])?;
        for kind in REGISTRATION_ORDER {
            let version = self.components.get(kind).version();
            if version.is_empty() {
                continue;
            }
            write_piece(buffer, position, &[b"\n", version.as_bytes()])?;
        }
        Ok(())
    }
}

/// Copies `pieces` at `position` if they fit entirely.
fn write_piece(buffer: &mut [u8], position: &mut usize, pieces: &[&[u8]]) -> Result<(), Error> {
    let len: usize = pieces.iter().map(|piece| piece.len()).sum();
    let remaining = buffer.len().saturating_sub(*position);
    if remaining < len {
        return Err(Error::BadParameter);
    }
    for piece in pieces {
        buffer[*position..*position + piece.len()].copy_from_slice(piece);
        *position += piece.len();
    }
    Ok(())
}

impl Drop for AudioProcessingImpl {
    fn drop(&mut self) {
        for kind in REGISTRATION_ORDER {
            self.components.get_mut(kind).destroy();
        }
        if let Err(err) = self.debug_recorder.stop() {
            error!(id = self.id, %err, "failed to close debug trace on drop");
        }
    }
}
