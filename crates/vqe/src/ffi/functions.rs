//! `extern "C"` entry points.
//!
//! All functions accepting a handle return [`VqeError::NullPointer`] (or its
//! code, for integer getters) when the handle is null.

use std::ffi::{CStr, c_char, c_int};

use crate::{AudioFrame, AudioProcessing, Error};

use super::types::{VqeAudioProcessing, VqeComponent, VqeError};

/// Borrows the engine behind `apm`.
///
/// # Safety
///
/// `apm` must be null or a live handle from [`vqe_create`].
unsafe fn engine<'a>(apm: *const VqeAudioProcessing) -> Result<&'a AudioProcessing, Error> {
    // SAFETY: guaranteed by the caller.
    unsafe { apm.as_ref() }
        .map(|handle| &handle.inner)
        .ok_or(Error::NullPointer)
}

/// Runs `f` against the engine and converts the outcome to a status code.
///
/// # Safety
///
/// Same as [`engine`].
unsafe fn with_engine(
    apm: *const VqeAudioProcessing,
    f: impl FnOnce(&AudioProcessing) -> Result<(), Error>,
) -> VqeError {
    // SAFETY: guaranteed by the caller.
    VqeError::from_result(unsafe { engine(apm) }.and_then(f))
}

fn count_to_c_int(count: usize) -> c_int {
    c_int::try_from(count).unwrap_or(c_int::MAX)
}

/// Creates an engine at 16 kHz mono. Returns null on failure.
#[unsafe(no_mangle)]
pub extern "C" fn vqe_create(id: c_int) -> *mut VqeAudioProcessing {
    match AudioProcessing::create(id) {
        Ok(inner) => Box::into_raw(Box::new(VqeAudioProcessing { inner })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destroys an engine. Null is ignored.
///
/// # Safety
///
/// `apm` must be null or a handle from [`vqe_create`] that has not been
/// destroyed. It must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_destroy(apm: *mut VqeAudioProcessing) {
    if !apm.is_null() {
        // SAFETY: the handle came from `Box::into_raw` in `vqe_create`.
        drop(unsafe { Box::from_raw(apm) });
    }
}

/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_initialize(apm: *const VqeAudioProcessing) -> VqeError {
    unsafe { with_engine(apm, AudioProcessing::initialize) }
}

/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_set_sample_rate_hz(
    apm: *const VqeAudioProcessing,
    rate: c_int,
) -> VqeError {
    unsafe {
        with_engine(apm, |engine| {
            let rate = u32::try_from(rate).map_err(|_| Error::BadParameter)?;
            engine.set_sample_rate_hz(rate)
        })
    }
}

/// Current sample rate, or a negative error code.
///
/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_sample_rate_hz(apm: *const VqeAudioProcessing) -> c_int {
    match unsafe { engine(apm) } {
        Ok(engine) => engine.sample_rate_hz() as c_int,
        Err(err) => err.code(),
    }
}

/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_set_num_channels(
    apm: *const VqeAudioProcessing,
    input_channels: c_int,
    output_channels: c_int,
) -> VqeError {
    unsafe {
        with_engine(apm, |engine| {
            let input = usize::try_from(input_channels).map_err(|_| Error::BadParameter)?;
            let output = usize::try_from(output_channels).map_err(|_| Error::BadParameter)?;
            engine.set_num_channels(input, output)
        })
    }
}

/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_num_input_channels(apm: *const VqeAudioProcessing) -> c_int {
    match unsafe { engine(apm) } {
        Ok(engine) => count_to_c_int(engine.num_input_channels()),
        Err(err) => err.code(),
    }
}

/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_num_output_channels(apm: *const VqeAudioProcessing) -> c_int {
    match unsafe { engine(apm) } {
        Ok(engine) => count_to_c_int(engine.num_output_channels()),
        Err(err) => err.code(),
    }
}

/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_set_num_reverse_channels(
    apm: *const VqeAudioProcessing,
    channels: c_int,
) -> VqeError {
    unsafe {
        with_engine(apm, |engine| {
            let channels = usize::try_from(channels).map_err(|_| Error::BadParameter)?;
            engine.set_num_reverse_channels(channels)
        })
    }
}

/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_num_reverse_channels(apm: *const VqeAudioProcessing) -> c_int {
    match unsafe { engine(apm) } {
        Ok(engine) => count_to_c_int(engine.num_reverse_channels()),
        Err(err) => err.code(),
    }
}

/// Builds a frame from an interleaved C buffer.
///
/// # Safety
///
/// `data` must be null or valid for reads of
/// `samples_per_channel * num_channels` samples.
unsafe fn read_frame(
    data: *const i16,
    sample_rate_hz: c_int,
    num_channels: c_int,
    samples_per_channel: c_int,
) -> Result<AudioFrame, Error> {
    if data.is_null() {
        return Err(Error::NullPointer);
    }
    let rate = u32::try_from(sample_rate_hz).map_err(|_| Error::BadSampleRate)?;
    let channels = usize::try_from(num_channels).map_err(|_| Error::BadNumberChannels)?;
    let samples = usize::try_from(samples_per_channel).map_err(|_| Error::BadDataLength)?;
    let len = channels.checked_mul(samples).ok_or(Error::BadDataLength)?;
    // SAFETY: guaranteed by the caller.
    let interleaved = unsafe { std::slice::from_raw_parts(data, len) };
    AudioFrame::from_interleaved(rate, channels, interleaved.to_vec())
}

/// Processes one interleaved capture frame in place.
///
/// When the engine downmixes, the first `samples_per_channel *
/// vqe_num_output_channels()` samples of `data` hold the result.
///
/// # Safety
///
/// `apm` must be null or a live handle. `data` must be null or valid for
/// reads and writes of `samples_per_channel * num_channels` samples.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_process_stream(
    apm: *const VqeAudioProcessing,
    data: *mut i16,
    sample_rate_hz: c_int,
    num_channels: c_int,
    samples_per_channel: c_int,
) -> VqeError {
    unsafe {
        with_engine(apm, |engine| {
            let mut frame = read_frame(data, sample_rate_hz, num_channels, samples_per_channel)?;
            engine.process_stream(&mut frame)?;
            let output = frame.data();
            std::slice::from_raw_parts_mut(data, output.len()).copy_from_slice(output);
            Ok(())
        })
    }
}

/// Analyzes one interleaved render frame.
///
/// # Safety
///
/// `apm` must be null or a live handle. `data` must be null or valid for
/// reads of `samples_per_channel * num_channels` samples.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_analyze_reverse_stream(
    apm: *const VqeAudioProcessing,
    data: *const i16,
    sample_rate_hz: c_int,
    num_channels: c_int,
    samples_per_channel: c_int,
) -> VqeError {
    unsafe {
        with_engine(apm, |engine| {
            let frame = read_frame(data, sample_rate_hz, num_channels, samples_per_channel)?;
            engine.analyze_reverse_stream(&frame)
        })
    }
}

/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_set_stream_delay_ms(
    apm: *const VqeAudioProcessing,
    delay: c_int,
) -> VqeError {
    unsafe { with_engine(apm, |engine| engine.set_stream_delay_ms(delay)) }
}

/// Current stream delay, or a negative error code.
///
/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_stream_delay_ms(apm: *const VqeAudioProcessing) -> c_int {
    match unsafe { engine(apm) } {
        Ok(engine) => engine.stream_delay_ms(),
        Err(err) => err.code(),
    }
}

/// Starts a debug trace at the NUL-terminated UTF-8 `path`.
///
/// # Safety
///
/// `apm` must be null or a live handle. `path` must be null or a valid
/// NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_start_debug_recording(
    apm: *const VqeAudioProcessing,
    path: *const c_char,
) -> VqeError {
    unsafe {
        with_engine(apm, |engine| {
            if path.is_null() {
                return Err(Error::NullPointer);
            }
            let path = CStr::from_ptr(path).to_str().map_err(|_| Error::File)?;
            engine.start_debug_recording(path)
        })
    }
}

/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_stop_debug_recording(apm: *const VqeAudioProcessing) -> VqeError {
    unsafe { with_engine(apm, AudioProcessing::stop_debug_recording) }
}

/// Enables or disables the component whose [`VqeComponent`] code is
/// `component`. Unknown codes return [`VqeError::BadParameter`].
///
/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_component_enable(
    apm: *const VqeAudioProcessing,
    component: c_int,
    enable: bool,
) -> VqeError {
    unsafe {
        with_engine(apm, |engine| {
            let kind = VqeComponent::try_from(component)?.to_rust();
            engine.enable_component(kind, enable)
        })
    }
}

/// Returns `false` for a null handle or an unknown component code.
///
/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_component_is_enabled(
    apm: *const VqeAudioProcessing,
    component: c_int,
) -> bool {
    let Ok(component) = VqeComponent::try_from(component) else {
        return false;
    };
    unsafe { engine(apm) }
        .map(|engine| engine.is_component_enabled(component.to_rust()))
        .unwrap_or(false)
}

/// Writes the version lines into `buffer` starting at `*position`.
///
/// The text is not NUL-terminated by this call, but the tail of the buffer
/// past `*position` is zeroed first.
///
/// # Safety
///
/// `apm` must be null or a live handle. `buffer` must be null or valid for
/// writes of `len` bytes, and `position` must be null or valid for reads
/// and writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_version(
    apm: *const VqeAudioProcessing,
    buffer: *mut c_char,
    len: usize,
    position: *mut usize,
) -> VqeError {
    unsafe {
        with_engine(apm, |engine| {
            if buffer.is_null() || position.is_null() {
                return Err(Error::NullPointer);
            }
            let buffer = std::slice::from_raw_parts_mut(buffer.cast::<u8>(), len);
            engine.version_into(buffer, &mut *position)
        })
    }
}

/// # Safety
///
/// `apm` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vqe_change_unique_id(apm: *const VqeAudioProcessing, id: c_int) -> VqeError {
    unsafe {
        with_engine(apm, |engine| {
            engine.change_unique_id(id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_is_reported() {
        unsafe {
            assert_eq!(vqe_initialize(std::ptr::null()), VqeError::NullPointer);
            assert_eq!(vqe_sample_rate_hz(std::ptr::null()), -5);
            assert!(!vqe_component_is_enabled(
                std::ptr::null(),
                VqeComponent::NoiseSuppression as c_int
            ));
            vqe_destroy(std::ptr::null_mut());
        }
    }

    #[test]
    fn process_stereo_to_mono_through_c_buffer() {
        let apm = vqe_create(1);
        assert!(!apm.is_null());
        unsafe {
            assert_eq!(vqe_set_num_channels(apm, 2, 1), VqeError::NoError);
            assert_eq!(vqe_num_output_channels(apm), 1);

            let mut data: Vec<i16> = (0..160).flat_map(|_| [100, 300]).collect();
            let status = vqe_process_stream(apm, data.as_mut_ptr(), 16_000, 2, 160);
            assert_eq!(status, VqeError::NoError);
            assert!(data[..160].iter().all(|&s| s == 200));

            let status = vqe_process_stream(apm, std::ptr::null_mut(), 16_000, 2, 160);
            assert_eq!(status, VqeError::NullPointer);
            vqe_destroy(apm);
        }
    }

    #[test]
    fn frame_mismatch_codes() {
        let apm = vqe_create(0);
        let mut data = vec![0i16; 320];
        unsafe {
            assert_eq!(
                vqe_process_stream(apm, data.as_mut_ptr(), 8_000, 1, 80),
                VqeError::BadSampleRate
            );
            assert_eq!(
                vqe_process_stream(apm, data.as_mut_ptr(), 16_000, 1, 80),
                VqeError::BadDataLength
            );
            assert_eq!(
                vqe_analyze_reverse_stream(apm, data.as_ptr(), 16_000, 2, 160),
                VqeError::BadNumberChannels
            );
            vqe_destroy(apm);
        }
    }

    #[test]
    fn delay_and_components() {
        let apm = vqe_create(0);
        unsafe {
            assert_eq!(vqe_set_stream_delay_ms(apm, 600), VqeError::BadStreamParameterWarning);
            assert_eq!(vqe_stream_delay_ms(apm), 500);
            assert_eq!(vqe_set_stream_delay_ms(apm, -1), VqeError::BadParameter);

            assert_eq!(
                vqe_component_enable(apm, VqeComponent::EchoCancellation as c_int, true),
                VqeError::NoError
            );
            assert_eq!(
                vqe_component_enable(apm, VqeComponent::EchoControlMobile as c_int, true),
                VqeError::BadParameter
            );
            assert!(vqe_component_is_enabled(apm, VqeComponent::EchoCancellation as c_int));

            assert_eq!(vqe_component_enable(apm, 7, true), VqeError::BadParameter);
            assert_eq!(vqe_component_enable(apm, -1, false), VqeError::BadParameter);
            assert!(!vqe_component_is_enabled(apm, 42));
            vqe_destroy(apm);
        }
    }

    #[test]
    fn version_into_c_buffer() {
        let apm = vqe_create(0);
        let mut buffer = [0 as c_char; 128];
        let mut position = 0usize;
        unsafe {
            let status = vqe_version(apm, buffer.as_mut_ptr(), buffer.len(), &mut position);
            assert_eq!(status, VqeError::NoError);
            let text = CStr::from_ptr(buffer.as_ptr()).to_str().unwrap();
            assert!(text.starts_with("AudioProcessing 1.0.0\nAEC 2.5.0"));
            assert_eq!(text.len(), position);

            let mut tiny = [0 as c_char; 4];
            let mut position = 0usize;
            let status = vqe_version(apm, tiny.as_mut_ptr(), tiny.len(), &mut position);
            assert_eq!(status, VqeError::BadParameter);
            assert_eq!(position, 0);
            vqe_destroy(apm);
        }
    }

    #[test]
    fn recording_rejects_null_path() {
        let apm = vqe_create(0);
        unsafe {
            assert_eq!(vqe_start_debug_recording(apm, std::ptr::null()), VqeError::NullPointer);
            assert_eq!(vqe_stop_debug_recording(apm), VqeError::NoError);
            assert_eq!(vqe_change_unique_id(apm, 5), VqeError::NoError);
            assert_eq!((*apm).inner.id(), 5);
            vqe_destroy(apm);
        }
    }
}
