//! C API for the `vqe` voice quality engine.
//!
//! Links as a static library exposing the `vqe_*` functions; the matching
//! header is generated into `include/vqe.h` at build time.
//!
//! ```c
//! VqeAudioProcessing *apm = vqe_create(0);
//! vqe_component_enable(apm, VQE_COMPONENT_NOISE_SUPPRESSION, true);
//! int16_t frame[160] = {0};
//! vqe_process_stream(apm, frame, 16000, 1, 160);
//! vqe_destroy(apm);
//! ```

pub use vqe::ffi::functions::*;
pub use vqe::ffi::types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_process_destroy() {
        let apm = vqe_create(0);
        assert!(!apm.is_null());
        let mut frame = [0i16; 160];
        unsafe {
            assert_eq!(
                vqe_component_enable(apm, VqeComponent::NoiseSuppression as std::ffi::c_int, true),
                VqeError::NoError
            );
            assert_eq!(
                vqe_process_stream(apm, frame.as_mut_ptr(), 16_000, 1, 160),
                VqeError::NoError
            );
            assert_eq!(vqe_sample_rate_hz(apm), 16_000);
            vqe_destroy(apm);
        }
        assert!(frame.iter().all(|&s| s == 0));
    }
}
