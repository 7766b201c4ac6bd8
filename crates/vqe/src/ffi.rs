//! C ABI over [`AudioProcessing`](crate::AudioProcessing).
//!
//! Handles are opaque heap pointers created by
//! [`vqe_create`](functions::vqe_create) and released by
//! [`vqe_destroy`](functions::vqe_destroy). Every fallible call returns a
//! [`VqeError`](types::VqeError) whose values are the legacy integer codes,
//! with `0` for success. Null handles or buffers yield
//! [`VqeError::NullPointer`](types::VqeError::NullPointer).

mod conversions;
pub mod functions;
pub mod types;
