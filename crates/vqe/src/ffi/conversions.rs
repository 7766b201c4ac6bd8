//! Conversions between C API types and Rust types.

use std::ffi::c_int;

use crate::{ComponentKind, Error};

use super::types::{VqeComponent, VqeError};

impl VqeError {
    pub(crate) fn from_rust(err: Error) -> Self {
        match err {
            Error::Unspecified => Self::Unspecified,
            Error::NullPointer => Self::NullPointer,
            Error::BadParameter => Self::BadParameter,
            Error::BadSampleRate => Self::BadSampleRate,
            Error::BadDataLength => Self::BadDataLength,
            Error::BadNumberChannels => Self::BadNumberChannels,
            Error::File => Self::File,
            Error::StreamParameterNotSet => Self::StreamParameterNotSet,
            Error::NotEnabled => Self::NotEnabled,
            Error::BadStreamParameterWarning => Self::BadStreamParameterWarning,
        }
    }

    pub(crate) fn from_result(result: Result<(), Error>) -> Self {
        match result {
            Ok(()) => Self::NoError,
            Err(err) => Self::from_rust(err),
        }
    }
}

impl TryFrom<c_int> for VqeComponent {
    type Error = Error;

    fn try_from(value: c_int) -> Result<Self, Error> {
        Ok(match value {
            0 => Self::EchoCancellation,
            1 => Self::EchoControlMobile,
            2 => Self::GainControl,
            3 => Self::HighPassFilter,
            4 => Self::LevelEstimator,
            5 => Self::NoiseSuppression,
            6 => Self::VoiceDetection,
            _ => return Err(Error::BadParameter),
        })
    }
}

impl VqeComponent {
    pub(crate) fn to_rust(self) -> ComponentKind {
        match self {
            Self::EchoCancellation => ComponentKind::EchoCancellation,
            Self::EchoControlMobile => ComponentKind::EchoControlMobile,
            Self::GainControl => ComponentKind::GainControl,
            Self::HighPassFilter => ComponentKind::HighPassFilter,
            Self::LevelEstimator => ComponentKind::LevelEstimator,
            Self::NoiseSuppression => ComponentKind::NoiseSuppression,
            Self::VoiceDetection => ComponentKind::VoiceDetection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_discriminants_match_codes() {
        let errors = [
            Error::Unspecified,
            Error::NullPointer,
            Error::BadParameter,
            Error::BadSampleRate,
            Error::BadDataLength,
            Error::BadNumberChannels,
            Error::File,
            Error::StreamParameterNotSet,
            Error::NotEnabled,
            Error::BadStreamParameterWarning,
        ];
        for err in errors {
            assert_eq!(VqeError::from_rust(err) as i32, err.code(), "{err}");
        }
        assert_eq!(VqeError::from_result(Ok(())) as i32, 0);
    }

    #[test]
    fn component_mapping_is_one_to_one() {
        let components = [
            VqeComponent::EchoCancellation,
            VqeComponent::EchoControlMobile,
            VqeComponent::GainControl,
            VqeComponent::HighPassFilter,
            VqeComponent::LevelEstimator,
            VqeComponent::NoiseSuppression,
            VqeComponent::VoiceDetection,
        ];
        let kinds: Vec<_> = components.iter().map(|c| c.to_rust()).collect();
        assert_eq!(kinds, crate::pipeline::REGISTRATION_ORDER);
    }

    #[test]
    fn component_codes_round_trip_and_reject_unknown() {
        for code in 0..7 {
            let component = VqeComponent::try_from(code).unwrap();
            assert_eq!(component as c_int, code);
        }
        for code in [-1, 7, c_int::MAX, c_int::MIN] {
            assert_eq!(VqeComponent::try_from(code), Err(Error::BadParameter));
        }
    }
}
