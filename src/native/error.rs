//! Native sound API error codes

use thiserror::Error;

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Failure reported by a native sound call
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeError {
    #[error("Unsupported interface")]
    NoInterface,

    #[error("Control requested is not available")]
    ControlUnavailable,

    #[error("Invalid call for the current state")]
    InvalidCall,

    #[error("No audio device found")]
    NoDriver,

    #[error("Out of memory")]
    OutOfMemory,

    #[error("Function not supported")]
    Unsupported,

    #[error("Buffer memory has been lost")]
    BufferLost,

    #[error("Unknown native error: {0:#x}")]
    Other(u32),
}

impl NativeError {
    /// Numeric result code, as the platform API would report it
    pub fn code(&self) -> u32 {
        match self {
            NativeError::NoInterface => 0x8000_4002,
            NativeError::ControlUnavailable => 0x8878_001E,
            NativeError::InvalidCall => 0x8878_0032,
            NativeError::NoDriver => 0x8878_0078,
            NativeError::OutOfMemory => 0x8007_000E,
            NativeError::Unsupported => 0x8000_4001,
            NativeError::BufferLost => 0x8878_0096,
            NativeError::Other(code) => *code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0x8000_4002 => NativeError::NoInterface,
            0x8878_001E => NativeError::ControlUnavailable,
            0x8878_0032 => NativeError::InvalidCall,
            0x8878_0078 => NativeError::NoDriver,
            0x8007_000E => NativeError::OutOfMemory,
            0x8000_4001 => NativeError::Unsupported,
            0x8878_0096 => NativeError::BufferLost,
            other => NativeError::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_for_known_errors() {
        for err in [
            NativeError::NoInterface,
            NativeError::ControlUnavailable,
            NativeError::InvalidCall,
            NativeError::NoDriver,
            NativeError::OutOfMemory,
            NativeError::Unsupported,
            NativeError::BufferLost,
        ] {
            assert_eq!(NativeError::from_code(err.code()), err);
        }
    }

    #[test]
    fn test_unknown_code_message() {
        let err = NativeError::from_code(0x1234);
        assert_eq!(err, NativeError::Other(0x1234));
        assert_eq!(err.to_string(), "Unknown native error: 0x1234");
    }
}
