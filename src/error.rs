//! Error handling for streamout
//!
//! Open-time errors are fatal to the stream being opened. Steady-state errors
//! (lock and play failures) are reported to the caller but are expected to be
//! retried on the next cycle.

use thiserror::Error;

use crate::native::NativeError;

/// Result type alias for streamout operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Main error type for streamout operations
#[derive(Error, Debug)]
pub enum StreamError {
    // Open Errors
    #[error("Unsupported audio format: {reason}")]
    UnsupportedFormat { reason: String },

    #[error("Audio device unavailable: {source}")]
    DeviceUnavailable {
        #[source]
        source: NativeError,
    },

    #[error("Invalid buffer size: {reason}")]
    BufferSizeInvalid { reason: String },

    // Steady-State Errors
    #[error("Failed to lock chunk {chunk}: {source}")]
    LockFailed {
        chunk: usize,
        #[source]
        source: NativeError,
    },

    #[error("Failed to restart looping playback: {source}")]
    PlayFailed {
        #[source]
        source: NativeError,
    },

    #[error("Chunk {chunk} is still locked; commit it before acquiring another")]
    LockOutstanding { chunk: usize },

    #[error("Stream is not open")]
    NotOpen,

    // Shutdown Errors
    #[error("Device still reports playing after {polls} status polls")]
    StopTimedOut { polls: u32 },

    // Native Errors
    #[error("{operation}: {source}")]
    Native {
        operation: &'static str,
        #[source]
        source: NativeError,
    },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StreamError {
    /// Wrap a native failure with the name of the call that produced it.
    pub fn native(operation: &'static str, source: NativeError) -> Self {
        StreamError::Native { operation, source }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            StreamError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            StreamError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            StreamError::BufferSizeInvalid { .. } => "BUFFER_SIZE_INVALID",
            StreamError::LockFailed { .. } => "LOCK_FAILED",
            StreamError::PlayFailed { .. } => "PLAY_FAILED",
            StreamError::LockOutstanding { .. } => "LOCK_OUTSTANDING",
            StreamError::NotOpen => "NOT_OPEN",
            StreamError::StopTimedOut { .. } => "STOP_TIMED_OUT",
            StreamError::Native { .. } => "NATIVE_ERROR",
            StreamError::Io(_) => "IO_ERROR",
            StreamError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the stream can keep running after this error
    ///
    /// Recoverable errors belong to the steady-state cycle: the caller skips
    /// the current chunk and tries again on the next one.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StreamError::LockFailed { .. }
                | StreamError::PlayFailed { .. }
                | StreamError::LockOutstanding { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::UnsupportedFormat { .. } => vec![
                "Request 8-bit unsigned or 16-bit signed samples",
                "Channel count and sample rate must be non-zero",
            ],
            StreamError::DeviceUnavailable { .. } => vec![
                "Check that an audio output device is present",
                "Continue without audio output",
            ],
            StreamError::BufferSizeInvalid { .. } => vec![
                "Use a power-of-two fragment size",
                "Request fewer sample frames per fragment",
            ],
            StreamError::LockFailed { .. } => vec!["Skip this chunk and retry on the next cycle"],
            StreamError::LockOutstanding { .. } => {
                vec!["Commit the locked chunk before acquiring the next one"]
            }
            StreamError::StopTimedOut { .. } => vec![
                "The device stopped responding; release it anyway",
                "Raise max_stop_polls in the stream configuration",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = StreamError::UnsupportedFormat {
            reason: "24-bit".to_string(),
        };
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
        assert_eq!(StreamError::NotOpen.error_code(), "NOT_OPEN");
    }

    #[test]
    fn test_steady_state_errors_are_recoverable() {
        let err = StreamError::LockFailed {
            chunk: 1,
            source: NativeError::InvalidCall,
        };
        assert!(err.is_recoverable());
        assert!(!err.recovery_suggestions().is_empty());

        let err = StreamError::DeviceUnavailable {
            source: NativeError::NoDriver,
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_native_error_message_includes_operation() {
        let err = StreamError::native("Lock", NativeError::OutOfMemory);
        assert_eq!(err.to_string(), "Lock: Out of memory");
    }
}
