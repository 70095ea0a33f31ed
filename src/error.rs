//! Error types and the shared last-error code.
//!
//! Steady-state operations in this crate never fail loudly: they return
//! `false` or a default value and record what went wrong in a
//! [`LastError`] owned by the [`SoundSystem`](crate::SoundSystem). Only
//! node construction hands a [`SoundError`] back to the caller.

use std::sync::atomic::{AtomicI32, Ordering};

use thiserror::Error;

/// Everything that can go wrong inside the sound system.
#[derive(Error, Debug)]
pub enum SoundError {
    /// The audio backend (host API) failed.
    #[error("audio backend error: {0}")]
    Backend(String),

    /// No device matches the requested identity or index.
    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    /// The engine could not be created or has already been torn down.
    #[error("audio engine is not available")]
    EngineUnavailable,

    /// The process-wide spatializer context could not be established.
    #[error("spatializer context is not available: {0}")]
    SpatializerUnavailable(String),

    /// An argument was out of range or otherwise unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation does not make sense in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The decoder rejected the stream.
    #[error("decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// The stream decoded, but into something we cannot play.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Seek target lies beyond the end of the content.
    #[error("seek to frame {requested} is out of range (length {length})")]
    SeekOutOfRange { requested: u64, length: u64 },

    /// IO error while opening a resource.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SoundError {
    /// The numeric code recorded for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SoundError::Backend(_) => ErrorCode::Backend,
            SoundError::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
            SoundError::EngineUnavailable => ErrorCode::EngineUnavailable,
            SoundError::SpatializerUnavailable(_) => ErrorCode::SpatializerUnavailable,
            SoundError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            SoundError::InvalidOperation(_) => ErrorCode::InvalidOperation,
            SoundError::Decode(_) => ErrorCode::Decode,
            SoundError::UnsupportedFormat(_) => ErrorCode::UnsupportedFormat,
            SoundError::SeekOutOfRange { .. } => ErrorCode::SeekOutOfRange,
            SoundError::Io(_) => ErrorCode::Io,
        }
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        SoundError::InvalidArgument(msg.into())
    }
}

/// Result type used throughout the crate.
pub type SoundResult<T> = Result<T, SoundError>;

/// Stable numeric form of a [`SoundError`], suitable for a scripting layer.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    #[default]
    Success = 0,
    Backend = -1,
    DeviceNotFound = -2,
    EngineUnavailable = -3,
    SpatializerUnavailable = -4,
    InvalidArgument = -5,
    InvalidOperation = -6,
    Decode = -7,
    UnsupportedFormat = -8,
    SeekOutOfRange = -9,
    Io = -10,
}

impl ErrorCode {
    fn from_raw(raw: i32) -> Self {
        match raw {
            -1 => ErrorCode::Backend,
            -2 => ErrorCode::DeviceNotFound,
            -3 => ErrorCode::EngineUnavailable,
            -4 => ErrorCode::SpatializerUnavailable,
            -5 => ErrorCode::InvalidArgument,
            -6 => ErrorCode::InvalidOperation,
            -7 => ErrorCode::Decode,
            -8 => ErrorCode::UnsupportedFormat,
            -9 => ErrorCode::SeekOutOfRange,
            -10 => ErrorCode::Io,
            _ => ErrorCode::Success,
        }
    }
}

/// The shared last-error slot.
///
/// Every fallible call stores its outcome here, last writer wins. Under
/// contention a caller may observe a code written by another thread.
#[derive(Debug, Default)]
pub struct LastError(AtomicI32);

impl LastError {
    pub fn new() -> Self {
        Self(AtomicI32::new(ErrorCode::Success as i32))
    }

    pub fn get(&self) -> ErrorCode {
        ErrorCode::from_raw(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, code: ErrorCode) {
        self.0.store(code as i32, Ordering::Relaxed);
    }

    /// Store the outcome of `result` and collapse it to a success flag.
    pub fn record<T>(&self, result: SoundResult<T>) -> bool {
        self.record_value(result).is_some()
    }

    /// Store the outcome of `result`, returning the value on success.
    pub fn record_value<T>(&self, result: SoundResult<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.set(ErrorCode::Success);
                Some(value)
            }
            Err(err) => {
                self.set(err.code());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tracks_last_writer() {
        let last = LastError::new();
        assert_eq!(last.get(), ErrorCode::Success);

        assert!(!last.record::<()>(Err(SoundError::EngineUnavailable)));
        assert_eq!(last.get(), ErrorCode::EngineUnavailable);

        assert!(last.record(Ok(())));
        assert_eq!(last.get(), ErrorCode::Success);
    }

    #[test]
    fn codes_survive_the_atomic() {
        let last = LastError::new();
        for code in [
            ErrorCode::Backend,
            ErrorCode::DeviceNotFound,
            ErrorCode::SeekOutOfRange,
            ErrorCode::Io,
        ] {
            last.set(code);
            assert_eq!(last.get(), code);
        }
    }
}
