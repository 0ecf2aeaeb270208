//! Error handling for the brainwave monitor
//!
//! One error type shared by every crate in the workspace. Variants carry
//! enough context to log a useful line without a backtrace.

use core::fmt;

/// Result type alias for monitor operations
pub type BwmResult<T> = Result<T, BwmError>;

/// Error type for all monitor operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BwmError {
    /// Invalid configuration value
    InvalidConfig {
        /// Description of the configuration error
        reason: String,
    },

    /// Batch channel count differs from the buffer's channel count
    ChannelMismatch {
        /// Channel count the receiver was built for
        expected: usize,
        /// Channel count found in the batch
        actual: usize,
    },

    /// Timestamp count and sample row count disagree
    LengthMismatch {
        /// Number of timestamps
        timestamps: usize,
        /// Number of sample rows
        rows: usize,
    },

    /// Batch content is unusable for another reason
    InvalidBatch {
        /// Description of the batch problem
        reason: String,
    },

    /// Spectral estimation failed
    Estimation {
        /// Description of the failure
        reason: String,
    },

    /// Durable record could not be written
    Persistence {
        /// Underlying I/O error text
        reason: String,
    },

    /// Sample source reported a failure
    Source {
        /// Source-specific description
        reason: String,
    },

    /// Publish channel has no receiver left
    ChannelClosed,
}

impl fmt::Display for BwmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BwmError::InvalidConfig { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
            BwmError::ChannelMismatch { expected, actual } => {
                write!(f, "Channel mismatch: expected {} channels, got {}",
                       expected, actual)
            }
            BwmError::LengthMismatch { timestamps, rows } => {
                write!(f, "Length mismatch: {} timestamps for {} sample rows",
                       timestamps, rows)
            }
            BwmError::InvalidBatch { reason } => {
                write!(f, "Invalid batch: {}", reason)
            }
            BwmError::Estimation { reason } => {
                write!(f, "Spectral estimation failed: {}", reason)
            }
            BwmError::Persistence { reason } => {
                write!(f, "Persistence error: {}", reason)
            }
            BwmError::Source { reason } => {
                write!(f, "Sample source error: {}", reason)
            }
            BwmError::ChannelClosed => {
                write!(f, "Publish channel closed")
            }
        }
    }
}

impl std::error::Error for BwmError {}

impl From<std::io::Error> for BwmError {
    fn from(err: std::io::Error) -> Self {
        BwmError::Persistence {
            reason: err.to_string(),
        }
    }
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::BwmError::InvalidConfig {
            reason: format!($($arg)*),
        }
    };
}
