//! Error types for D3 record decoding

use thiserror::Error;

/// Malformed D3 records
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The record is shorter than its layout requires
    #[error("report 0x{report:02X} truncated: need {expected} bytes, got {actual}")]
    Truncated {
        report: u8,
        expected: usize,
        actual: usize,
    },

    /// The record's size field disagrees with the bytes present
    #[error("size field says {declared} bytes, record has {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    /// Decoder called on a record of another type
    #[error("unexpected report id 0x{0:02X}")]
    UnexpectedReport(u8),

    /// Payload does not fit in a single record
    #[error("payload of {0} bytes is too large")]
    PayloadTooLarge(usize),
}

/// Result type for D3 decoding
pub type Result<T> = core::result::Result<T, ProtocolError>;
