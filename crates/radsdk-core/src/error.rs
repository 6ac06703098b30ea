//! Error types shared by every processor and transport

use core::fmt;
use thiserror::Error;

/// Stream-level fault codes delivered to listeners
///
/// These never come back as return values. They travel through the error
/// callbacks registered with a processor or transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// The device could not be opened
    DeviceOpenFailed = 1,
    /// Reading from the device failed; fatal to the running acquisition
    ReadFailed = 2,
    /// The device reported an error or sent a malformed stream
    InternalDevice = 3,
    /// Writing to the device failed
    WriteFailed = 4,
    /// A complete message was dropped because the message buffer was full
    BufferFull = 5,
}

impl ErrorCode {
    /// Numeric value of the code
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Look up a code from its numeric value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::DeviceOpenFailed),
            2 => Some(Self::ReadFailed),
            3 => Some(Self::InternalDevice),
            4 => Some(Self::WriteFailed),
            5 => Some(Self::BufferFull),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DeviceOpenFailed => "device open failed",
            Self::ReadFailed => "read failed",
            Self::InternalDevice => "internal device error",
            Self::WriteFailed => "write failed",
            Self::BufferFull => "message buffer full",
        };
        f.write_str(s)
    }
}

/// Call-local failures returned from processor and transport operations
#[derive(Debug, Error)]
pub enum Error {
    /// The component id is not registered with this processor
    #[error("invalid component id 0x{0:02X}")]
    InvalidComponent(u8),

    /// Another configuration query is already waiting for its response
    #[error("a configuration query is already in progress")]
    QueryInProgress,

    /// No configuration response arrived in time
    #[error("configuration query timed out")]
    QueryTimeout,

    /// The configuration response was rejected or could not be sent
    #[error("configuration query failed")]
    QueryFailed,

    /// The caller's buffer cannot hold the response payload
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// The transport refused an operation
    #[error("transport error ({code}): {message}")]
    Transport { code: ErrorCode, message: String },

    /// A worker thread could not be spawned
    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(String),

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation is not supported by this processor or transport
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Build a transport error
    pub fn transport(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Transport {
            code,
            message: message.into(),
        }
    }
}

/// Result type for core operations
pub type Result<T> = core::result::Result<T, Error>;
