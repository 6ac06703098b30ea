//! Error types for the serial transport

use radsdk_core::ErrorCode;
use thiserror::Error;

/// Serial transport failures
#[derive(Debug, Error)]
pub enum SerialError {
    /// The port could not be opened or configured
    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),

    /// I/O error on an open port
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SerialError {
    /// Convert to the transport error delivered to processors
    pub fn into_transport(self, code: ErrorCode, path: &str) -> radsdk_core::Error {
        radsdk_core::Error::transport(code, format!("{}: {}", path, self))
    }
}

/// Result type for serial operations
pub type Result<T> = core::result::Result<T, SerialError>;
