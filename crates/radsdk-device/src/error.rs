//! Error types for the device layer

use thiserror::Error;

/// Failures of device and context operations
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The context has not been initialised (or was shut down)
    #[error("driver context not initialised")]
    NotInitialised,

    /// `initialise` called twice
    #[error("driver context already initialised")]
    AlreadyInitialised,

    /// No attached device has this id
    #[error("no device with id {0}")]
    InvalidDeviceId(u32),

    /// Stop requested on a device that is not acquiring
    #[error("device is not acquiring")]
    NotAcquiring,

    #[error(transparent)]
    Core(#[from] radsdk_core::Error),
}

/// Result type for device operations
pub type Result<T> = core::result::Result<T, DeviceError>;
