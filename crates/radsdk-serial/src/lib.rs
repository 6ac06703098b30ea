//! radsdk-serial - Serial port transport for radsdk
//!
//! Spectrometers that enumerate as USB CDC devices are driven through
//! [`SerialInterface`]. Reading happens on a dedicated thread; requests
//! are written from the caller's thread through a second handle on the
//! same port, so a failed write comes back to the caller.

pub mod error;
pub mod interface;

// Re-exports
pub use error::{Result, SerialError};
pub use interface::{SerialInterface, DEFAULT_BAUD_RATE};
