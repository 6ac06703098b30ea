//! Transport contract
//!
//! A transport moves raw bytes. It knows nothing about message structure:
//! incoming chunks go to the registered [`DataSink`] exactly as they were
//! read, and outbound command buffers are written as given.

use std::sync::Weak;

use crate::endian::Endian;
use crate::error::{ErrorCode, Result};

/// Receiver of raw transport traffic
///
/// Implementations are called from the transport's read thread and must
/// return quickly.
pub trait DataSink: Send + Sync {
    /// A chunk of raw bytes arrived
    fn on_data(&self, data: &[u8]);

    /// The transport hit a fault
    fn on_error(&self, code: ErrorCode, message: &str);
}

/// A physical link to one device
pub trait DataInterface: Send + Sync {
    /// Stable identifier for this link (e.g. a hash of the device path)
    fn hash(&self) -> u32;

    fn vendor_id(&self) -> u16;

    fn product_id(&self) -> u16;

    /// Byte order of 16-bit fields on this link
    fn endian(&self) -> Endian;

    /// Start the read loop; incoming bytes go to the sink
    fn begin_reading(&self) -> Result<()>;

    /// Stop the read loop
    fn stop_reading(&self) -> Result<()>;

    /// Send a request whose response comes back through the data path
    fn send_configuration_request(&self, data: &[u8]) -> Result<()>;

    /// Send a configuration command
    fn send_configuration(&self, data: &[u8]) -> Result<()> {
        self.send_configuration_request(data)
    }

    /// Register (or clear) the receiver of incoming bytes and faults
    fn set_sink(&self, sink: Option<Weak<dyn DataSink>>);

    /// Free-form property lookup (serial path, product string, ...)
    fn property(&self, _name: &str) -> Option<String> {
        None
    }
}

/// 32-bit FNV-1a hash of a device path, for [`DataInterface::hash`]
pub fn path_hash(path: &str) -> u32 {
    path.bytes().fold(0x811c_9dc5u32, |hash, b| {
        (hash ^ b as u32).wrapping_mul(0x0100_0193)
    })
}
