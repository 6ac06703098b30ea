//! Contract between a processor and the device objects built on it

use std::sync::Weak;

use crate::endian::Endian;
use crate::error::Result;
use crate::listener::ComponentListener;

/// Turns a transport's byte stream into per-component acquisition events
///
/// One processor serves every component sharing a transport. All methods
/// take `&self`; implementations synchronise internally.
pub trait DataProcessor: Send + Sync {
    /// Byte order of multi-byte configuration values
    fn endian(&self) -> Endian;

    /// Component ids this processor understands
    fn component_ids(&self) -> Vec<u8>;

    /// Register the listener for a component
    fn add_component(&self, component: u8, listener: Weak<dyn ComponentListener>) -> Result<()>;

    /// Stop a component and forget its listener
    ///
    /// After this returns the listener is never called again.
    fn remove_component(&self, component: u8);

    /// Start acquiring for a component; a no-op if it is already running
    fn start_processing(&self, component: u8) -> Result<()>;

    /// Stop acquiring for a component
    ///
    /// A forced stop discards queued data, fires `on_finished(true)` and, if
    /// it shuts the processing thread down, waits for the thread to exit.
    /// A graceful stop lets queued data drain and fires `on_finished(false)`
    /// from the processing thread.
    fn stop_processing(&self, component: u8, force: bool) -> Result<()>;

    /// Feed raw bytes as if they had come from the transport
    fn queue_raw_data(&self, data: &[u8]);

    /// Acquired real time in milliseconds over all runs since the last reset
    fn real_time(&self, component: u8) -> Result<i64>;

    fn reset_real_time(&self, component: u8) -> Result<()>;

    /// Query a configuration value, blocking until the device answers
    ///
    /// The payload is copied into `out`; the number of bytes written is
    /// returned.
    fn get_configuration_data(&self, component: u8, setting: u8, out: &mut [u8])
        -> Result<usize>;

    /// Send a configuration value
    fn set_configuration_data(&self, component: u8, setting: u8, data: &[u8]) -> Result<()>;

    /// Drop every buffered byte and queued message
    fn reset(&self);
}
