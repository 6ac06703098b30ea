//! radsdk-interval - Interval count spectrometer protocol
//!
//! Single-detector devices (GR1, RadAngel, TN15, ...) stream fixed-size
//! reports without a length field; the report id implies the size. Each
//! data report lists up to 31 individual events by channel.

pub mod processor;
pub mod protocol;

// Re-exports
pub use processor::IntervalProcessor;
pub use protocol::{component, setting, IntervalCounts};
