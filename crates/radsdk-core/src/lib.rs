//! radsdk-core - Stream processing core for USB radiation spectrometers
//!
//! Spectrometers stream reports over a byte-oriented link (HID, USB
//! serial). This crate holds everything between the raw bytes and the
//! per-detector count events that does not depend on a particular wire
//! format:
//!
//! - [`framing`]: straddling-cursor reassembly with pluggable framing
//!   (explicit u16 length prefix, or size implied by the report id)
//! - [`rolling_queue`] and [`message_ring`]: the two message stores
//! - [`acquisition`]: per-component run state, real time accounting and
//!   device-to-host timestamp derivation
//! - [`query`]: the single outstanding configuration query slot
//! - [`transport`] and [`processor`]: the contracts below and above a
//!   processor
//!
//! The protocol crates (`radsdk-d3`, `radsdk-interval`) build concrete
//! processors from these pieces.
//!
//! # Example
//!
//! ```
//! use radsdk_core::framing::{ExplicitLength, Reassembler};
//!
//! let mut reassembler = Reassembler::new(ExplicitLength::new(64));
//! let mut messages = Vec::new();
//! // A 4-byte message split over two reads
//! for chunk in [&[0x04u8, 0x00, 0xAA][..], &[0xBB][..]] {
//!     reassembler.push(chunk, &mut |head: &[u8], tail: &[u8]| {
//!         messages.push([head, tail].concat());
//!         true
//!     });
//! }
//! assert_eq!(messages, vec![vec![0x04, 0x00, 0xAA, 0xBB]]);
//! ```

pub mod acquisition;
pub mod config;
pub mod endian;
pub mod error;
pub mod framing;
pub mod listener;
pub mod message_ring;
pub mod processor;
pub mod query;
pub mod rolling_queue;
pub mod time;
pub mod transport;
pub mod worker;

// Re-exports
pub use acquisition::{Attribution, Component, Finish, RunState, Timeline};
pub use config::ProcessorConfig;
pub use endian::Endian;
pub use error::{Error, ErrorCode, Result};
pub use listener::{ComponentListener, ListenerTable};
pub use processor::DataProcessor;
pub use query::{ConfigQuery, QueryState};
pub use time::{Clock, ManualClock, MonotonicClock};
pub use transport::{DataInterface, DataSink};
