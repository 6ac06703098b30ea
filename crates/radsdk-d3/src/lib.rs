//! radsdk-d3 - D3 multi-component spectrometer protocol
//!
//! D3 devices carry a gamma detector and a neutron detector behind one
//! interface board. Records are length-prefixed (little endian) and the
//! board only sends a spectrum when asked, so the processor polls while
//! either detector is acquiring.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use radsdk_core::{DataInterface, DataProcessor, MonotonicClock, ProcessorConfig};
//! use radsdk_d3::{protocol, D3Processor};
//!
//! # fn open_link() -> Arc<dyn DataInterface> { unimplemented!() }
//! let link = open_link();
//! let processor = D3Processor::new(link, Arc::new(MonotonicClock::new()), ProcessorConfig::default());
//!
//! let mut version = [0u8; 2];
//! processor.get_configuration_data(
//!     protocol::component::GAMMA,
//!     protocol::report::GET_VERSION,
//!     &mut version,
//! )?;
//! println!("firmware {:#06x}", u16::from_le_bytes(version));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod processor;
pub mod protocol;

// Re-exports
pub use error::{ProtocolError, Result};
pub use processor::D3Processor;
pub use protocol::{component, report, SpectrumReport};
