//! radsdk-device - Devices, detectors and the driver context
//!
//! Sits on top of a processor from `radsdk-d3` or `radsdk-interval`:
//!
//! - [`Device`] binds one component of a link and exposes its settings
//! - [`Detector`] accumulates the component's counts into a spectrum and
//!   tracks real and live time against acquisition targets
//! - [`DriverContext`] owns every attached detector and runs the thread
//!   that ends acquisitions once their targets are reached
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use radsdk_core::{DataInterface, MonotonicClock};
//! use radsdk_d3::{component, D3Processor};
//! use radsdk_device::{ContextConfig, Device, DriverContext, known_model};
//!
//! # fn open_link() -> Arc<dyn DataInterface> { unimplemented!() }
//! let context = DriverContext::new(ContextConfig::default(), Arc::new(MonotonicClock::new()));
//! context.initialise(None)?;
//!
//! let link = open_link();
//! let processor = Arc::new(D3Processor::new(
//!     link.clone(),
//!     context.clock(),
//!     context.processor_config().clone(),
//! ));
//! let model = known_model(link.vendor_id(), link.product_id()).expect("supported");
//! let device = Device::new(link, processor, component::GAMMA)?;
//! let id = context.attach(device, model.properties(0).expect("gamma"))?;
//!
//! context.begin_acquisition(id, 10_000, 0)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod context;
pub mod detector;
pub mod device;
pub mod error;
pub mod model;
pub mod settings;

// Re-exports
pub use config::ContextConfig;
pub use context::DriverContext;
pub use detector::{AcquiredData, Detector, DriverListener, SPECTRUM_CHANNELS};
pub use device::{Device, DeviceListener};
pub use error::{DeviceError, Result};
pub use model::{
    known_model, DetectorKind, DeviceInfo, DeviceProperties, KnownModel, ProtocolFamily,
    KNOWN_MODELS, KROMEK_VENDOR_ID, OLD_KROMEK_VENDOR_ID,
};
