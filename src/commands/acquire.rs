//! Live acquisition from a serial-attached spectrometer

use std::sync::Arc;
use std::time::Duration;

use radsdk_core::{DataInterface, Endian};
use radsdk_device::ContextConfig;
use radsdk_serial::SerialInterface;

use super::session::Session;
use crate::cli::Protocol;

pub fn run(
    config: &ContextConfig,
    protocol: Protocol,
    port: &str,
    baud: Option<u32>,
    duration_ms: u32,
    top: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let endian = match protocol {
        Protocol::D3 => Endian::Little,
        Protocol::Interval => Endian::Big,
    };
    let interface: Arc<dyn DataInterface> =
        Arc::new(SerialInterface::new(port, baud).with_endian(endian));
    let mut session = Session::open(config.clone(), interface, protocol)?;

    println!("Acquiring from {} for {} ms", port, duration_ms);
    session.begin(duration_ms)?;
    session.wait(Duration::from_millis(duration_ms as u64) + Duration::from_secs(5))?;

    println!();
    session.print_summary(top)?;
    session.shutdown()
}
