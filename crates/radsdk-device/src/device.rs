//! One detector component on one link
//!
//! A [`Device`] binds a component id to the processor serving its link.
//! It registers itself as that component's listener for its whole
//! lifetime and forwards events to its own [`DeviceListener`].

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use radsdk_core::{ComponentListener, DataInterface, DataProcessor, ErrorCode};

use crate::error::{DeviceError, Result};
use crate::model::legacy_lld_shift;
use crate::settings;

/// Receiver of a device's events
pub trait DeviceListener: Send + Sync {
    fn on_counts(&self, timestamp: i64, channel: u16, counts: u32);
    fn on_finished(&self, forced: bool);
    fn on_error(&self, code: ErrorCode, message: &str);
}

/// A single detector component
pub struct Device {
    interface: Arc<dyn DataInterface>,
    processor: Arc<dyn DataProcessor>,
    component: u8,
    id: u32,
    /// Data lock
    acquiring: Mutex<bool>,
    /// Event lock
    listener: Mutex<Option<Weak<dyn DeviceListener>>>,
    serial: Mutex<Option<String>>,
    version: Mutex<Option<u16>>,
}

impl Device {
    /// Create the device and register it with `processor`
    pub fn new(
        interface: Arc<dyn DataInterface>,
        processor: Arc<dyn DataProcessor>,
        component: u8,
    ) -> Result<Arc<Self>> {
        let id = interface.hash().wrapping_add(component as u32 * 1000);
        let device = Arc::new(Self {
            interface,
            processor,
            component,
            id,
            acquiring: Mutex::new(false),
            listener: Mutex::new(None),
            serial: Mutex::new(None),
            version: Mutex::new(None),
        });
        let weak = Arc::downgrade(&device);
        let weak: Weak<dyn ComponentListener> = weak;
        device.processor.add_component(component, weak)?;
        Ok(device)
    }

    /// Link hash plus component × 1000
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn component(&self) -> u8 {
        self.component
    }

    pub fn vendor_id(&self) -> u16 {
        self.interface.vendor_id()
    }

    pub fn product_id(&self) -> u16 {
        self.interface.product_id()
    }

    pub fn interface_property(&self, name: &str) -> Option<String> {
        self.interface.property(name)
    }

    pub fn set_listener(&self, listener: Option<Weak<dyn DeviceListener>>) {
        *self.listener.lock() = listener;
    }

    pub fn is_acquiring(&self) -> bool {
        *self.acquiring.lock()
    }

    /// Start acquiring
    ///
    /// The processor may deliver the last run's finished callback from
    /// inside this call, so no lock is held across it.
    pub fn start(&self) -> Result<()> {
        self.processor.start_processing(self.component)?;
        *self.acquiring.lock() = true;
        Ok(())
    }

    /// Stop acquiring; `force` discards data not yet processed
    pub fn stop(&self, force: bool) -> Result<()> {
        {
            let mut acquiring = self.acquiring.lock();
            if !*acquiring {
                return Err(DeviceError::NotAcquiring);
            }
            *acquiring = false;
        }
        self.processor.stop_processing(self.component, force)?;
        Ok(())
    }

    /// Real time of the current or last acquisition, accumulated since the
    /// last reset
    pub fn real_time(&self) -> Result<i64> {
        Ok(self.processor.real_time(self.component)?)
    }

    pub fn reset_real_time(&self) -> Result<()> {
        Ok(self.processor.reset_real_time(self.component)?)
    }

    pub fn get_u8(&self, setting: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.processor
            .get_configuration_data(self.component, setting, &mut buf)?;
        Ok(buf[0])
    }

    pub fn get_u16(&self, setting: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.processor
            .get_configuration_data(self.component, setting, &mut buf)?;
        Ok(self.processor.endian().u16_from_bytes(buf))
    }

    pub fn set_u8(&self, setting: u8, value: u8) -> Result<()> {
        self.set_raw(setting, &[value])
    }

    /// Write a 16-bit setting; LLD settings go through [`Device::set_lld`]
    pub fn set_u16(&self, setting: u8, value: u16) -> Result<()> {
        if setting == settings::SET_LLD_CHANNEL {
            return self.set_lld(value);
        }
        let bytes = self.processor.endian().u16_to_bytes(value);
        self.set_raw(setting, &bytes)
    }

    pub fn set_raw(&self, setting: u8, data: &[u8]) -> Result<()> {
        self.processor
            .set_configuration_data(self.component, setting, data)?;
        Ok(())
    }

    /// Set the low level discriminator in channels
    ///
    /// Devices without the channel LLD report get the legacy report with
    /// the value shifted into its units.
    pub fn set_lld(&self, channel: u16) -> Result<()> {
        let endian = self.processor.endian();
        let first = self.processor.set_configuration_data(
            self.component,
            settings::SET_LLD_CHANNEL,
            &endian.u16_to_bytes(channel),
        );
        let Err(e) = first else {
            return Ok(());
        };
        log::debug!(
            "device {}: channel LLD rejected ({}), using legacy report",
            self.id,
            e
        );
        let legacy = channel.wrapping_shl(legacy_lld_shift(self.product_id()));
        self.set_raw(settings::SET_LLD, &endian.u16_to_bytes(legacy))
    }

    /// Serial number, read once and cached
    pub fn serial_number(&self) -> Result<String> {
        let mut cached = self.serial.lock();
        if let Some(serial) = cached.as_ref() {
            return Ok(serial.clone());
        }
        let mut buf = [0u8; settings::SERIAL_LEN];
        let n = self
            .processor
            .get_configuration_data(self.component, settings::GET_SERIAL, &mut buf)?;
        let bytes = &buf[..n];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let serial = String::from_utf8_lossy(&bytes[..end]).trim().to_string();
        *cached = Some(serial.clone());
        Ok(serial)
    }

    /// Firmware version, read once and cached
    pub fn firmware_version(&self) -> Result<u16> {
        let mut cached = self.version.lock();
        if let Some(version) = *cached {
            return Ok(version);
        }
        let version = self.get_u16(settings::GET_VERSION)?;
        *cached = Some(version);
        Ok(version)
    }

    fn current_listener(&self) -> Option<Arc<dyn DeviceListener>> {
        self.listener.lock().as_ref().and_then(Weak::upgrade)
    }
}

impl ComponentListener for Device {
    fn on_counts(&self, timestamp: i64, channel: u16, counts: u32) {
        if let Some(l) = self.current_listener() {
            l.on_counts(timestamp, channel, counts);
        }
    }

    fn on_finished(&self, forced: bool) {
        // Another component on the link may have stopped this one
        *self.acquiring.lock() = false;
        if let Some(l) = self.current_listener() {
            l.on_finished(forced);
        }
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        if code == ErrorCode::ReadFailed {
            log::error!("device {}: read failed, stopping acquisition", self.id);
            match self.stop(true) {
                Ok(()) | Err(DeviceError::NotAcquiring) => {}
                Err(e) => log::warn!("device {}: forced stop failed: {}", self.id, e),
            }
        }
        if let Some(l) = self.current_listener() {
            l.on_error(code, message);
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.processor.remove_component(self.component);
    }
}
