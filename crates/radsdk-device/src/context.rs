//! Driver context: the set of attached detectors and their update thread

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use radsdk_core::worker::Worker;
use radsdk_core::{Clock, ProcessorConfig};

use crate::config::ContextConfig;
use crate::detector::{AcquiredData, Detector, DriverListener};
use crate::device::Device;
use crate::error::{DeviceError, Result};
use crate::model::{DeviceInfo, DeviceProperties};

#[derive(Default)]
struct Lifecycle {
    initialised: bool,
    stop: bool,
}

struct Inner {
    lifecycle: Mutex<Lifecycle>,
    wake: Condvar,
    devices: Mutex<Vec<Arc<Detector>>>,
    listener: Mutex<Option<Arc<dyn DriverListener>>>,
}

impl Inner {
    fn update_loop(&self, config: &ContextConfig) {
        log::info!("context: update thread running");
        loop {
            {
                let mut lifecycle = self.lifecycle.lock();
                if !lifecycle.stop {
                    self.wake.wait_for(&mut lifecycle, config.update_interval());
                }
                if lifecycle.stop {
                    break;
                }
            }
            let detectors = self.devices.lock().clone();
            for detector in detectors {
                if let Err(e) = detector.update() {
                    log::warn!("context: update of device {} failed: {}", detector.id(), e);
                }
            }
        }
        log::info!("context: update thread stopped");
    }
}

/// Owns every attached detector
///
/// A context goes through one `initialise`/`shutdown` cycle. While
/// initialised a background thread stops acquisitions that reach their
/// real or live time target.
pub struct DriverContext {
    config: ContextConfig,
    clock: Arc<dyn Clock>,
    inner: Arc<Inner>,
    worker: Worker,
}

impl DriverContext {
    pub fn new(config: ContextConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Arc::new(Inner {
                lifecycle: Mutex::new(Lifecycle::default()),
                wake: Condvar::new(),
                devices: Mutex::new(Vec::new()),
                listener: Mutex::new(None),
            }),
            worker: Worker::new(),
        }
    }

    /// Clock processors for this context's devices should share
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn processor_config(&self) -> &ProcessorConfig {
        &self.config.processor
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn is_initialised(&self) -> bool {
        self.inner.lifecycle.lock().initialised
    }

    /// Start the update thread; `listener` receives every device's events
    pub fn initialise(&self, listener: Option<Arc<dyn DriverListener>>) -> Result<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.initialised {
                return Err(DeviceError::AlreadyInitialised);
            }
            *lifecycle = Lifecycle {
                initialised: true,
                stop: false,
            };
        }
        *self.inner.listener.lock() = listener;

        let inner = self.inner.clone();
        let config = self.config.clone();
        if let Err(e) = self
            .worker
            .spawn("context-update", move || inner.update_loop(&config))
        {
            self.inner.lifecycle.lock().initialised = false;
            *self.inner.listener.lock() = None;
            return Err(e.into());
        }
        log::info!("context: initialised");
        Ok(())
    }

    /// Stop every acquisition, release every device and stop the update
    /// thread
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if !lifecycle.initialised {
                return Err(DeviceError::NotInitialised);
            }
            lifecycle.initialised = false;
            lifecycle.stop = true;
            self.inner.wake.notify_all();
        }
        self.worker.join();

        let detectors = std::mem::take(&mut *self.inner.devices.lock());
        for detector in &detectors {
            if let Err(e) = detector.end() {
                log::warn!("context: stopping device {} failed: {}", detector.id(), e);
            }
        }
        drop(detectors);
        *self.inner.listener.lock() = None;
        log::info!("context: shut down");
        Ok(())
    }

    /// Take ownership of `device`, returning its id
    pub fn attach(&self, device: Arc<Device>, properties: DeviceProperties) -> Result<u32> {
        if !self.is_initialised() {
            return Err(DeviceError::NotInitialised);
        }
        let id = device.id();
        let listener = self.inner.listener.lock().clone();
        {
            let mut devices = self.inner.devices.lock();
            if devices.iter().any(|d| d.id() == id) {
                return Err(DeviceError::InvalidDeviceId(id));
            }
            log::info!("context: attached {} as device {}", properties.name, id);
            devices.push(Detector::new(device, properties, listener.clone()));
        }
        if let Some(l) = listener {
            l.on_device_changed(id, true);
        }
        Ok(id)
    }

    /// Stop and release a device
    pub fn detach(&self, id: u32) -> Result<()> {
        let detector = {
            let mut devices = self.inner.devices.lock();
            let index = devices
                .iter()
                .position(|d| d.id() == id)
                .ok_or(DeviceError::InvalidDeviceId(id))?;
            devices.remove(index)
        };
        if let Err(e) = detector.end() {
            log::warn!("context: stopping device {} failed: {}", id, e);
        }
        drop(detector);
        log::info!("context: detached device {}", id);
        if let Some(l) = self.inner.listener.lock().clone() {
            l.on_device_changed(id, false);
        }
        Ok(())
    }

    /// Ids of every attached device, in attach order
    pub fn devices(&self) -> Vec<u32> {
        self.inner.devices.lock().iter().map(|d| d.id()).collect()
    }

    /// Device following `after`, or the first device when `after` is 0
    ///
    /// `None` at the end of the list or when `after` is not attached.
    pub fn next_device(&self, after: u32) -> Option<u32> {
        let devices = self.inner.devices.lock();
        if after == 0 {
            return devices.first().map(|d| d.id());
        }
        let index = devices.iter().position(|d| d.id() == after)?;
        devices.get(index + 1).map(|d| d.id())
    }

    pub fn begin_acquisition(
        &self,
        id: u32,
        real_target_ms: u32,
        live_target_ms: u32,
    ) -> Result<()> {
        self.detector(id)?.begin(real_target_ms, live_target_ms)
    }

    pub fn end_acquisition(&self, id: u32) -> Result<()> {
        self.detector(id)?.end()
    }

    pub fn is_acquiring(&self, id: u32) -> Result<bool> {
        Ok(self.detector(id)?.is_acquiring())
    }

    pub fn acquired_data(&self, id: u32, clear: bool) -> Result<AcquiredData> {
        self.detector(id)?.acquired_data(clear)
    }

    pub fn clear_acquired_data(&self, id: u32) -> Result<()> {
        self.detector(id)?.clear()
    }

    pub fn device_info(&self, id: u32) -> Result<DeviceInfo> {
        let detector = self.detector(id)?;
        let device = detector.device();
        let properties = detector.properties();
        Ok(DeviceInfo {
            vendor_id: device.vendor_id(),
            product_id: device.product_id(),
            name: properties.name.clone(),
            manufacturer: properties.manufacturer.clone(),
            kind: properties.kind,
        })
    }

    pub fn serial_number(&self, id: u32) -> Result<String> {
        self.detector(id)?.device().serial_number()
    }

    pub fn send_u8(&self, id: u32, setting: u8, value: u8) -> Result<()> {
        self.detector(id)?.device().set_u8(setting, value)
    }

    pub fn send_u16(&self, id: u32, setting: u8, value: u16) -> Result<()> {
        self.detector(id)?.device().set_u16(setting, value)
    }

    pub fn get_u8(&self, id: u32, setting: u8) -> Result<u8> {
        self.detector(id)?.device().get_u8(setting)
    }

    pub fn get_u16(&self, id: u32, setting: u8) -> Result<u16> {
        self.detector(id)?.device().get_u16(setting)
    }

    /// Look up a detector, releasing the device list before it is used
    fn detector(&self, id: u32) -> Result<Arc<Detector>> {
        if !self.is_initialised() {
            return Err(DeviceError::NotInitialised);
        }
        self.inner
            .devices
            .lock()
            .iter()
            .find(|d| d.id() == id)
            .cloned()
            .ok_or(DeviceError::InvalidDeviceId(id))
    }
}

impl Drop for DriverContext {
    fn drop(&mut self) {
        if self.is_initialised() {
            if let Err(e) = self.shutdown() {
                log::warn!("context: shutdown on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DetectorKind;
    use radsdk_core::{DataInterface, DataProcessor, ManualClock};
    use radsdk_d3::{protocol as d3, D3Processor};
    use radsdk_dummy::{D3Emulator, DummyConfig, LoopbackInterface};
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Default)]
    struct Events {
        changed: Mutex<Vec<(u32, bool)>>,
        complete: Mutex<Option<mpsc::Sender<u32>>>,
    }

    impl DriverListener for Events {
        fn on_acquisition_complete(&self, device_id: u32) {
            if let Some(tx) = self.complete.lock().as_ref() {
                let _ = tx.send(device_id);
            }
        }
        fn on_device_changed(&self, device_id: u32, added: bool) {
            self.changed.lock().push((device_id, added));
        }
    }

    struct Rig {
        context: DriverContext,
        events: Arc<Events>,
        link: Arc<LoopbackInterface>,
        processor: Arc<D3Processor>,
    }

    fn rig() -> Rig {
        let clock = Arc::new(ManualClock::new(1_000));
        let context = DriverContext::new(ContextConfig::default(), clock.clone());
        let events = Arc::new(Events::default());
        let listener: Arc<dyn DriverListener> = events.clone();
        context.initialise(Some(listener)).unwrap();

        let link = Arc::new(LoopbackInterface::with_emulator(
            DummyConfig::d3(),
            D3Emulator::new(),
        ));
        let transport: Arc<dyn DataInterface> = link.clone();
        let processor = Arc::new(D3Processor::new(
            transport,
            clock,
            context.processor_config().clone(),
        ));
        Rig {
            context,
            events,
            link,
            processor,
        }
    }

    fn attach(rig: &Rig, component: u8, kind: DetectorKind) -> u32 {
        let transport: Arc<dyn DataInterface> = rig.link.clone();
        let processor: Arc<dyn DataProcessor> = rig.processor.clone();
        let device = Device::new(transport, processor, component).unwrap();
        let properties = DeviceProperties {
            kind,
            ..DeviceProperties::default()
        };
        rig.context.attach(device, properties).unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let context = DriverContext::new(ContextConfig::default(), Arc::new(ManualClock::new(0)));
        assert!(matches!(context.shutdown(), Err(DeviceError::NotInitialised)));
        assert!(matches!(context.acquired_data(1, false), Err(DeviceError::NotInitialised)));
        context.initialise(None).unwrap();
        assert!(matches!(context.initialise(None), Err(DeviceError::AlreadyInitialised)));
        context.shutdown().unwrap();
        assert!(!context.is_initialised());
    }

    #[test]
    fn test_attach_and_iterate() {
        let rig = rig();
        let gamma = attach(&rig, d3::component::GAMMA, DetectorKind::Gamma);
        let neutron = attach(&rig, d3::component::NEUTRON, DetectorKind::Neutron);
        assert_eq!(neutron, gamma + 1000);

        assert_eq!(rig.context.devices(), vec![gamma, neutron]);
        assert_eq!(rig.context.next_device(0), Some(gamma));
        assert_eq!(rig.context.next_device(gamma), Some(neutron));
        assert_eq!(rig.context.next_device(neutron), None);
        assert_eq!(rig.context.next_device(12345), None);
        assert_eq!(
            *rig.events.changed.lock(),
            vec![(gamma, true), (neutron, true)]
        );

        rig.context.detach(gamma).unwrap();
        assert_eq!(rig.context.devices(), vec![neutron]);
        assert!(matches!(
            rig.context.detach(gamma),
            Err(DeviceError::InvalidDeviceId(_))
        ));
        assert_eq!(rig.events.changed.lock().last(), Some(&(gamma, false)));
    }

    #[test]
    fn test_duplicate_attach_is_rejected() {
        let rig = rig();
        let transport: Arc<dyn DataInterface> = rig.link.clone();
        let processor: Arc<dyn DataProcessor> = rig.processor.clone();
        let device = Device::new(transport, processor, d3::component::GAMMA).unwrap();
        let id = rig
            .context
            .attach(device.clone(), DeviceProperties::default())
            .unwrap();
        assert!(matches!(
            rig.context.attach(device, DeviceProperties::default()),
            Err(DeviceError::InvalidDeviceId(dup)) if dup == id
        ));
        assert_eq!(rig.context.devices(), vec![id]);
    }

    #[test]
    fn test_device_info_and_serial() {
        let rig = rig();
        let gamma = attach(&rig, d3::component::GAMMA, DetectorKind::Gamma);
        let info = rig.context.device_info(gamma).unwrap();
        assert_eq!(info.vendor_id, 0x04d8);
        assert_eq!(info.product_id, 0x01D3);
        assert_eq!(info.kind, DetectorKind::Gamma);

        assert_eq!(rig.context.serial_number(gamma).unwrap(), "D3S-EMU-0001");
        assert_eq!(rig.context.get_u8(gamma, d3::report::GET_GAIN).unwrap(), 0x10);
    }

    #[test]
    fn test_unknown_id() {
        let rig = rig();
        assert!(matches!(
            rig.context.begin_acquisition(99, 0, 0),
            Err(DeviceError::InvalidDeviceId(99))
        ));
        assert!(matches!(
            rig.context.is_acquiring(99),
            Err(DeviceError::InvalidDeviceId(99))
        ));
    }

    #[test]
    fn test_end_acquisition_reports_completion() {
        let rig = rig();
        let (tx, rx) = mpsc::channel();
        *rig.events.complete.lock() = Some(tx);
        let gamma = attach(&rig, d3::component::GAMMA, DetectorKind::Gamma);

        rig.context.begin_acquisition(gamma, 0, 0).unwrap();
        assert!(rig.context.is_acquiring(gamma).unwrap());
        rig.context.end_acquisition(gamma).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), gamma);
        assert!(!rig.context.is_acquiring(gamma).unwrap());
    }

    #[test]
    fn test_shutdown_releases_devices() {
        let rig = rig();
        let gamma = attach(&rig, d3::component::GAMMA, DetectorKind::Gamma);
        rig.context.begin_acquisition(gamma, 0, 0).unwrap();
        rig.context.shutdown().unwrap();
        assert!(rig.context.devices().is_empty());
        assert!(!rig.link.is_reading());
    }
}
