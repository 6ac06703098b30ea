//! Spectrum accumulation and acquisition targets for one device

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use radsdk_core::ErrorCode;

use crate::device::{Device, DeviceListener};
use crate::error::{DeviceError, Result};
use crate::model::DeviceProperties;

/// Channels in an accumulated spectrum
pub const SPECTRUM_CHANNELS: usize = 4096;

/// Receiver of a detector's events, keyed by device id
pub trait DriverListener: Send + Sync {
    fn on_data(&self, _device_id: u32, _timestamp: i64, _channel: u16, _counts: u32) {}
    fn on_error(&self, _device_id: u32, _code: ErrorCode, _message: &str) {}
    fn on_acquisition_complete(&self, _device_id: u32) {}
    fn on_device_changed(&self, _device_id: u32, _added: bool) {}
}

/// Snapshot of an acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredData {
    pub channels: Vec<u32>,
    pub total_counts: u32,
    pub real_time_ms: u32,
    pub live_time_ms: u32,
}

#[derive(Debug)]
struct Spectrum {
    channels: Vec<u32>,
    total_counts: u32,
}

#[derive(Debug, Default)]
struct Run {
    acquiring: bool,
    real_target_ms: u32,
    live_target_ms: u32,
}

/// Accumulates a device's count events into a spectrum
pub struct Detector {
    device: Arc<Device>,
    properties: DeviceProperties,
    spectrum: Mutex<Spectrum>,
    run: Mutex<Run>,
    listener: Option<Arc<dyn DriverListener>>,
}

impl Detector {
    /// Wrap `device`, becoming its listener
    pub fn new(
        device: Arc<Device>,
        properties: DeviceProperties,
        listener: Option<Arc<dyn DriverListener>>,
    ) -> Arc<Self> {
        let detector = Arc::new(Self {
            device,
            properties,
            spectrum: Mutex::new(Spectrum {
                channels: vec![0; SPECTRUM_CHANNELS],
                total_counts: 0,
            }),
            run: Mutex::new(Run::default()),
            listener,
        });
        let weak = Arc::downgrade(&detector);
        let weak: Weak<dyn DeviceListener> = weak;
        detector.device.set_listener(Some(weak));
        detector
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn id(&self) -> u32 {
        self.device.id()
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    pub fn is_acquiring(&self) -> bool {
        self.run.lock().acquiring
    }

    /// Start acquiring, stopping on its own once a non-zero real or live
    /// time target is reached
    ///
    /// Does nothing while already acquiring. Counts from earlier runs are
    /// kept until [`Detector::clear`].
    pub fn begin(&self, real_target_ms: u32, live_target_ms: u32) -> Result<()> {
        if self.run.lock().acquiring {
            return Ok(());
        }
        // Unlocked: a finished callback from the last run may land here
        self.device.start()?;
        *self.run.lock() = Run {
            acquiring: true,
            real_target_ms,
            live_target_ms,
        };
        log::debug!(
            "detector {}: acquiring (real target {} ms, live target {} ms)",
            self.id(),
            real_target_ms,
            live_target_ms
        );
        Ok(())
    }

    /// Stop acquiring, letting queued data drain
    pub fn end(&self) -> Result<()> {
        self.run.lock().acquiring = false;
        match self.device.stop(false) {
            Ok(()) | Err(DeviceError::NotAcquiring) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Zero the spectrum and the real time
    pub fn clear(&self) -> Result<()> {
        let mut spectrum = self.spectrum.lock();
        self.device.reset_real_time()?;
        spectrum.channels.fill(0);
        spectrum.total_counts = 0;
        Ok(())
    }

    /// Current (or last) acquisition, optionally clearing it afterwards
    pub fn acquired_data(&self, clear: bool) -> Result<AcquiredData> {
        let mut spectrum = self.spectrum.lock();
        let real_time = self.device.real_time()?;
        let data = AcquiredData {
            channels: spectrum.channels.clone(),
            total_counts: spectrum.total_counts,
            real_time_ms: real_time as u32,
            live_time_ms: self.live_time_ms(real_time, spectrum.total_counts) as u32,
        };
        if clear {
            self.device.reset_real_time()?;
            spectrum.channels.fill(0);
            spectrum.total_counts = 0;
        }
        Ok(data)
    }

    /// Real time corrected for dead time
    ///
    /// `real × (1 − dead_time × rate)` where rate is counts per second;
    /// 0 when no time has elapsed.
    pub fn live_time_ms(&self, real_time_ms: i64, total_counts: u32) -> f64 {
        if real_time_ms == 0 {
            return 0.0;
        }
        let real = real_time_ms as f64;
        let rate = total_counts as f64 / (real / 1000.0);
        real * (1.0 - self.properties.dead_time * rate)
    }

    /// Stop the acquisition if it has reached a target
    pub fn update(&self) -> Result<()> {
        let (real_target, live_target) = {
            let run = self.run.lock();
            if !run.acquiring {
                return Ok(());
            }
            (run.real_target_ms, run.live_target_ms)
        };
        if real_target == 0 && live_target == 0 {
            return Ok(());
        }

        let real_time = self.device.real_time()?;
        if real_target > 0 && real_time >= real_target as i64 {
            log::debug!("detector {}: real time target reached", self.id());
            return self.end();
        }
        if live_target > 0 {
            let counts = self.spectrum.lock().total_counts;
            if self.live_time_ms(real_time, counts) >= live_target as f64 {
                log::debug!("detector {}: live time target reached", self.id());
                return self.end();
            }
        }
        Ok(())
    }
}

impl DeviceListener for Detector {
    fn on_counts(&self, timestamp: i64, channel: u16, counts: u32) {
        {
            let mut spectrum = self.spectrum.lock();
            let Some(slot) = spectrum.channels.get_mut(channel as usize) else {
                log::warn!("detector {}: channel {} out of range", self.id(), channel);
                return;
            };
            *slot = slot.wrapping_add(counts);
            spectrum.total_counts = spectrum.total_counts.wrapping_add(counts);
        }
        if let Some(l) = &self.listener {
            l.on_data(self.id(), timestamp, channel, counts);
        }
    }

    fn on_finished(&self, forced: bool) {
        self.run.lock().acquiring = false;
        log::debug!("detector {}: acquisition finished (forced: {})", self.id(), forced);
        if let Some(l) = &self.listener {
            l.on_acquisition_complete(self.id());
        }
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        if let Some(l) = &self.listener {
            l.on_error(self.id(), code, message);
        }
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            log::warn!("detector {}: stop on drop failed: {}", self.id(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radsdk_core::{
        ComponentListener, DataInterface, DataProcessor, DataSink, Endian, Result as CoreResult,
    };

    /// Processor double reporting a settable real time
    #[derive(Default)]
    struct Clocked {
        real_time: Mutex<i64>,
        resets: Mutex<usize>,
        stops: Mutex<Vec<bool>>,
    }

    impl DataProcessor for Clocked {
        fn endian(&self) -> Endian {
            Endian::Little
        }
        fn component_ids(&self) -> Vec<u8> {
            vec![0]
        }
        fn add_component(
            &self,
            _id: u8,
            _listener: Weak<dyn ComponentListener>,
        ) -> CoreResult<()> {
            Ok(())
        }
        fn remove_component(&self, _id: u8) {}
        fn start_processing(&self, _id: u8) -> CoreResult<()> {
            Ok(())
        }
        fn stop_processing(&self, _id: u8, force: bool) -> CoreResult<()> {
            self.stops.lock().push(force);
            Ok(())
        }
        fn queue_raw_data(&self, _data: &[u8]) {}
        fn real_time(&self, _id: u8) -> CoreResult<i64> {
            Ok(*self.real_time.lock())
        }
        fn reset_real_time(&self, _id: u8) -> CoreResult<()> {
            *self.real_time.lock() = 0;
            *self.resets.lock() += 1;
            Ok(())
        }
        fn get_configuration_data(
            &self,
            _id: u8,
            _setting: u8,
            _out: &mut [u8],
        ) -> CoreResult<usize> {
            Ok(0)
        }
        fn set_configuration_data(&self, _id: u8, _setting: u8, _data: &[u8]) -> CoreResult<()> {
            Ok(())
        }
        fn reset(&self) {}
    }

    struct Link;

    impl DataInterface for Link {
        fn hash(&self) -> u32 {
            1
        }
        fn vendor_id(&self) -> u16 {
            0x2A5A
        }
        fn product_id(&self) -> u16 {
            0
        }
        fn endian(&self) -> Endian {
            Endian::Little
        }
        fn begin_reading(&self) -> CoreResult<()> {
            Ok(())
        }
        fn stop_reading(&self) -> CoreResult<()> {
            Ok(())
        }
        fn send_configuration_request(&self, _data: &[u8]) -> CoreResult<()> {
            Ok(())
        }
        fn set_sink(&self, _sink: Option<Weak<dyn DataSink>>) {}
    }

    fn detector(dead_time: f64) -> (Arc<Clocked>, Arc<Detector>) {
        let processor = Arc::new(Clocked::default());
        let device = Device::new(Arc::new(Link), processor.clone(), 0).unwrap();
        let properties = DeviceProperties {
            dead_time,
            ..DeviceProperties::default()
        };
        (processor, Detector::new(device, properties, None))
    }

    #[test]
    fn test_counts_accumulate() {
        let (processor, det) = detector(0.0);
        det.begin(0, 0).unwrap();
        det.on_counts(0, 10, 2);
        det.on_counts(0, 10, 1);
        det.on_counts(0, 4095, 5);
        det.on_counts(0, 4096, 5);
        *processor.real_time.lock() = 1_000;

        let data = det.acquired_data(false).unwrap();
        assert_eq!(data.channels[10], 3);
        assert_eq!(data.channels[4095], 5);
        assert_eq!(data.total_counts, 8);
        assert_eq!(data.real_time_ms, 1_000);
        assert_eq!(data.live_time_ms, 1_000);
    }

    #[test]
    fn test_live_time() {
        let (_processor, det) = detector(1.0e-3);
        assert_eq!(det.live_time_ms(0, 100), 0.0);
        // 100 counts over 1 s at 1 ms dead time: 10% dead
        assert!((det.live_time_ms(1_000, 100) - 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_acquired_data_clear() {
        let (processor, det) = detector(0.0);
        det.on_counts(0, 1, 1);
        *processor.real_time.lock() = 50;
        let first = det.acquired_data(true).unwrap();
        assert_eq!(first.total_counts, 1);
        assert_eq!(*processor.resets.lock(), 1);

        let second = det.acquired_data(false).unwrap();
        assert_eq!(second.total_counts, 0);
        assert_eq!(second.real_time_ms, 0);
        assert!(second.channels.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_begin_while_acquiring_keeps_targets() {
        let (processor, det) = detector(0.0);
        det.begin(100, 0).unwrap();
        det.begin(0, 0).unwrap();
        *processor.real_time.lock() = 100;
        det.update().unwrap();
        assert!(!det.is_acquiring());
        assert_eq!(*processor.stops.lock(), vec![false]);
    }

    #[test]
    fn test_live_target() {
        let (processor, det) = detector(1.0e-3);
        det.begin(0, 500).unwrap();
        for _ in 0..100 {
            det.on_counts(0, 3, 1);
        }
        // 900 ms live after 1 s
        *processor.real_time.lock() = 400;
        det.update().unwrap();
        assert!(det.is_acquiring());
        *processor.real_time.lock() = 1_000;
        det.update().unwrap();
        assert!(!det.is_acquiring());
    }

    #[test]
    fn test_update_without_targets_runs_on() {
        let (processor, det) = detector(0.0);
        det.begin(0, 0).unwrap();
        *processor.real_time.lock() = 1_000_000;
        det.update().unwrap();
        assert!(det.is_acquiring());
    }

    #[test]
    fn test_finished_clears_acquiring() {
        let (_processor, det) = detector(0.0);
        det.begin(0, 0).unwrap();
        DeviceListener::on_finished(&*det, true);
        assert!(!det.is_acquiring());
    }
}
