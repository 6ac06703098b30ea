//! radsdk-dummy - In-memory transport and device emulators for testing
//!
//! [`LoopbackInterface`] stands in for a physical link. Bytes injected by a
//! test (or a replay) go straight to the registered sink, and every
//! outbound request is recorded. An optional [`Emulator`] answers requests
//! the way a device would.

pub mod emulator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use parking_lot::Mutex;
use radsdk_core::transport::path_hash;
use radsdk_core::{DataInterface, DataSink, Endian, Error, ErrorCode, Result};

pub use emulator::{D3Emulator, Emulator, IntervalEmulator};

/// Identity the loopback reports for itself
#[derive(Debug, Clone)]
pub struct DummyConfig {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub endian: Endian,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            path: "dummy:0".into(),
            vendor_id: 0x04d8, // Kromek
            product_id: 0x01D3, // D3S
            endian: Endian::Little,
        }
    }
}

impl DummyConfig {
    /// Identity of a D3S on the explicit-length link
    pub fn d3() -> Self {
        Self::default()
    }

    /// Identity of a GR1 on the interval count link
    pub fn interval() -> Self {
        Self {
            path: "dummy:1".into(),
            vendor_id: 0x04d8,
            product_id: 0x0000,
            endian: Endian::Big,
        }
    }
}

/// Transport that loops bytes back from memory
pub struct LoopbackInterface {
    config: DummyConfig,
    sink: Mutex<Option<Weak<dyn DataSink>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    emulator: Mutex<Option<Box<dyn Emulator>>>,
    reading: AtomicBool,
    fail_sends: AtomicBool,
}

impl LoopbackInterface {
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            sink: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            emulator: Mutex::new(None),
            reading: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Loopback whose requests are answered by `emulator`
    pub fn with_emulator(config: DummyConfig, emulator: impl Emulator + 'static) -> Self {
        let interface = Self::new(config);
        *interface.emulator.lock() = Some(Box::new(emulator));
        interface
    }

    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// True between `begin_reading` and `stop_reading`
    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::SeqCst)
    }

    /// Make every following send fail with `WriteFailed`
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Every request sent so far, oldest first
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn clear_requests(&self) {
        self.sent.lock().clear();
    }

    /// Hand `data` to the sink as one chunk
    ///
    /// Returns false if no sink is registered.
    pub fn inject(&self, data: &[u8]) -> bool {
        match self.current_sink() {
            Some(sink) => {
                sink.on_data(data);
                true
            }
            None => false,
        }
    }

    /// Hand `data` to the sink in chunks of at most `chunk_len` bytes
    pub fn inject_chunked(&self, data: &[u8], chunk_len: usize) -> bool {
        let Some(sink) = self.current_sink() else {
            return false;
        };
        for chunk in data.chunks(chunk_len.max(1)) {
            sink.on_data(chunk);
        }
        true
    }

    /// Report a transport fault to the sink
    pub fn raise(&self, code: ErrorCode, message: &str) -> bool {
        match self.current_sink() {
            Some(sink) => {
                sink.on_error(code, message);
                true
            }
            None => false,
        }
    }

    /// Let the emulator produce its next unsolicited output and inject it
    pub fn pump(&self) -> bool {
        let output = self.emulator.lock().as_mut().and_then(|e| e.poll());
        match output {
            Some(data) if self.is_reading() => self.inject(&data),
            _ => false,
        }
    }

    fn current_sink(&self) -> Option<std::sync::Arc<dyn DataSink>> {
        self.sink.lock().as_ref().and_then(Weak::upgrade)
    }
}

impl DataInterface for LoopbackInterface {
    fn hash(&self) -> u32 {
        path_hash(&self.config.path)
    }

    fn vendor_id(&self) -> u16 {
        self.config.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.config.product_id
    }

    fn endian(&self) -> Endian {
        self.config.endian
    }

    fn begin_reading(&self) -> Result<()> {
        if !self.reading.swap(true, Ordering::SeqCst) {
            log::debug!("dummy: reading started on {}", self.config.path);
        }
        Ok(())
    }

    fn stop_reading(&self) -> Result<()> {
        if self.reading.swap(false, Ordering::SeqCst) {
            log::debug!("dummy: reading stopped on {}", self.config.path);
        }
        Ok(())
    }

    fn send_configuration_request(&self, data: &[u8]) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::transport(
                ErrorCode::WriteFailed,
                format!("{}: send rejected", self.config.path),
            ));
        }
        self.sent.lock().push(data.to_vec());

        let response = self
            .emulator
            .lock()
            .as_mut()
            .and_then(|e| e.respond(data));
        // A real device only answers while its link is being read
        if let Some(response) = response {
            if self.is_reading() {
                self.inject(&response);
            }
        }
        Ok(())
    }

    fn set_sink(&self, sink: Option<Weak<dyn DataSink>>) {
        *self.sink.lock() = sink;
    }

    fn property(&self, name: &str) -> Option<String> {
        match name {
            "path" => Some(self.config.path.clone()),
            "product" => Some("Loopback".into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Collect {
        data: Mutex<Vec<u8>>,
        errors: Mutex<Vec<ErrorCode>>,
    }

    impl DataSink for Collect {
        fn on_data(&self, data: &[u8]) {
            self.data.lock().extend_from_slice(data);
        }
        fn on_error(&self, code: ErrorCode, _message: &str) {
            self.errors.lock().push(code);
        }
    }

    fn attach(interface: &LoopbackInterface) -> Arc<Collect> {
        let sink = Arc::new(Collect::default());
        let weak = Arc::downgrade(&sink);
        let weak: Weak<dyn DataSink> = weak;
        interface.set_sink(Some(weak));
        sink
    }

    #[test]
    fn test_inject_without_sink() {
        let interface = LoopbackInterface::new(DummyConfig::default());
        assert!(!interface.inject(&[1, 2, 3]));
    }

    #[test]
    fn test_inject_chunked() {
        let interface = LoopbackInterface::new(DummyConfig::default());
        let sink = attach(&interface);
        assert!(interface.inject_chunked(&[1, 2, 3, 4, 5], 2));
        assert_eq!(*sink.data.lock(), vec![1, 2, 3, 4, 5]);
        assert!(interface.raise(ErrorCode::ReadFailed, "gone"));
        assert_eq!(*sink.errors.lock(), vec![ErrorCode::ReadFailed]);
    }

    #[test]
    fn test_dropped_sink_is_not_called() {
        let interface = LoopbackInterface::new(DummyConfig::default());
        drop(attach(&interface));
        assert!(!interface.inject(&[1]));
    }

    #[test]
    fn test_records_and_fails_sends() {
        let interface = LoopbackInterface::new(DummyConfig::default());
        interface.send_configuration(&[0x02, 0x05]).unwrap();
        assert_eq!(interface.requests(), vec![vec![0x02, 0x05]]);

        interface.set_fail_sends(true);
        assert!(matches!(
            interface.send_configuration(&[0x02, 0x06]),
            Err(Error::Transport {
                code: ErrorCode::WriteFailed,
                ..
            })
        ));
        assert_eq!(interface.requests().len(), 1);
    }

    #[test]
    fn test_emulator_answers_only_while_reading() {
        let interface =
            LoopbackInterface::with_emulator(DummyConfig::interval(), IntervalEmulator::new());
        let sink = attach(&interface);
        let request = radsdk_interval::protocol::encode_get_request(0x8a, 2);

        interface.send_configuration_request(&request).unwrap();
        assert!(sink.data.lock().is_empty());

        interface.begin_reading().unwrap();
        interface.send_configuration_request(&request).unwrap();
        assert_eq!(sink.data.lock()[0], 0x8a);
        assert_eq!(sink.data.lock().len(), 3);
    }

    #[test]
    fn test_identity() {
        let interface = LoopbackInterface::new(DummyConfig::interval());
        assert_eq!(interface.endian(), Endian::Big);
        assert_eq!(interface.hash(), path_hash("dummy:1"));
        assert_eq!(interface.property("path").as_deref(), Some("dummy:1"));
        assert!(interface.property("serial").is_none());
    }
}
