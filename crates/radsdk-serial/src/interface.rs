//! [`DataInterface`] over a serial port

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use radsdk_core::transport::path_hash;
use radsdk_core::worker::Worker;
use radsdk_core::{DataInterface, DataSink, Endian, ErrorCode};
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};

use crate::error::{Result, SerialError};

/// Baud rate used when none is given
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Bytes requested from the port per read
const READ_CHUNK: usize = 4096;

struct Shared {
    path: String,
    sink: Mutex<Option<Weak<dyn DataSink>>>,
    /// Write handle of the open port
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    running: AtomicBool,
}

impl Shared {
    fn sink(&self) -> Option<Arc<dyn DataSink>> {
        self.sink.lock().as_ref().and_then(Weak::upgrade)
    }

    fn raise(&self, code: ErrorCode, message: &str) {
        if let Some(sink) = self.sink() {
            sink.on_error(code, message);
        }
    }

    fn write(&self, data: &[u8]) -> radsdk_core::Result<()> {
        let mut writer = self.writer.lock();
        let Some(port) = writer.as_mut() else {
            return Err(radsdk_core::Error::transport(
                ErrorCode::WriteFailed,
                format!("{}: port not open", self.path),
            ));
        };
        port.write_all(data)
            .and_then(|()| port.flush())
            .map_err(|e| {
                log::error!("serial: write to {} failed: {}", self.path, e);
                SerialError::from(e).into_transport(ErrorCode::WriteFailed, &self.path)
            })
    }

    fn read_loop(&self, mut port: Box<dyn SerialPort>) {
        log::info!("serial: reading {}", self.path);
        let mut buf = vec![0u8; READ_CHUNK];
        while self.running.load(Ordering::SeqCst) {
            match port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    if let Some(sink) = self.sink() {
                        sink.on_data(&buf[..n]);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    log::error!("serial: read from {} failed: {}", self.path, e);
                    self.running.store(false, Ordering::SeqCst);
                    self.writer.lock().take();
                    self.raise(ErrorCode::ReadFailed, &e.to_string());
                    break;
                }
            }
        }
        log::info!("serial: stopped reading {}", self.path);
    }
}

/// A spectrometer on a serial port (8N1, no flow control)
///
/// The port is opened by `begin_reading` and closed by `stop_reading`.
/// Requests are written straight to the open port from the caller's
/// thread; sending while it is closed fails with `WriteFailed`.
pub struct SerialInterface {
    shared: Arc<Shared>,
    worker: Worker,
    baud_rate: u32,
    read_timeout: Duration,
    endian: Endian,
    vendor_id: u16,
    product_id: u16,
}

impl SerialInterface {
    /// Describe the port at `path`
    ///
    /// USB vendor and product ids are taken from the system's port list
    /// when the port is a USB device, and are 0 otherwise.
    pub fn new(path: &str, baud_rate: Option<u32>) -> Self {
        let (vendor_id, product_id) = usb_ids(path).unwrap_or((0, 0));
        Self {
            shared: Arc::new(Shared {
                path: path.to_string(),
                sink: Mutex::new(None),
                writer: Mutex::new(None),
                running: AtomicBool::new(false),
            }),
            worker: Worker::new(),
            baud_rate: baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
            read_timeout: Duration::from_millis(20),
            endian: Endian::Little,
            vendor_id,
            product_id,
        }
    }

    /// Byte order of the protocol spoken over this port
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Override the USB ids (ports that don't report them)
    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// How long one read waits before checking for a stop
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn path(&self) -> &str {
        &self.shared.path
    }

    pub fn is_reading(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Open the port, returning its read and write handles
    fn open(&self) -> Result<(Box<dyn SerialPort>, Box<dyn SerialPort>)> {
        let port = serialport::new(&self.shared.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()?;
        let writer = port.try_clone()?;
        log::info!(
            "serial: opened {} at {} baud",
            self.shared.path,
            self.baud_rate
        );
        Ok((port, writer))
    }
}

fn usb_ids(path: &str) -> Option<(u16, u16)> {
    let ports = serialport::available_ports().ok()?;
    ports
        .into_iter()
        .find(|p| p.port_name == path)
        .and_then(|p| match p.port_type {
            SerialPortType::UsbPort(info) => Some((info.vid, info.pid)),
            _ => None,
        })
}

impl DataInterface for SerialInterface {
    fn hash(&self) -> u32 {
        path_hash(&self.shared.path)
    }

    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn endian(&self) -> Endian {
        self.endian
    }

    fn begin_reading(&self) -> radsdk_core::Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // A thread that stopped on a read error may still hold a handle
        self.worker.join();

        let (port, writer) = match self.open() {
            Ok(handles) => handles,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                log::error!("serial: failed to open {}: {}", self.shared.path, e);
                self.shared.raise(ErrorCode::DeviceOpenFailed, &e.to_string());
                return Err(e.into_transport(ErrorCode::DeviceOpenFailed, &self.shared.path));
            }
        };
        *self.shared.writer.lock() = Some(writer);
        let shared = self.shared.clone();
        if let Err(e) = self
            .worker
            .spawn("serial-read", move || shared.read_loop(port))
        {
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.writer.lock().take();
            return Err(e);
        }
        Ok(())
    }

    fn stop_reading(&self) -> radsdk_core::Result<()> {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            log::debug!("serial: stop reading {}", self.shared.path);
        }
        self.shared.writer.lock().take();
        // From the read thread itself this only detaches
        self.worker.join();
        Ok(())
    }

    fn send_configuration_request(&self, data: &[u8]) -> radsdk_core::Result<()> {
        self.shared.write(data)
    }

    fn set_sink(&self, sink: Option<Weak<dyn DataSink>>) {
        *self.shared.sink.lock() = sink;
    }

    fn property(&self, name: &str) -> Option<String> {
        match name {
            "path" => Some(self.shared.path.clone()),
            "baud" => Some(self.baud_rate.to_string()),
            _ => None,
        }
    }
}

impl Drop for SerialInterface {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.writer.lock().take();
        self.worker.join();
    }
}
