//! An acquisition over one link: processor, devices and their events

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use radsdk_core::{DataInterface, DataProcessor, ErrorCode, MonotonicClock};
use radsdk_d3::D3Processor;
use radsdk_device::{
    known_model, ContextConfig, Device, DriverContext, DriverListener, KnownModel,
    ProtocolFamily, KNOWN_MODELS,
};
use radsdk_interval::IntervalProcessor;

use crate::cli::Protocol;

type Error = Box<dyn std::error::Error>;

enum Event {
    Complete(u32),
    Error(u32, ErrorCode, String),
}

struct Forward(Mutex<Sender<Event>>);

impl DriverListener for Forward {
    fn on_error(&self, device_id: u32, code: ErrorCode, message: &str) {
        let _ = self
            .0
            .lock()
            .send(Event::Error(device_id, code, message.to_string()));
    }

    fn on_acquisition_complete(&self, device_id: u32) {
        let _ = self.0.lock().send(Event::Complete(device_id));
    }
}

enum Processor {
    D3(Arc<D3Processor>),
    Interval(Arc<IntervalProcessor>),
}

impl Processor {
    fn is_drained(&self) -> bool {
        match self {
            Processor::D3(p) => p.queued_bytes() == 0,
            Processor::Interval(p) => p.queued_reports() == 0,
        }
    }

    fn as_dyn(&self) -> Arc<dyn DataProcessor> {
        match self {
            Processor::D3(p) => p.clone(),
            Processor::Interval(p) => p.clone(),
        }
    }
}

pub struct Session {
    context: DriverContext,
    processor: Processor,
    events: Receiver<Event>,
    ids: Vec<u32>,
    errors: Vec<(u32, ErrorCode, String)>,
}

/// Model to assume when the link's ids are not recognised
fn fallback_model(family: ProtocolFamily) -> Option<&'static KnownModel> {
    KNOWN_MODELS.iter().find(|m| m.protocol == family)
}

impl Session {
    /// Build the processor for `protocol` and attach every detector on the
    /// link
    pub fn open(
        config: ContextConfig,
        interface: Arc<dyn DataInterface>,
        protocol: Protocol,
    ) -> Result<Self, Error> {
        let context = DriverContext::new(config, Arc::new(MonotonicClock::new()));
        let (tx, events) = mpsc::channel();
        let listener: Arc<dyn DriverListener> = Arc::new(Forward(Mutex::new(tx)));
        context.initialise(Some(listener))?;

        let clock = context.clock();
        let processor_config = context.processor_config().clone();
        let (processor, components) = match protocol {
            Protocol::D3 => (
                Processor::D3(Arc::new(D3Processor::new(
                    interface.clone(),
                    clock,
                    processor_config,
                ))),
                vec![radsdk_d3::component::GAMMA, radsdk_d3::component::NEUTRON],
            ),
            Protocol::Interval => (
                Processor::Interval(Arc::new(IntervalProcessor::new(
                    interface.clone(),
                    clock,
                    processor_config,
                ))),
                vec![radsdk_interval::component::DETECTOR],
            ),
        };

        let model = known_model(interface.vendor_id(), interface.product_id())
            .filter(|m| m.protocol == protocol.family())
            .or_else(|| {
                log::warn!(
                    "Unrecognised device {:04x}:{:04x}, assuming {} properties",
                    interface.vendor_id(),
                    interface.product_id(),
                    protocol.family()
                );
                fallback_model(protocol.family())
            });

        let mut ids = Vec::new();
        for (index, component) in components.into_iter().enumerate() {
            let device = Device::new(interface.clone(), processor.as_dyn(), component)?;
            let properties = model
                .and_then(|m| m.properties(index))
                .unwrap_or_default();
            ids.push(context.attach(device, properties)?);
        }

        Ok(Self {
            context,
            processor,
            events,
            ids,
            errors: Vec::new(),
        })
    }

    /// Start every detector; a non-zero target ends the run on its own
    pub fn begin(&self, real_target_ms: u32) -> Result<(), Error> {
        for &id in &self.ids {
            self.context.begin_acquisition(id, real_target_ms, 0)?;
        }
        Ok(())
    }

    /// Wait until every queued message has been processed
    pub fn drain(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while !self.processor.is_drained() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        // The last message may still be in dispatch
        std::thread::sleep(Duration::from_millis(20));
    }

    pub fn end(&self) -> Result<(), Error> {
        for &id in &self.ids {
            self.context.end_acquisition(id)?;
        }
        Ok(())
    }

    /// Wait for every detector to report completion
    pub fn wait(&mut self, timeout: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + timeout;
        let mut pending = self.ids.clone();
        while !pending.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(left) {
                Ok(Event::Complete(id)) => pending.retain(|&p| p != id),
                Ok(Event::Error(id, code, message)) => {
                    log::warn!("Device {}: {} ({})", id, code, message);
                    self.errors.push((id, code, message));
                }
                Err(_) => {
                    return Err(format!(
                        "timed out waiting for {} detector(s) to finish",
                        pending.len()
                    )
                    .into())
                }
            }
        }
        Ok(())
    }

    /// Print counts, times and the busiest channels of every detector
    pub fn print_summary(&self, top: usize) -> Result<(), Error> {
        for &id in &self.ids {
            let info = self.context.device_info(id)?;
            let data = self.context.acquired_data(id, false)?;
            println!("{} ({}), device {}", info.name, info.kind, id);
            println!("  Total counts: {}", data.total_counts);
            println!("  Real time:    {} ms", data.real_time_ms);
            println!("  Live time:    {} ms", data.live_time_ms);

            let mut channels: Vec<(usize, u32)> = data
                .channels
                .iter()
                .copied()
                .enumerate()
                .filter(|&(_, n)| n > 0)
                .collect();
            channels.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            if !channels.is_empty() {
                println!("  {:>8} {:>10}", "Channel", "Counts");
                for (channel, counts) in channels.into_iter().take(top) {
                    println!("  {:>8} {:>10}", channel, counts);
                }
            }
        }

        let errors = self.errors.len();
        if errors > 0 {
            println!();
            println!("{} stream error(s) reported", errors);
        }
        Ok(())
    }

    pub fn shutdown(self) -> Result<(), Error> {
        self.context.shutdown()?;
        Ok(())
    }
}
