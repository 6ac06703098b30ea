//! End-to-end acquisitions through the loopback transport

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use radsdk_core::{Clock, DataInterface, DataProcessor, ErrorCode, ManualClock};
use radsdk_d3::{component, protocol as d3, D3Processor};
use radsdk_device::{known_model, ContextConfig, Device, DriverContext, DriverListener};
use radsdk_dummy::{DummyConfig, LoopbackInterface};
use radsdk_interval::{protocol as interval, IntervalProcessor};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Data { id: u32, channel: u16, counts: u32 },
    Complete(u32),
    Error(u32, ErrorCode),
}

struct Forward(Mutex<Sender<Event>>);

impl DriverListener for Forward {
    fn on_data(&self, device_id: u32, _timestamp: i64, channel: u16, counts: u32) {
        let _ = self.0.lock().send(Event::Data {
            id: device_id,
            channel,
            counts,
        });
    }

    fn on_error(&self, device_id: u32, code: ErrorCode, _message: &str) {
        let _ = self.0.lock().send(Event::Error(device_id, code));
    }

    fn on_acquisition_complete(&self, device_id: u32) {
        let _ = self.0.lock().send(Event::Complete(device_id));
    }
}

fn context(clock: &Arc<ManualClock>) -> (DriverContext, Receiver<Event>) {
    let clock: Arc<dyn Clock> = clock.clone();
    let context = DriverContext::new(ContextConfig::default(), clock);
    let (tx, rx) = mpsc::channel();
    let listener: Arc<dyn DriverListener> = Arc::new(Forward(Mutex::new(tx)));
    context.initialise(Some(listener)).unwrap();
    (context, rx)
}

/// Wait for `expected`, collecting whatever arrives before it
fn wait_for(rx: &Receiver<Event>, expected: &Event) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap_or_else(|_| panic!("timed out waiting for {:?}, saw {:?}", expected, seen));
        let done = &event == expected;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn spectrum(sequence: u8, elapsed_ms: u32, neutron: u16, counts: &[(usize, u16)]) -> Vec<u8> {
    let mut channels = vec![0u16; d3::SPECTRUM_CHANNELS];
    for &(channel, n) in counts {
        channels[channel] = n;
    }
    d3::encode_spectrum(sequence, elapsed_ms, neutron, &channels)
}

#[test]
fn test_d3_gamma_and_neutron_share_one_link() {
    let clock = Arc::new(ManualClock::new(1_000));
    let (context, rx) = context(&clock);
    let link = Arc::new(LoopbackInterface::new(DummyConfig::d3()));
    let transport: Arc<dyn DataInterface> = link.clone();
    let processor: Arc<dyn DataProcessor> = Arc::new(D3Processor::new(
        transport.clone(),
        context.clock(),
        context.processor_config().clone(),
    ));

    let model = known_model(link.vendor_id(), link.product_id()).unwrap();
    let gamma = context
        .attach(
            Device::new(transport.clone(), processor.clone(), component::GAMMA).unwrap(),
            model.properties(0).unwrap(),
        )
        .unwrap();
    let neutron = context
        .attach(
            Device::new(transport, processor, component::NEUTRON).unwrap(),
            model.properties(1).unwrap(),
        )
        .unwrap();

    context.begin_acquisition(gamma, 0, 0).unwrap();
    context.begin_acquisition(neutron, 0, 0).unwrap();
    assert!(link.is_reading());

    // The first record only opens the time reference
    clock.set_ms(1_100);
    let mut stream = spectrum(0, 100, 9, &[(10, 9)]);
    stream.extend(spectrum(1, 100, 2, &[(10, 5), (20, 1)]));
    link.inject_chunked(&stream, 61);

    let seen = wait_for(
        &rx,
        &Event::Data {
            id: neutron,
            channel: 0,
            counts: 2,
        },
    );
    assert!(seen.contains(&Event::Data {
        id: gamma,
        channel: 10,
        counts: 5
    }));
    let data = context.acquired_data(gamma, false).unwrap();
    assert_eq!(data.channels[10], 5);
    assert_eq!(data.channels[20], 1);
    assert_eq!(data.total_counts, 6);
    assert_eq!(data.real_time_ms, 100);

    // Gamma drains until a record past its stop point; neutron keeps going
    context.end_acquisition(gamma).unwrap();
    clock.set_ms(1_300);
    link.inject(&spectrum(2, 100, 1, &[(10, 7)]));
    let seen = wait_for(&rx, &Event::Complete(gamma));
    assert!(!seen.iter().any(|e| matches!(e, Event::Data { id, .. } if *id == gamma)));
    wait_for(
        &rx,
        &Event::Data {
            id: neutron,
            channel: 0,
            counts: 1,
        },
    );
    assert!(context.is_acquiring(neutron).unwrap());
    assert!(!context.is_acquiring(gamma).unwrap());
    assert_eq!(context.acquired_data(gamma, false).unwrap().total_counts, 6);

    let neutron_data = context.acquired_data(neutron, true).unwrap();
    assert_eq!(neutron_data.channels[0], 3);
    assert_eq!(neutron_data.real_time_ms, 200);
    assert_eq!(context.acquired_data(neutron, false).unwrap().total_counts, 0);

    context.end_acquisition(neutron).unwrap();
    wait_for(&rx, &Event::Complete(neutron));
    assert!(!link.is_reading());
    context.shutdown().unwrap();
}

#[test]
fn test_interval_real_time_target() {
    let clock = Arc::new(ManualClock::new(1_000));
    let (context, rx) = context(&clock);
    let link = Arc::new(LoopbackInterface::new(DummyConfig::interval()));
    let transport: Arc<dyn DataInterface> = link.clone();
    let processor: Arc<dyn DataProcessor> = Arc::new(IntervalProcessor::new(
        transport.clone(),
        context.clock(),
        context.processor_config().clone(),
    ));
    let properties = known_model(link.vendor_id(), link.product_id())
        .and_then(|m| m.properties(0))
        .unwrap();
    assert_eq!(properties.name, "GR1");
    let device = Device::new(transport, processor, interval::component::DETECTOR).unwrap();
    let id = context.attach(device, properties).unwrap();

    context.begin_acquisition(id, 500, 0).unwrap();
    link.inject(&interval::encode_counts(&[3, 3, 7]));
    wait_for(
        &rx,
        &Event::Data {
            id,
            channel: 7,
            counts: 1,
        },
    );
    assert!(context.is_acquiring(id).unwrap());

    // The update thread ends the run once the target is reached
    clock.advance_ms(600);
    wait_for(&rx, &Event::Complete(id));
    assert!(!context.is_acquiring(id).unwrap());

    let data = context.acquired_data(id, false).unwrap();
    assert_eq!(data.channels[3], 2);
    assert_eq!(data.channels[7], 1);
    assert_eq!(data.total_counts, 3);
    assert_eq!(data.real_time_ms, 600);
    // 3 events over 0.6 s at 10 us dead time
    assert_eq!(data.live_time_ms, 599);
}

#[test]
fn test_read_failure_stops_and_reports() {
    let clock = Arc::new(ManualClock::new(0));
    let (context, rx) = context(&clock);
    let link = Arc::new(LoopbackInterface::new(DummyConfig::interval()));
    let transport: Arc<dyn DataInterface> = link.clone();
    let processor: Arc<dyn DataProcessor> = Arc::new(IntervalProcessor::new(
        transport.clone(),
        context.clock(),
        context.processor_config().clone(),
    ));
    let device = Device::new(transport, processor, interval::component::DETECTOR).unwrap();
    let id = context.attach(device, Default::default()).unwrap();

    context.begin_acquisition(id, 0, 0).unwrap();
    link.raise(ErrorCode::ReadFailed, "device unplugged");
    let seen = wait_for(&rx, &Event::Error(id, ErrorCode::ReadFailed));
    // The forced stop completes before the error is forwarded
    assert_eq!(seen, vec![Event::Complete(id), Event::Error(id, ErrorCode::ReadFailed)]);
    assert!(!context.is_acquiring(id).unwrap());
    assert!(!link.is_reading());
}
