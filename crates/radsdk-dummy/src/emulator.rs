//! Emulated devices behind a [`LoopbackInterface`](crate::LoopbackInterface)

use std::collections::{HashMap, VecDeque};

use radsdk_d3::protocol::{self as d3, component, report, Header};
use radsdk_interval::protocol::{self as interval, setting};

/// Device-side behavior of a link
pub trait Emulator: Send {
    /// Answer one request, or `None` if the device stays silent
    fn respond(&mut self, request: &[u8]) -> Option<Vec<u8>>;

    /// Output the device sends without being asked
    fn poll(&mut self) -> Option<Vec<u8>> {
        None
    }
}

/// A D3S: answers settings queries and spectrum requests
#[derive(Debug, Clone)]
pub struct D3Emulator {
    settings: HashMap<(u8, u8), Vec<u8>>,
    channels: Vec<u16>,
    neutron: u16,
    elapsed_ms: u32,
    sequence: u8,
}

impl Default for D3Emulator {
    fn default() -> Self {
        Self::new()
    }
}

impl D3Emulator {
    pub fn new() -> Self {
        let mut settings = HashMap::new();
        let mut serial = b"D3S-EMU-0001".to_vec();
        serial.resize(d3::SERIAL_LEN, 0);
        for c in [component::GAMMA, component::NEUTRON, component::INTERFACE_BOARD] {
            settings.insert((c, report::GET_SERIAL), serial.clone());
            settings.insert((c, report::GET_VERSION), 0x0102u16.to_le_bytes().to_vec());
        }
        settings.insert((component::GAMMA, report::GET_GAIN), vec![0x10]);
        settings.insert((component::GAMMA, report::GET_LLD), 32u16.to_le_bytes().to_vec());
        Self {
            settings,
            channels: vec![0; d3::SPECTRUM_CHANNELS],
            neutron: 0,
            elapsed_ms: 100,
            sequence: 0,
        }
    }

    /// Elapsed time claimed by every spectrum record
    pub fn set_elapsed_ms(&mut self, ms: u32) {
        self.elapsed_ms = ms;
    }

    /// Add gamma counts to the next spectrum
    pub fn add_counts(&mut self, channel: usize, counts: u16) {
        if let Some(c) = self.channels.get_mut(channel) {
            *c = c.saturating_add(counts);
        }
    }

    /// Add neutron counts to the next spectrum
    pub fn add_neutrons(&mut self, counts: u16) {
        self.neutron = self.neutron.saturating_add(counts);
    }

    /// Stored value of a setting
    pub fn setting(&self, component: u8, get_report: u8) -> Option<&[u8]> {
        self.settings.get(&(component, get_report)).map(Vec::as_slice)
    }

    fn spectrum(&mut self) -> Vec<u8> {
        let record =
            d3::encode_spectrum(self.sequence, self.elapsed_ms, self.neutron, &self.channels);
        self.sequence = self.sequence.wrapping_add(1);
        self.channels.fill(0);
        self.neutron = 0;
        record
    }
}

impl Emulator for D3Emulator {
    fn respond(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let header = Header::decode(request).ok()?;
        match header.report {
            report::GET_16BIT_SPECTRUM => Some(self.spectrum()),
            id if d3::is_configuration_response(id) => {
                let data = self.settings.get(&(header.component, id))?;
                Some(d3::encode_response(header.component, id, data))
            }
            // Set requests share the low bits of their get counterparts
            id @ (report::SET_GAIN | report::SET_BIAS | report::SET_SERIAL | report::SET_LLD) => {
                let data = d3::payload(request).ok()?.to_vec();
                self.settings.insert((header.component, id | 0x80), data);
                None
            }
            _ => None,
        }
    }
}

/// An interval count device: answers settings queries and streams events
#[derive(Debug, Clone)]
pub struct IntervalEmulator {
    settings: HashMap<u8, Vec<u8>>,
    events: VecDeque<u16>,
}

impl Default for IntervalEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalEmulator {
    pub fn new() -> Self {
        let mut settings = HashMap::new();
        let mut serial = b"GR1-EMU-0001".to_vec();
        serial.resize(interval::SERIAL_LEN, 0);
        settings.insert(setting::GET_SERIAL, serial);
        settings.insert(setting::GET_VERSION, 0x0203u16.to_be_bytes().to_vec());
        settings.insert(setting::GET_GAIN, vec![0x08]);
        settings.insert(setting::GET_LLD_CHANNEL, 20u16.to_be_bytes().to_vec());
        Self {
            settings,
            events: VecDeque::new(),
        }
    }

    /// Queue single events to be streamed by [`Emulator::poll`]
    pub fn queue_events(&mut self, channels: &[u16]) {
        self.events.extend(channels);
    }

    pub fn setting(&self, get_report: u8) -> Option<&[u8]> {
        self.settings.get(&get_report).map(Vec::as_slice)
    }
}

impl Emulator for IntervalEmulator {
    fn respond(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let (&id, data) = request.split_first()?;
        if interval::is_configuration_response(id) {
            let value = self.settings.get(&id)?;
            return Some(interval::encode_response(id, value));
        }
        // Writes land on the matching read-back report, if the device has one
        let readback = id | 0x80;
        if id & 0x80 == 0 && interval::is_configuration_response(readback) {
            self.settings.insert(readback, data.to_vec());
        }
        None
    }

    fn poll(&mut self) -> Option<Vec<u8>> {
        if self.events.is_empty() {
            return None;
        }
        let n = self.events.len().min(interval::SLOT_COUNT);
        let batch: Vec<u16> = self.events.drain(..n).collect();
        Some(interval::encode_counts(&batch).to_vec())
    }
}
