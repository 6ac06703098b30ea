//! Interval count wire format
//!
//! Reports carry no length field. The first byte is the report id and the
//! size of each report type is fixed, so the id alone says how many bytes
//! to wait for. 16-bit values are big endian.

/// Size of the interval count report, the largest report
pub const REPORT_LEN: usize = 63;
/// Report id of interval count data
pub const DATA_REPORT: u8 = 0x04;
/// Two-byte count slots in one data report
pub const SLOT_COUNT: usize = (REPORT_LEN - 1) / 2;
/// Length of the serial number field
pub const SERIAL_LEN: usize = 50;

/// Component ids
pub mod component {
    /// The single detector
    pub const DETECTOR: u8 = 0x00;
    /// Pseudo component that keeps the link up for configuration queries
    pub const CONFIGURATION: u8 = 0x01;
}

/// Configuration report ids
pub mod setting {
    pub const SET_LLD: u8 = 0x01;
    pub const SET_GAIN: u8 = 0x02;
    pub const SET_DIFF_GAIN: u8 = 0x03;
    pub const SET_BIAS: u8 = 0x06;
    /// Pulse width on some devices, second bias on others
    pub const SET_PULSE_WIDTH: u8 = 0x07;
    pub const SET_LLD_CHANNEL: u8 = 0x09;
    pub const SET_DFU_MODE: u8 = 0x47;
    pub const GET_SETTINGS: u8 = 0x05;
    pub const GET_GAIN: u8 = 0x82;
    pub const GET_DIFF_GAIN: u8 = 0x83;
    pub const GET_BIAS: u8 = 0x86;
    /// Pulse width (1 byte) or second bias (2 bytes)
    pub const GET_PULSE_WIDTH: u8 = 0x87;
    pub const GET_SERIAL: u8 = 0x88;
    pub const GET_LLD_CHANNEL: u8 = 0x89;
    pub const GET_VERSION: u8 = 0x8a;
}

/// Total size of a report given its id, or 0 for ids this link never sends
pub fn report_len(report_id: u8) -> usize {
    match report_id {
        DATA_REPORT => REPORT_LEN,
        setting::GET_LLD_CHANNEL | setting::GET_PULSE_WIDTH | setting::GET_VERSION => 3,
        setting::GET_GAIN | setting::GET_DIFF_GAIN | setting::GET_BIAS => 2,
        setting::GET_SETTINGS => 5,
        setting::GET_SERIAL => SERIAL_LEN + 1,
        _ => 0,
    }
}

/// True for report ids that answer a configuration query
pub fn is_configuration_response(report_id: u8) -> bool {
    report_id != DATA_REPORT && report_len(report_id) != 0
}

/// One interval count data report
#[derive(Debug, Clone, Copy)]
pub struct IntervalCounts<'a> {
    slots: &'a [u8],
}

impl<'a> IntervalCounts<'a> {
    /// Decode a data report; `None` if it is not one or is short
    pub fn decode(report: &'a [u8]) -> Option<Self> {
        if report.len() < REPORT_LEN || report[0] != DATA_REPORT {
            return None;
        }
        Some(Self {
            slots: &report[1..REPORT_LEN],
        })
    }

    /// Channel of every valid slot, stopping at the first empty one
    ///
    /// A slot is valid when its low bit is set; the channel is the top 12
    /// bits of the 16-bit value.
    pub fn channels(&self) -> impl Iterator<Item = u16> + 'a {
        let slots: &'a [u8] = self.slots;
        slots
            .chunks_exact(2)
            .map(|s| u16::from_be_bytes([s[0], s[1]]))
            .take_while(|v| v & 1 == 1)
            .map(|v| v >> 4)
    }
}

/// Build a data report holding one event per channel (emulators and tests)
///
/// At most [`SLOT_COUNT`] channels fit; the rest are ignored.
pub fn encode_counts(channels: &[u16]) -> [u8; REPORT_LEN] {
    let mut report = [0u8; REPORT_LEN];
    report[0] = DATA_REPORT;
    for (slot, &channel) in report[1..].chunks_exact_mut(2).zip(channels) {
        let value = ((channel & 0x0FFF) << 4) | 1;
        slot.copy_from_slice(&value.to_be_bytes());
    }
    report
}

/// Request for `setting` expecting `len` payload bytes back
pub fn encode_get_request(setting: u8, len: usize) -> Vec<u8> {
    let mut request_len = len + 1;
    // 0x87 is both a 1-byte pulse width and a 2-byte bias; the device
    // sizes its answer from the request, so pad to the 2-byte form
    if setting == setting::GET_PULSE_WIDTH && len == 1 {
        request_len += 1;
    }
    let mut request = vec![0u8; request_len];
    request[0] = setting;
    request
}

/// Request writing `data` to `setting`
pub fn encode_set_request(setting: u8, data: &[u8]) -> Vec<u8> {
    let mut request = Vec::with_capacity(data.len() + 1);
    request.push(setting);
    request.extend_from_slice(data);
    request
}

/// Response report for `setting` carrying `data`, padded or cut to the
/// table size (emulators and tests)
pub fn encode_response(setting: u8, data: &[u8]) -> Vec<u8> {
    let len = report_len(setting).max(1);
    let mut response = vec![0u8; len];
    response[0] = setting;
    let n = data.len().min(len - 1);
    response[1..1 + n].copy_from_slice(&data[..n]);
    response
}
