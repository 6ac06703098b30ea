//! D3 wire format
//!
//! Every record, in both directions, is
//! `[u16 size][u8 sequence][u8 component][u8 report][payload][u16 crc]`
//! with little-endian fields. `size` counts the whole record. The crc is
//! sent as zero and not checked on receipt.

use crate::error::{ProtocolError, Result};

/// Bytes before the payload
pub const HEADER_LEN: usize = 5;
/// Bytes after the payload
pub const CRC_LEN: usize = 2;
/// Channels in a gamma spectrum
pub const SPECTRUM_CHANNELS: usize = 4096;
/// Size of the spectrum record, the largest the device sends
pub const MAX_REPORT_LEN: usize = HEADER_LEN + 4 + 2 + SPECTRUM_CHANNELS * 2 + CRC_LEN;
/// Length of the text field in an internal error record
pub const ERROR_TEXT_LEN: usize = 50;
/// Length of the serial number field
pub const SERIAL_LEN: usize = 50;

/// Component ids
pub mod component {
    /// Gamma detector
    pub const GAMMA: u8 = 0x01;
    /// Neutron detector
    pub const NEUTRON: u8 = 0x02;
    /// Interface board (spectrum requests, firmware update)
    pub const INTERFACE_BOARD: u8 = 0x07;
    /// Pseudo component that keeps the link up for configuration queries
    pub const CONFIGURATION: u8 = 0x0a;
}

/// Report ids
pub mod report {
    /// Set gain (u8)
    pub const SET_GAIN: u8 = 0x02;
    /// Set bias (u16)
    pub const SET_BIAS: u8 = 0x07;
    /// Set serial number
    pub const SET_SERIAL: u8 = 0x08;
    /// Set lower level discriminator (u16)
    pub const SET_LLD: u8 = 0x09;
    /// Set OTG mode (u8)
    pub const SET_OTG: u8 = 0x46;
    /// Enter firmware update mode; always addressed to the interface board
    pub const SET_DFU: u8 = 0x47;
    /// Get gain
    pub const GET_GAIN: u8 = 0x82;
    /// Get bias
    pub const GET_BIAS: u8 = 0x87;
    /// Get serial number
    pub const GET_SERIAL: u8 = 0x88;
    /// Get lower level discriminator
    pub const GET_LLD: u8 = 0x89;
    /// Get firmware version
    pub const GET_VERSION: u8 = 0x8a;
    /// Device-side error
    pub const INTERNAL_ERROR: u8 = 0xc0;
    /// 16-bit spectrum (request and response)
    pub const GET_16BIT_SPECTRUM: u8 = 0xc1;
    /// Start notification
    pub const START: u8 = 0xc4;
    /// Status query
    pub const GET_STATUS: u8 = 0xc5;
    /// Get OTG mode
    pub const GET_OTG: u8 = 0xc6;
}

/// True for report ids that answer a configuration query
pub fn is_configuration_response(report_id: u8) -> bool {
    matches!(
        report_id,
        report::GET_GAIN
            | report::GET_BIAS
            | report::GET_SERIAL
            | report::GET_LLD
            | report::GET_VERSION
            | report::GET_OTG
    )
}

/// Common record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub size: u16,
    pub sequence: u8,
    pub component: u8,
    pub report: u8,
}

impl Header {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                report: bytes.get(4).copied().unwrap_or(0),
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            size: u16::from_le_bytes([bytes[0], bytes[1]]),
            sequence: bytes[2],
            component: bytes[3],
            report: bytes[4],
        })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.size.to_le_bytes());
        out.push(self.sequence);
        out.push(self.component);
        out.push(self.report);
    }
}

/// Payload of a record: the bytes between the header and the crc
///
/// The header's size field bounds the record; trailing bytes past it are
/// ignored.
pub fn payload(record: &[u8]) -> Result<&[u8]> {
    let header = Header::decode(record)?;
    let size = header.size as usize;
    if size < HEADER_LEN + CRC_LEN || size > record.len() {
        return Err(ProtocolError::SizeMismatch {
            declared: size,
            actual: record.len(),
        });
    }
    Ok(&record[HEADER_LEN..size - CRC_LEN])
}

/// A 16-bit spectrum record, decoded in place
#[derive(Debug, Clone, Copy)]
pub struct SpectrumReport<'a> {
    pub header: Header,
    /// Device time covered by this report, since the previous one
    pub elapsed_ms: u32,
    pub neutron_counts: u16,
    channels: &'a [u8],
}

impl<'a> SpectrumReport<'a> {
    pub fn decode(record: &'a [u8]) -> Result<Self> {
        let header = Header::decode(record)?;
        if header.report != report::GET_16BIT_SPECTRUM {
            return Err(ProtocolError::UnexpectedReport(header.report));
        }
        if record.len() < MAX_REPORT_LEN {
            return Err(ProtocolError::Truncated {
                report: header.report,
                expected: MAX_REPORT_LEN,
                actual: record.len(),
            });
        }
        let p = &record[HEADER_LEN..];
        Ok(Self {
            header,
            elapsed_ms: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
            neutron_counts: u16::from_le_bytes([p[4], p[5]]),
            channels: &p[6..6 + SPECTRUM_CHANNELS * 2],
        })
    }

    /// Count in one gamma channel
    pub fn channel(&self, index: usize) -> u16 {
        let i = index * 2;
        u16::from_le_bytes([self.channels[i], self.channels[i + 1]])
    }

    /// `(channel, count)` for every gamma channel, including empty ones
    pub fn channels(&self) -> impl Iterator<Item = (u16, u16)> + 'a {
        let channels: &'a [u8] = self.channels;
        channels
            .chunks_exact(2)
            .enumerate()
            .map(|(i, c)| (i as u16, u16::from_le_bytes([c[0], c[1]])))
    }

    /// Sum over every gamma channel
    pub fn total_gamma(&self) -> u64 {
        self.channels().map(|(_, c)| c as u64).sum()
    }
}

/// Build a spectrum record (emulators and tests)
pub fn encode_spectrum(
    sequence: u8,
    elapsed_ms: u32,
    neutron_counts: u16,
    channels: &[u16],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_REPORT_LEN);
    Header {
        size: MAX_REPORT_LEN as u16,
        sequence,
        component: component::INTERFACE_BOARD,
        report: report::GET_16BIT_SPECTRUM,
    }
    .encode(&mut out);
    out.extend_from_slice(&elapsed_ms.to_le_bytes());
    out.extend_from_slice(&neutron_counts.to_le_bytes());
    for i in 0..SPECTRUM_CHANNELS {
        let count = channels.get(i).copied().unwrap_or(0);
        out.extend_from_slice(&count.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    out
}

/// Device-side error report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalErrorReport {
    pub header: Header,
    pub error_id: u8,
    pub text: String,
}

impl InternalErrorReport {
    pub fn decode(record: &[u8]) -> Result<Self> {
        let header = Header::decode(record)?;
        if header.report != report::INTERNAL_ERROR {
            return Err(ProtocolError::UnexpectedReport(header.report));
        }
        let expected = HEADER_LEN + 1 + ERROR_TEXT_LEN + CRC_LEN;
        if record.len() < expected {
            return Err(ProtocolError::Truncated {
                report: header.report,
                expected,
                actual: record.len(),
            });
        }
        let text = &record[HEADER_LEN + 1..HEADER_LEN + 1 + ERROR_TEXT_LEN];
        Ok(Self {
            header,
            error_id: record[HEADER_LEN],
            text: c_string(text),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let size = HEADER_LEN + 1 + ERROR_TEXT_LEN + CRC_LEN;
        let mut out = Vec::with_capacity(size);
        Header {
            size: size as u16,
            ..self.header
        }
        .encode(&mut out);
        out.push(self.error_id);
        let mut text = [0u8; ERROR_TEXT_LEN];
        let n = self.text.len().min(ERROR_TEXT_LEN - 1);
        text[..n].copy_from_slice(&self.text.as_bytes()[..n]);
        out.extend_from_slice(&text);
        out.extend_from_slice(&[0, 0]);
        out
    }
}

/// Text up to the first NUL, lossily decoded
pub fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Record asking `component` for `setting`
pub fn encode_get_request(component: u8, setting: u8) -> [u8; HEADER_LEN + CRC_LEN] {
    let size = (HEADER_LEN + CRC_LEN) as u16;
    let [lo, hi] = size.to_le_bytes();
    [lo, hi, 0, component, setting, 0, 0]
}

/// Record setting `setting` on `component` to `data`
///
/// Firmware update requests are always routed to the interface board.
pub fn encode_set_request(component: u8, setting: u8, data: &[u8]) -> Result<Vec<u8>> {
    let size = HEADER_LEN + data.len() + CRC_LEN;
    if size > MAX_REPORT_LEN {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }
    let component = if setting == report::SET_DFU {
        component::INTERFACE_BOARD
    } else {
        component
    };
    let mut out = Vec::with_capacity(size);
    Header {
        size: size as u16,
        sequence: 0,
        component,
        report: setting,
    }
    .encode(&mut out);
    out.extend_from_slice(data);
    out.extend_from_slice(&[0, 0]);
    Ok(out)
}

/// Configuration response record carrying `data` (emulators and tests)
pub fn encode_response(component: u8, setting: u8, data: &[u8]) -> Vec<u8> {
    let size = HEADER_LEN + data.len() + CRC_LEN;
    let mut out = Vec::with_capacity(size);
    Header {
        size: size as u16,
        sequence: 0,
        component,
        report: setting,
    }
    .encode(&mut out);
    out.extend_from_slice(data);
    out.extend_from_slice(&[0, 0]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_report_len() {
        assert_eq!(MAX_REPORT_LEN, 8205);
    }

    #[test]
    fn test_get_request_layout() {
        let req = encode_get_request(component::GAMMA, report::GET_SERIAL);
        assert_eq!(req, [7, 0, 0, 0x01, 0x88, 0, 0]);
        let header = Header::decode(&req).unwrap();
        assert_eq!(header.size, 7);
        assert_eq!(header.report, report::GET_SERIAL);
    }

    #[test]
    fn test_set_request_dfu_goes_to_interface_board() {
        let req = encode_set_request(component::GAMMA, report::SET_DFU, &[1]).unwrap();
        assert_eq!(req, vec![8, 0, 0, 0x07, 0x47, 1, 0, 0]);
        let req = encode_set_request(component::NEUTRON, report::SET_LLD, &[0x20, 0x01]).unwrap();
        assert_eq!(req, vec![9, 0, 0, 0x02, 0x09, 0x20, 0x01, 0, 0]);
    }

    #[test]
    fn test_set_request_too_large() {
        let data = vec![0u8; MAX_REPORT_LEN];
        assert_eq!(
            encode_set_request(component::GAMMA, report::SET_SERIAL, &data),
            Err(ProtocolError::PayloadTooLarge(MAX_REPORT_LEN))
        );
    }

    #[test]
    fn test_spectrum_decode() {
        let mut channels = vec![0u16; SPECTRUM_CHANNELS];
        channels[10] = 3;
        channels[4095] = 0x1234;
        let record = encode_spectrum(9, 100, 7, &channels);
        assert_eq!(record.len(), MAX_REPORT_LEN);

        let report = SpectrumReport::decode(&record).unwrap();
        assert_eq!(report.header.sequence, 9);
        assert_eq!(report.elapsed_ms, 100);
        assert_eq!(report.neutron_counts, 7);
        assert_eq!(report.channel(10), 3);
        assert_eq!(report.channel(4095), 0x1234);
        assert_eq!(report.total_gamma(), 3 + 0x1234);
        let nonzero: Vec<_> = report.channels().filter(|(_, c)| *c > 0).collect();
        assert_eq!(nonzero, vec![(10, 3), (4095, 0x1234)]);
    }

    #[test]
    fn test_spectrum_decode_rejects_short_record() {
        let record = encode_spectrum(0, 1, 0, &[]);
        assert!(matches!(
            SpectrumReport::decode(&record[..100]),
            Err(ProtocolError::Truncated { .. })
        ));
        let other = encode_response(component::GAMMA, report::GET_GAIN, &[1]);
        assert_eq!(
            SpectrumReport::decode(&other).unwrap_err(),
            ProtocolError::UnexpectedReport(report::GET_GAIN)
        );
    }

    #[test]
    fn test_internal_error_text() {
        let header = Header {
            size: 0,
            sequence: 1,
            component: component::GAMMA,
            report: report::INTERNAL_ERROR,
        };
        let record = InternalErrorReport {
            header,
            error_id: 4,
            text: "HV fault".into(),
        }
        .encode();
        let decoded = InternalErrorReport::decode(&record).unwrap();
        assert_eq!(decoded.error_id, 4);
        assert_eq!(decoded.text, "HV fault");
        assert_eq!(decoded.header.size as usize, record.len());
    }

    #[test]
    fn test_payload_bounds() {
        let record = encode_response(component::GAMMA, report::GET_VERSION, &[0x34, 0x12]);
        assert_eq!(payload(&record).unwrap(), &[0x34, 0x12]);
        let mut bad = record.clone();
        bad[0] = 3;
        assert!(matches!(
            payload(&bad),
            Err(ProtocolError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_configuration_responses() {
        assert!(is_configuration_response(report::GET_SERIAL));
        assert!(is_configuration_response(report::GET_OTG));
        assert!(!is_configuration_response(report::GET_16BIT_SPECTRUM));
        assert!(!is_configuration_response(report::SET_LLD));
    }
}
