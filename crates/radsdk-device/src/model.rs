//! Recognised spectrometer models and per-detector properties

use core::fmt;

/// Kromek vendor id
pub const KROMEK_VENDOR_ID: u16 = 0x2A5A;
/// Vendor id used by older Kromek firmware
pub const OLD_KROMEK_VENDOR_ID: u16 = 0x04d8;

/// What a detector counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    Gamma,
    Neutron,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::Gamma => f.pad("gamma"),
            DetectorKind::Neutron => f.pad("neutron"),
        }
    }
}

/// Wire protocol family a model speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFamily {
    /// Length-prefixed records, gamma and neutron on one link
    D3,
    /// Fixed-size reports of single events
    Interval,
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolFamily::D3 => f.pad("d3"),
            ProtocolFamily::Interval => f.pad("interval"),
        }
    }
}

/// Static properties of one detector
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProperties {
    pub name: String,
    pub manufacturer: String,
    pub kind: DetectorKind,
    /// Seconds the detector is blind after each event
    pub dead_time: f64,
    /// Low level discriminator applied at power-up, in channels
    pub default_lld: u16,
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            name: "Unknown".into(),
            manufacturer: "Kromek".into(),
            kind: DetectorKind::Gamma,
            dead_time: 1.0e-5,
            default_lld: 32,
        }
    }
}

/// Identity of an attached device, as reported to callers
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: String,
    pub manufacturer: String,
    pub kind: DetectorKind,
}

/// A product the SDK knows how to drive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnownModel {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    pub protocol: ProtocolFamily,
    /// One entry per component, in component order
    pub detectors: &'static [(DetectorKind, f64, u16)],
}

impl KnownModel {
    /// Properties of the `index`th detector of this model
    pub fn properties(&self, index: usize) -> Option<DeviceProperties> {
        let &(kind, dead_time, default_lld) = self.detectors.get(index)?;
        let name = match (self.detectors.len(), kind) {
            (1, _) => self.name.to_string(),
            (_, DetectorKind::Gamma) => format!("{} Gamma", self.name),
            (_, DetectorKind::Neutron) => format!("{} Neutron", self.name),
        };
        Some(DeviceProperties {
            name,
            manufacturer: "Kromek".into(),
            kind,
            dead_time,
            default_lld,
        })
    }
}

const GAMMA_FAST: &[(DetectorKind, f64, u16)] = &[(DetectorKind::Gamma, 1.0e-5, 32)];
const SIGMA: &[(DetectorKind, f64, u16)] = &[(DetectorKind::Gamma, 5.813e-5, 80)];
const TN15: &[(DetectorKind, f64, u16)] = &[(DetectorKind::Neutron, 5.813e-5, 250)];
const D3_PAIR: &[(DetectorKind, f64, u16)] = &[
    (DetectorKind::Gamma, 5.813e-5, 80),
    (DetectorKind::Neutron, 5.813e-5, 250),
];

/// Every recognised model
pub const KNOWN_MODELS: &[KnownModel] = &[
    model("GR1", 0x0000, ProtocolFamily::Interval, GAMMA_FAST),
    model("GR1A", 0x0101, ProtocolFamily::Interval, GAMMA_FAST),
    model("GR05", 0x0050, ProtocolFamily::Interval, GAMMA_FAST),
    model("K102", 0x0011, ProtocolFamily::Interval, GAMMA_FAST),
    model("RadAngel", 0x0100, ProtocolFamily::Interval, &[(DetectorKind::Gamma, 1.0e-5, 402)]),
    model("SIGMA 25", 0x0022, ProtocolFamily::Interval, SIGMA),
    model("SIGMA 50", 0x0023, ProtocolFamily::Interval, SIGMA),
    model("TN15", 0x0030, ProtocolFamily::Interval, TN15),
    model("D3S", 0x01D3, ProtocolFamily::D3, D3_PAIR),
    KnownModel {
        name: "D3",
        vendor_id: 0x0483,
        product_id: 0x5740,
        protocol: ProtocolFamily::D3,
        detectors: D3_PAIR,
    },
];

const fn model(
    name: &'static str,
    product_id: u16,
    protocol: ProtocolFamily,
    detectors: &'static [(DetectorKind, f64, u16)],
) -> KnownModel {
    KnownModel {
        name,
        vendor_id: KROMEK_VENDOR_ID,
        product_id,
        protocol,
        detectors,
    }
}

/// Look up a model by USB ids
///
/// Kromek products answer to both the current and the old vendor id.
pub fn known_model(vendor_id: u16, product_id: u16) -> Option<&'static KnownModel> {
    let vendor_id = if vendor_id == OLD_KROMEK_VENDOR_ID {
        KROMEK_VENDOR_ID
    } else {
        vendor_id
    };
    KNOWN_MODELS
        .iter()
        .find(|m| m.vendor_id == vendor_id && m.product_id == product_id)
}

/// Shift applied to a channel LLD when only the legacy SET_LLD report works
///
/// SIGMA 25 (0x022), SIGMA 50 (0x023) and TN15 (0x030) use 3, every
/// other product 4.
pub fn legacy_lld_shift(product_id: u16) -> u32 {
    match product_id {
        0x0022 | 0x0023 | 0x0030 => 3,
        _ => 4,
    }
}
