//! Device-level configuration ids
//!
//! These are the setting numbers callers pass to the configuration
//! helpers. Both protocol families use the same numbering for the settings
//! they share.

/// Low level discriminator, in legacy units (shifted left 3 or 4 bits)
pub const SET_LLD: u8 = 0x01;
pub const SET_GAIN: u8 = 0x02;
/// Polarity on older devices, differential gain on newer ones
pub const SET_POLARITY: u8 = 0x03;
/// Detector bias (high voltage)
pub const SET_BIAS: u8 = 0x06;
/// Second bias on some devices, pulse width on others
pub const SET_BIAS2: u8 = 0x07;
/// Low level discriminator in channels
pub const SET_LLD_CHANNEL: u8 = 0x09;
pub const SET_DFU_MODE: u8 = 0x47;

pub const GET_SETTINGS: u8 = 0x05;
pub const GET_GAIN: u8 = 0x82;
pub const GET_POLARITY: u8 = 0x83;
pub const GET_BIAS: u8 = 0x86;
pub const GET_BIAS2: u8 = 0x87;
pub const GET_SERIAL: u8 = 0x88;
pub const GET_LLD_CHANNEL: u8 = 0x89;
pub const GET_VERSION: u8 = 0x8a;

/// Length of the serial number field
pub const SERIAL_LEN: usize = 50;
