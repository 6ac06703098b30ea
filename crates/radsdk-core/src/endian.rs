//! Wire byte order for multi-byte configuration values

/// Byte order a device uses for 16-bit fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Encode a 16-bit value in this byte order
    pub fn u16_to_bytes(self, value: u16) -> [u8; 2] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    /// Decode a 16-bit value in this byte order
    pub fn u16_from_bytes(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        }
    }
}

impl core::fmt::Display for Endian {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Endian::Little => f.write_str("little"),
            Endian::Big => f.write_str("big"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_byte_order() {
        assert_eq!(Endian::Little.u16_to_bytes(0x1234), [0x34, 0x12]);
        assert_eq!(Endian::Big.u16_to_bytes(0x1234), [0x12, 0x34]);
        assert_eq!(Endian::Big.u16_from_bytes([0x01, 0x90]), 400);
        assert_eq!(Endian::Little.u16_from_bytes([0x90, 0x01]), 400);
    }
}
