use core::fmt;

use crate::OneWireCrc;

/// 64-bit ROM code identifying one device on a 1-Wire bus.
///
/// | Byte | Description |
/// |------|-------------|
/// | 0 | Family code (e.g., 0x28 for DS18B20) |
/// | 1-6 | Serial number |
/// | 7 | CRC-8 of bytes 0-6 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OneWireAddress([u8; 8]);

impl OneWireAddress {
    /// Wrap a ROM code.
    pub const fn new(rom: [u8; 8]) -> Self {
        Self(rom)
    }

    /// Family code of the device.
    #[inline]
    pub const fn family(&self) -> u8 {
        self.0[0]
    }

    /// The ROM code bytes, family code first.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Whether the last byte is the CRC of the first seven.
    pub fn crc_valid(&self) -> bool {
        OneWireCrc::validate(&self.0)
    }
}

impl From<[u8; 8]> for OneWireAddress {
    fn from(rom: [u8; 8]) -> Self {
        Self(rom)
    }
}

impl From<OneWireAddress> for [u8; 8] {
    fn from(addr: OneWireAddress) -> Self {
        addr.0
    }
}

impl From<u64> for OneWireAddress {
    fn from(rom: u64) -> Self {
        Self(rom.to_le_bytes())
    }
}

impl From<OneWireAddress> for u64 {
    fn from(addr: OneWireAddress) -> Self {
        u64::from_le_bytes(addr.0)
    }
}

impl fmt::Display for OneWireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
