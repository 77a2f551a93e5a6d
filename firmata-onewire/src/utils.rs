#[derive(Debug, Default)]
/// Calculate CRC-8 used in 1-Wire communications.
///
/// Dallas/Maxim polynomial `0x8c` (reflected `x^8 + x^5 + x^4 + 1`), bits
/// processed least significant first.
pub struct OneWireCrc(u8);

/// One byte worth of bit-serial CRC shifts.
const fn crc_step(mut crc: u8) -> u8 {
    let mut bit = 0;
    while bit < 8 {
        crc = if crc & 0x1 == 0x1 {
            (crc >> 1) ^ 0x8c
        } else {
            crc >> 1
        };
        bit += 1;
    }
    crc
}

#[cfg(feature = "crc-table")]
const CRC_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut idx = 0;
    while idx < 256 {
        table[idx] = crc_step(idx as u8);
        idx += 1;
    }
    table
};

impl OneWireCrc {
    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Update the CRC with the incoming byte.
    pub fn update(&mut self, byte: u8) {
        #[cfg(feature = "crc-table")]
        {
            self.0 = CRC_TABLE[(self.0 ^ byte) as usize];
        }
        #[cfg(not(feature = "crc-table"))]
        {
            self.0 = crc_step(self.0 ^ byte);
        }
    }

    /// Compute the CRC of a whole sequence.
    pub fn compute(sequence: &[u8]) -> u8 {
        let mut crc = OneWireCrc::default();
        for &byte in sequence {
            crc.update(byte);
        }
        crc.value()
    }

    /// Validate a sequence of bytes where the last byte is the 1-Wire CRC of
    /// the previous bytes. An empty sequence is never valid.
    pub fn validate(sequence: &[u8]) -> bool {
        match sequence.split_last() {
            Some((&crc, data)) => Self::compute(data) == crc,
            None => false,
        }
    }
}

/// Compute the 1-Wire CRC-8 of `data`.
#[inline]
pub fn crc8(data: &[u8]) -> u8 {
    OneWireCrc::compute(data)
}

/// Check that the last byte of a scratchpad is the CRC-8 of the bytes
/// before it.
#[inline]
pub fn validate_scratchpad(scratchpad: &[u8]) -> bool {
    OneWireCrc::validate(scratchpad)
}
