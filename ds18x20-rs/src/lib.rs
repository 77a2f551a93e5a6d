//! # ds18x20
//! Driver for the DS18S20, DS18B20 and DS1822 family of 1-Wire temperature
//! sensors, talking to the bus through a [`OneWireSession`].
use embedded_hal::delay::DelayNs;
use firmata_onewire::{
    FirmataTransport, OneWireAddress, OneWireError, OneWireRequest, OneWireResult,
    OneWireSession, ProtocolViolation, ReadReply, crc8, validate_scratchpad,
};
use fixed::types::I12F4;

const DS18X20_START_CONV: u8 = 0x44;
const DS18X20_READ_SCRATCH: u8 = 0xbe;
const DS18X20_WRITE_SCRATCH: u8 = 0x4e;

/// Family code of the DS18S20, which reports 9-bit readings plus a count
/// remaining register.
pub const DS18S20_FAMILY: u8 = 0x10;
/// Family code of the DS1822.
pub const DS1822_FAMILY: u8 = 0x22;
/// Family code of the DS18B20.
pub const DS18B20_FAMILY: u8 = 0x28;

/// Temperature in degrees Celsius, 1/16 degree steps.
pub type Temperature = I12F4;

/// Scratchpad length: 8 register bytes and their CRC.
pub const SCRATCHPAD_LEN: usize = 9;

/// Where the driver stands in a measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// A conversion was started and the scratchpad not read since.
    ConversionPending,
    /// The last scratchpad read passed its CRC check.
    ScratchpadValid,
}

/// A DS18x20 sensor on a Firmata 1-Wire bus.
#[derive(Debug)]
pub struct Ds18x20 {
    pin: u8,
    address: OneWireAddress,
    state: DeviceState,
    scratchpad: Option<[u8; SCRATCHPAD_LEN]>,
    temperature: Temperature,
    register_th: u8,
    register_tl: u8,
    config: u8,
}

impl Ds18x20 {
    /// A sensor with ROM code `address` on the bus configured on `pin`.
    pub fn new(pin: u8, address: OneWireAddress) -> Self {
        Self {
            pin,
            address,
            state: DeviceState::Idle,
            scratchpad: None,
            temperature: Temperature::ZERO,
            register_th: 0,
            register_tl: 0,
            config: 0,
        }
    }

    /// Pin of the bus the sensor is on.
    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// ROM code of the sensor.
    pub fn address(&self) -> &OneWireAddress {
        &self.address
    }

    /// Current measurement cycle state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Raw registers from the last good scratchpad read.
    pub fn scratchpad(&self) -> Option<&[u8; SCRATCHPAD_LEN]> {
        self.scratchpad.as_ref()
    }

    /// TH alarm register as of the last scratchpad read.
    pub fn register_th(&self) -> u8 {
        self.register_th
    }

    /// TL alarm register as of the last scratchpad read.
    pub fn register_tl(&self) -> u8 {
        self.register_tl
    }

    /// Configuration register as of the last scratchpad read.
    pub fn config_register(&self) -> u8 {
        self.config
    }

    /// Latest temperature reading in degrees Celsius.
    pub fn temperature(&self) -> f32 {
        self.temperature.to_num()
    }

    /// Latest temperature reading as the fixed-point register value.
    pub fn raw_temperature(&self) -> Temperature {
        self.temperature
    }

    /// Readout resolution in bits, decoded from the configuration register.
    pub fn resolution(&self) -> u8 {
        ((self.config >> 5) & 0x3) + 9
    }

    /// Start a temperature conversion.
    ///
    /// With `all` set the Convert T command is sent to this sensor through
    /// Match ROM; otherwise it is broadcast through Skip ROM and every
    /// sensor on the bus converts.
    pub fn convert<T: FirmataTransport>(
        &mut self,
        bus: &OneWireSession<T>,
        all: bool,
    ) -> OneWireResult<(), T::Error> {
        let req = OneWireRequest::new().reset();
        let req = if all {
            req.select(self.address)
        } else {
            req.skip()
        };
        bus.execute(self.pin, &req.write(&[DS18X20_START_CONV]))?;
        self.state = DeviceState::ConversionPending;
        Ok(())
    }

    /// Read the scratchpad and update the temperature and registers.
    ///
    /// Nothing is updated unless the scratchpad passes its CRC check.
    pub fn read_scratchpad<T: FirmataTransport>(
        &mut self,
        bus: &OneWireSession<T>,
    ) -> OneWireResult<(), T::Error> {
        let req = OneWireRequest::new()
            .reset()
            .select(self.address)
            .write(&[DS18X20_READ_SCRATCH])
            .read_default(SCRATCHPAD_LEN as u16);
        let reply = bus.execute(self.pin, &req)?.unwrap_or_default();
        let data = ReadReply::parse(&reply).map_err(OneWireError::Protocol)?.data;
        let scratchpad: [u8; SCRATCHPAD_LEN] = data
            .get(..SCRATCHPAD_LEN)
            .and_then(|d| d.try_into().ok())
            .ok_or(OneWireError::Protocol(ProtocolViolation::ShortReply {
                expected: SCRATCHPAD_LEN + 2,
                actual: reply.len(),
            }))?;
        if !validate_scratchpad(&scratchpad) {
            let received = scratchpad[SCRATCHPAD_LEN - 1];
            let computed = crc8(&scratchpad[..SCRATCHPAD_LEN - 1]);
            log::warn!(
                "crc mismatch from {} on pin {}: received 0x{received:02x}, calculated 0x{computed:02x} {scratchpad:02x?}",
                self.address,
                self.pin
            );
            return Err(OneWireError::CrcMismatch {
                received,
                computed,
                scratchpad,
            });
        }
        self.register_th = scratchpad[2];
        self.register_tl = scratchpad[3];
        self.config = scratchpad[4];
        self.temperature = self.parse_temperature(&scratchpad);
        self.scratchpad = Some(scratchpad);
        self.state = DeviceState::ScratchpadValid;
        Ok(())
    }

    /// Set the readout resolution, 9 to 12 bits.
    ///
    /// The alarm registers are written as zero along with the configuration.
    pub fn set_resolution<T: FirmataTransport>(
        &mut self,
        bus: &OneWireSession<T>,
        bits: u8,
    ) -> OneWireResult<(), T::Error> {
        let resolution = ReadoutResolution::try_from(bits)
            .map_err(|_| OneWireError::InvalidArgument("resolution must be between 9 and 12"))?;
        let req = OneWireRequest::new()
            .reset()
            .select(self.address)
            .write(&[DS18X20_WRITE_SCRATCH, 0x0, 0x0, resolution.config_bits()]);
        bus.execute(self.pin, &req)?;
        Ok(())
    }

    /// Convert, wait for the conversion to finish, then read the result.
    pub fn measure<T: FirmataTransport, D: DelayNs>(
        &mut self,
        bus: &OneWireSession<T>,
        delay: &mut D,
    ) -> OneWireResult<f32, T::Error> {
        self.convert(bus, true)?;
        // power-on resolution until the configuration register has been read
        let resolution = match self.scratchpad {
            Some(_) => ReadoutResolution::try_from(self.resolution()).unwrap_or_default(),
            None => ReadoutResolution::default(),
        };
        delay.delay_us(resolution.delay_us());
        self.read_scratchpad(bus)?;
        Ok(self.temperature())
    }

    fn parse_temperature(&self, scratchpad: &[u8; SCRATCHPAD_LEN]) -> Temperature {
        let mut raw = u16::from_le_bytes([scratchpad[0], scratchpad[1]]);
        if self.address.family() == DS18S20_FAMILY {
            // 9-bit reading extended with the count remaining register
            raw = (raw << 3) & 0xfff0;
            raw = raw.wrapping_add(12).wrapping_sub(scratchpad[6] as u16);
        } else {
            // Zero out bits that are undefined at lower resolutions.
            match self.resolution() {
                9 => raw &= 0xfff8,
                10 => raw &= 0xfffc,
                11 => raw &= 0xfffe,
                _ => {}
            }
        }
        Temperature::from_bits(raw as i16)
    }
}

/// Readout resolution of DS18B20 and DS1822 sensors.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ReadoutResolution {
    /// 0.5 °C steps.
    Resolution9bit = 9,
    /// 0.25 °C steps.
    Resolution10bit = 10,
    /// 0.125 °C steps.
    Resolution11bit = 11,
    /// 0.0625 °C steps.
    #[default]
    Resolution12bit = 12,
}

impl ReadoutResolution {
    /// Maximum conversion time in microseconds.
    pub fn delay_us(&self) -> u32 {
        use ReadoutResolution::*;
        match self {
            Resolution9bit => 93750,
            Resolution10bit => 187500,
            Resolution11bit => 375000,
            Resolution12bit => 750000,
        }
    }

    /// Configuration byte written by [`Ds18x20::set_resolution`].
    pub fn config_bits(&self) -> u8 {
        (*self as u8 - 9) << 6
    }
}

impl TryFrom<u8> for ReadoutResolution {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ReadoutResolution::*;
        match value {
            9 => Ok(Resolution9bit),
            10 => Ok(Resolution10bit),
            11 => Ok(Resolution11bit),
            12 => Ok(Resolution12bit),
            _ => Err("Invalid readout resolution"),
        }
    }
}
