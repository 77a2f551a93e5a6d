use alloc::vec::Vec;
use bitfield_struct::bitfield;

use crate::{
    OneWireAddress, ProtocolViolation,
    consts::{
        DEFAULT_CORRELATION_ID, ONEWIRE_CONFIG_REQUEST, ONEWIRE_SEARCH_ALARMS_REPLY,
        ONEWIRE_SEARCH_ALARMS_REQUEST, ONEWIRE_SEARCH_REPLY, ONEWIRE_SEARCH_REQUEST,
    },
    pack::{pack_8_to_7, to_14bit},
};

#[bitfield(u8)]
#[derive(PartialEq, Eq)]
/// # Command flags
///
/// First byte of a OneWire command request. Each bit enables one step the
/// firmware performs, in this order: reset, skip or select, write, read,
/// delay. Several steps are combined in a single request.
pub struct CommandFlags {
    /// Issue a bus reset pulse.
    pub reset: bool,
    /// Address every device on the bus (Skip ROM).
    pub skip: bool,
    /// Address the device given in the request (Match ROM).
    pub select: bool,
    /// Read bytes back and reply with them.
    pub read: bool,
    /// Wait before finishing the command.
    pub delay: bool,
    /// Write the request payload to the bus.
    pub write: bool,
    #[bits(2)]
    __: u8,
}

/// A single OneWire bus command.
///
/// Each builder method sets its flag together with the data the flag needs,
/// so a request never carries a flag without its field.
///
/// ```text
/// OneWireRequest::new().reset().select(addr).write(&[0xbe]).read(9, 0x1234)
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OneWireRequest {
    command: CommandFlags,
    address: OneWireAddress,
    read_count: u16,
    /// `None` leaves the id to the session.
    correlation_id: Option<u16>,
    delay_ms: u32,
    data: Vec<u8>,
}

impl OneWireRequest {
    /// An empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the bus first.
    pub fn reset(mut self) -> Self {
        self.command.set_reset(true);
        self
    }

    /// Address every device on the bus.
    pub fn skip(mut self) -> Self {
        self.command.set_skip(true);
        self
    }

    /// Address a single device.
    pub fn select(mut self, address: OneWireAddress) -> Self {
        self.command.set_select(true);
        self.address = address;
        self
    }

    /// Read `count` bytes and have the reply tagged with `correlation_id`.
    pub fn read(mut self, count: u16, correlation_id: u16) -> Self {
        self.command.set_read(true);
        self.read_count = count;
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Read `count` bytes, leaving the correlation id to the session.
    ///
    /// [`OneWireSession::execute`](crate::OneWireSession::execute) tags each
    /// such request with a fresh id from the endpoint's counter. Encoded on
    /// its own, the request carries [`DEFAULT_CORRELATION_ID`].
    pub fn read_default(mut self, count: u16) -> Self {
        self.command.set_read(true);
        self.read_count = count;
        self.correlation_id = None;
        self
    }

    /// Wait `ms` milliseconds on the firmware side.
    pub fn delay(mut self, ms: u32) -> Self {
        self.command.set_delay(true);
        self.delay_ms = ms;
        self
    }

    /// Write `data` to the bus.
    pub fn write(mut self, data: &[u8]) -> Self {
        self.command.set_write(true);
        self.data = data.to_vec();
        self
    }

    /// Flags set on this request.
    pub fn command(&self) -> CommandFlags {
        self.command
    }

    /// Device addressed by this request, if it selects one.
    pub fn address(&self) -> Option<&OneWireAddress> {
        self.command.select().then_some(&self.address)
    }

    /// Correlation id, if this request reads.
    pub fn correlation_id(&self) -> Option<u16> {
        self.command
            .read()
            .then(|| self.correlation_id.unwrap_or(DEFAULT_CORRELATION_ID))
    }

    /// Whether this request reads and leaves its correlation id to the
    /// session.
    pub fn assigns_correlation_id(&self) -> bool {
        self.command.read() && self.correlation_id.is_none()
    }

    /// Number of bytes read, if this request reads.
    pub fn read_count(&self) -> Option<u16> {
        self.command.read().then_some(self.read_count)
    }

    /// Payload written, if this request writes.
    pub fn data(&self) -> Option<&[u8]> {
        self.command.write().then_some(self.data.as_slice())
    }

    /// Encode the request fields to 7-bit data ready to send on the wire.
    ///
    /// Fields are concatenated as address, read count and correlation id,
    /// delay, then payload. Multi-byte fields are little-endian. Fields whose
    /// flag is clear contribute nothing.
    pub fn encode(&self) -> Vec<u8> {
        let mut d = Vec::with_capacity(8 + 4 + 4 + self.data.len());
        if self.command.select() {
            d.extend_from_slice(self.address.as_bytes());
        }
        if self.command.read() {
            d.extend_from_slice(&self.read_count.to_le_bytes());
            d.extend_from_slice(
                &self
                    .correlation_id
                    .unwrap_or(DEFAULT_CORRELATION_ID)
                    .to_le_bytes(),
            );
        }
        if self.command.delay() {
            d.extend_from_slice(&self.delay_ms.to_le_bytes());
        }
        if self.command.write() {
            d.extend_from_slice(&self.data);
        }
        pack_8_to_7(&d)
    }

    /// Complete SysEx body for the endpoint on `pin`: flags, pin, then the
    /// encoded fields.
    pub fn frame(&self, pin: u8) -> Vec<u8> {
        let encoded = self.encode();
        let mut frame = Vec::with_capacity(2 + encoded.len());
        frame.push(self.command.into_bits());
        frame.push(pin);
        frame.extend_from_slice(&encoded);
        frame
    }
}

/// Unpacked body of a read reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReply<'a> {
    /// Correlation id echoed from the request.
    pub correlation_id: u16,
    /// Bytes read from the bus.
    pub data: &'a [u8],
}

impl<'a> ReadReply<'a> {
    /// Split an unpacked read reply into its correlation id and data.
    pub fn parse(unpacked: &'a [u8]) -> Result<Self, ProtocolViolation> {
        match unpacked {
            [lo, hi, data @ ..] => Ok(Self {
                correlation_id: u16::from_le_bytes([*lo, *hi]),
                data,
            }),
            _ => Err(ProtocolViolation::ShortReply {
                expected: 2,
                actual: unpacked.len(),
            }),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Type of search performed with [`OneWireSession::search`](crate::OneWireSession::search).
pub enum OneWireSearchKind {
    /// Normal search
    Normal = ONEWIRE_SEARCH_REQUEST,
    /// Search only for devices with alarm
    Alarmed = ONEWIRE_SEARCH_ALARMS_REQUEST,
}

impl OneWireSearchKind {
    /// Reply subcommand answering this search.
    pub const fn reply(self) -> u8 {
        match self {
            Self::Normal => ONEWIRE_SEARCH_REPLY,
            Self::Alarmed => ONEWIRE_SEARCH_ALARMS_REPLY,
        }
    }

    /// SysEx body requesting this search on `pin`.
    pub fn frame(self, pin: u8) -> Vec<u8> {
        alloc::vec![self as u8, pin]
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// How devices on the bus are powered.
pub enum PowerMode {
    /// Devices have their own supply.
    #[default]
    Normal = 0,
    /// Devices draw power from the data line.
    Parasitic = 1,
}

impl PowerMode {
    /// SysEx body configuring `pin` as a 1-Wire bus in this power mode.
    pub fn config_frame(self, pin: u8) -> Vec<u8> {
        alloc::vec![
            ONEWIRE_CONFIG_REQUEST,
            to_14bit(pin)[0],
            to_14bit(self as u8)[0]
        ]
    }
}
