//! Command constants for the Firmata OneWire extension.

/// SysEx command byte carrying every OneWire request and reply.
pub const SYSEX_ONEWIRE: u8 = 0x73;

/// Search for all devices on the bus. The reply carries their ROM codes.
pub(crate) const ONEWIRE_SEARCH_REQUEST: u8 = 0x40;

/// Configure a pin as a 1-Wire bus endpoint.
pub(crate) const ONEWIRE_CONFIG_REQUEST: u8 = 0x41;

/// Reply to [`ONEWIRE_SEARCH_REQUEST`].
pub(crate) const ONEWIRE_SEARCH_REPLY: u8 = 0x42;

/// Reply to a command carrying the READ flag.
#[cfg_attr(not(feature = "std"), allow(dead_code))]
pub(crate) const ONEWIRE_READ_REPLY: u8 = 0x43;

/// Search only for devices whose alarm flag is set.
pub(crate) const ONEWIRE_SEARCH_ALARMS_REQUEST: u8 = 0x44;

/// Reply to [`ONEWIRE_SEARCH_ALARMS_REQUEST`].
pub(crate) const ONEWIRE_SEARCH_ALARMS_REPLY: u8 = 0x45;

/// Correlation id encoded for reads that do not pick their own.
///
/// A session starts each endpoint's id counter here, so the first such read
/// on an endpoint carries this value.
pub const DEFAULT_CORRELATION_ID: u16 = 0x1234;
