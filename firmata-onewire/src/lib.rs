#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
//! # firmata-onewire
//! 1-Wire bus access through the OneWire SysEx extension of the Firmata
//! protocol.
//!
//! Firmata messages may only carry 7-bit clean bytes. The [`pack_8_to_7`] and
//! [`unpack_7_to_8`] functions convert data to and from that encoding, and
//! [`OneWireRequest`] frames one bus command (reset, select or skip, write,
//! read, delay) into a single request.
//!
//! With the `std` feature (default), [`OneWireSession`] turns the
//! asynchronous request/reply exchange into blocking calls: a request that
//! reads waits until the transport's reader hands the matching reply to
//! [`OneWireSession::deliver`].

extern crate alloc;

mod address;
mod consts;
mod error;
mod pack;
mod request;
#[cfg(feature = "std")]
mod session;
mod traits;
mod utils;
pub use address::OneWireAddress;
pub use consts::{DEFAULT_CORRELATION_ID, SYSEX_ONEWIRE};
pub use error::{OneWireError, ProtocolViolation};
pub use pack::{from_14bit, pack_8_to_7, to_14bit, to_21bit, unpack_7_to_8};
pub use request::{CommandFlags, OneWireRequest, OneWireSearchKind, PowerMode, ReadReply};
#[cfg(feature = "std")]
pub use session::{DEFAULT_REPLY_TIMEOUT, OneWireSession};
pub use traits::FirmataTransport;
pub use utils::{OneWireCrc, crc8, validate_scratchpad};

/// Error type for 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;
