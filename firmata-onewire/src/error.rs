use core::fmt;

/// Firmata OneWire communication error type.
#[derive(Debug)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying transport.
    Transport(E),
    /// The endpoint pin was never configured as a 1-Wire bus.
    BusUninitialized,
    /// A scratchpad failed its CRC check.
    CrcMismatch {
        /// CRC byte received from the device.
        received: u8,
        /// CRC computed over the received data bytes.
        computed: u8,
        /// The scratchpad as received.
        scratchpad: [u8; 9],
    },
    /// An argument was rejected before any bus traffic took place.
    InvalidArgument(&'static str),
    /// A reply did not have the shape the request called for.
    Protocol(ProtocolViolation),
    /// No reply arrived within the session's reply timeout.
    Timeout,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Transport(other)
    }
}

impl<E: fmt::Debug> fmt::Display for OneWireError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e:?}"),
            Self::BusUninitialized => write!(f, "1-Wire bus endpoint not configured"),
            Self::CrcMismatch {
                received,
                computed,
                scratchpad,
            } => write!(
                f,
                "crc mismatch: received 0x{received:02x}, calculated 0x{computed:02x} {scratchpad:02x?}"
            ),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Protocol(v) => write!(f, "protocol violation: {v}"),
            Self::Timeout => write!(f, "timed out waiting for reply"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for OneWireError<E> {}

/// Replies that cannot be matched to, or do not fit, the request waiting
/// for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// The message is too short to carry a reply subcommand and pin.
    Truncated,
    /// The reply subcommand is not a OneWire reply.
    UnknownReply(u8),
    /// A reply arrived for a pin with no request waiting for it.
    Unsolicited {
        /// Endpoint pin named by the reply.
        pin: u8,
    },
    /// The reply subcommand does not answer the pending request.
    UnexpectedReply {
        /// Reply subcommand the waiting request called for.
        expected: u8,
        /// Reply subcommand received.
        received: u8,
    },
    /// A read reply echoed a different correlation id.
    CorrelationMismatch {
        /// Correlation id sent with the request.
        expected: u16,
        /// Correlation id echoed by the firmware.
        received: u16,
    },
    /// A read reply carried fewer bytes than requested.
    ShortReply {
        /// Minimum number of unpacked bytes required.
        expected: usize,
        /// Number of unpacked bytes received.
        actual: usize,
    },
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated reply"),
            Self::UnknownReply(cmd) => write!(f, "unknown reply subcommand 0x{cmd:02x}"),
            Self::Unsolicited { pin } => write!(f, "unsolicited reply on pin {pin}"),
            Self::UnexpectedReply { expected, received } => write!(
                f,
                "expected reply 0x{expected:02x}, received 0x{received:02x}"
            ),
            Self::CorrelationMismatch { expected, received } => write!(
                f,
                "correlation id mismatch: expected 0x{expected:04x}, received 0x{received:04x}"
            ),
            Self::ShortReply { expected, actual } => {
                write!(f, "reply too short: expected {expected} bytes, got {actual}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProtocolViolation {}
