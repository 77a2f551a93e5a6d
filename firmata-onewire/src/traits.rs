/// Outbound half of a Firmata connection.
///
/// The OneWire layer only needs to send SysEx messages. Inbound OneWire
/// replies are handed back through
/// [`OneWireSession::deliver`](crate::OneWireSession::deliver) by whoever
/// reads the connection.
pub trait FirmataTransport {
    /// The error type returned when a message cannot be sent.
    type Error;

    /// Sends a SysEx message.
    ///
    /// # Arguments
    /// * `command` - The SysEx command byte, [`SYSEX_ONEWIRE`](crate::SYSEX_ONEWIRE) for this crate.
    /// * `payload` - The 7-bit clean message body, without the SysEx start and end bytes.
    ///
    /// # Errors
    /// This method returns an error if the message could not be written.
    fn send_sysex(&mut self, command: u8, payload: &[u8]) -> Result<(), Self::Error>;
}

impl<T: FirmataTransport + ?Sized> FirmataTransport for &mut T {
    type Error = T::Error;

    fn send_sysex(&mut self, command: u8, payload: &[u8]) -> Result<(), Self::Error> {
        (**self).send_sysex(command, payload)
    }
}
