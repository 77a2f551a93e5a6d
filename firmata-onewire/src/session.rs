use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU16, Ordering},
    },
    time::Duration,
};

use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::{
    DEFAULT_CORRELATION_ID, FirmataTransport, OneWireAddress, OneWireError, OneWireRequest, OneWireResult,
    OneWireSearchKind, PowerMode, ProtocolViolation, ReadReply,
    consts::{
        ONEWIRE_READ_REPLY, ONEWIRE_SEARCH_ALARMS_REPLY, ONEWIRE_SEARCH_REPLY, SYSEX_ONEWIRE,
    },
    unpack_7_to_8,
};

/// Reply timeout used by [`OneWireSession::new`].
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// A request waiting for its reply.
struct Waiter {
    reply: u8,
    tx: Sender<(u8, Vec<u8>)>,
}

/// State of one configured bus endpoint.
struct Endpoint {
    /// Held for the whole of a reply-expecting exchange.
    exchange: Mutex<()>,
    waiter: Mutex<Option<Waiter>>,
    /// Correlation id handed to the next read that leaves it to the session.
    next_id: AtomicU16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            exchange: Mutex::new(()),
            waiter: Mutex::new(None),
            next_id: AtomicU16::new(DEFAULT_CORRELATION_ID),
        }
    }
}

impl Endpoint {
    fn release(&self) {
        self.waiter.lock().take();
    }

    fn next_correlation_id(&self) -> u16 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Synchronous request/response access to 1-Wire buses behind a Firmata
/// transport.
///
/// Requests go out through the transport. Replies come back when the
/// transport's reader calls [`deliver`](Self::deliver), usually from another
/// thread, so the session is meant to be shared through an [`Arc`].
///
/// Each configured pin has one delivery slot. Reply-expecting calls on the
/// same pin are serialized; calls on different pins do not block each other.
pub struct OneWireSession<T> {
    transport: Mutex<T>,
    endpoints: Mutex<BTreeMap<u8, Arc<Endpoint>>>,
    timeout: Option<Duration>,
}

impl<T: FirmataTransport> OneWireSession<T> {
    /// Creates a new session sending through `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
            endpoints: Mutex::new(BTreeMap::new()),
            timeout: Some(DEFAULT_REPLY_TIMEOUT),
        }
    }

    /// Set how long a call waits for its reply before failing with
    /// [`OneWireError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for replies indefinitely.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Configure `pin` as a 1-Wire bus endpoint.
    ///
    /// Allocates the pin's delivery slot, if it has none yet, and sends the
    /// configuration request. No reply is expected.
    pub fn configure(&self, pin: u8, power: PowerMode) -> OneWireResult<(), T::Error> {
        self.endpoints.lock().entry(pin).or_default();
        log::debug!("configuring 1-Wire bus on pin {pin} ({power:?})");
        self.send(&power.config_frame(pin))
    }

    /// Search the bus on `pin` for devices.
    ///
    /// Addresses are returned in the order the firmware reported them. A
    /// trailing partial ROM code is dropped.
    pub fn search(
        &self,
        pin: u8,
        kind: OneWireSearchKind,
    ) -> OneWireResult<Vec<OneWireAddress>, T::Error> {
        let endpoint = self.endpoint(pin)?;
        let _exchange = endpoint.exchange.lock();
        let data = self.exchange(pin, &endpoint, &kind.frame(pin), kind.reply())?;
        let mut roms = data.chunks_exact(8);
        let addresses = roms
            .by_ref()
            .map(|rom| {
                let mut bytes = [0; 8];
                bytes.copy_from_slice(rom);
                OneWireAddress::new(bytes)
            })
            .collect::<Vec<_>>();
        if !roms.remainder().is_empty() {
            log::debug!(
                "dropping {} trailing search reply bytes on pin {pin}",
                roms.remainder().len()
            );
        }
        Ok(addresses)
    }

    /// Run `request` on the bus on `pin`.
    ///
    /// Requests that read block until their reply arrives and return the
    /// unpacked reply, starting with the echoed correlation id. Other
    /// requests return `None` as soon as they are sent.
    ///
    /// A read built with [`OneWireRequest::read_default`] is sent with the
    /// next id from the endpoint's counter, so a reply to an earlier call
    /// that timed out is rejected as a correlation mismatch.
    pub fn execute(
        &self,
        pin: u8,
        request: &OneWireRequest,
    ) -> OneWireResult<Option<Vec<u8>>, T::Error> {
        let endpoint = self.endpoint(pin)?;
        let (Some(count), Some(correlation_id)) = (request.read_count(), request.correlation_id())
        else {
            self.send(&request.frame(pin))?;
            return Ok(None);
        };
        let _exchange = endpoint.exchange.lock();
        let (frame, correlation_id) = if request.assigns_correlation_id() {
            let id = endpoint.next_correlation_id();
            (request.clone().read(count, id).frame(pin), id)
        } else {
            (request.frame(pin), correlation_id)
        };
        let data = self.exchange(pin, &endpoint, &frame, ONEWIRE_READ_REPLY)?;
        let reply = ReadReply::parse(&data).map_err(OneWireError::Protocol)?;
        if reply.correlation_id != correlation_id {
            return Err(OneWireError::Protocol(
                ProtocolViolation::CorrelationMismatch {
                    expected: correlation_id,
                    received: reply.correlation_id,
                },
            ));
        }
        Ok(Some(data))
    }

    /// Hand an inbound OneWire SysEx message to the call waiting for it.
    ///
    /// `message` is the SysEx body: reply subcommand, pin, then 7-bit packed
    /// data. Replies nobody waits for are dropped and reported back.
    pub fn deliver(&self, message: &[u8]) -> Result<(), ProtocolViolation> {
        let [reply, pin, packed @ ..] = message else {
            log::warn!("dropping truncated 1-Wire reply {message:02x?}");
            return Err(ProtocolViolation::Truncated);
        };
        let (reply, pin) = (*reply, *pin);
        if !matches!(
            reply,
            ONEWIRE_SEARCH_REPLY | ONEWIRE_READ_REPLY | ONEWIRE_SEARCH_ALARMS_REPLY
        ) {
            log::warn!("dropping unknown 1-Wire reply 0x{reply:02x} on pin {pin}");
            return Err(ProtocolViolation::UnknownReply(reply));
        }
        let endpoint = self.endpoints.lock().get(&pin).cloned();
        let waiter = endpoint.and_then(|e| e.waiter.lock().take());
        let Some(waiter) = waiter else {
            log::warn!("dropping unsolicited 1-Wire reply 0x{reply:02x} on pin {pin}");
            return Err(ProtocolViolation::Unsolicited { pin });
        };
        let data = unpack_7_to_8(packed);
        log::trace!("1-Wire reply 0x{reply:02x} on pin {pin}: {data:02x?}");
        if reply != waiter.reply {
            log::warn!(
                "1-Wire reply 0x{reply:02x} on pin {pin} does not answer pending 0x{:02x}",
                waiter.reply
            );
        }
        waiter.tx.send((reply, data)).map_err(|_| {
            log::warn!("1-Wire reply on pin {pin} arrived after its caller gave up");
            ProtocolViolation::Unsolicited { pin }
        })
    }

    fn endpoint(&self, pin: u8) -> OneWireResult<Arc<Endpoint>, T::Error> {
        self.endpoints
            .lock()
            .get(&pin)
            .cloned()
            .ok_or(OneWireError::BusUninitialized)
    }

    fn send(&self, payload: &[u8]) -> OneWireResult<(), T::Error> {
        log::debug!("sending 1-Wire request {payload:02x?}");
        self.transport
            .lock()
            .send_sysex(SYSEX_ONEWIRE, payload)
            .map_err(OneWireError::Transport)
    }

    /// Send `frame` and block until the reply `expected` arrives on `pin`.
    ///
    /// The caller holds the endpoint's exchange lock.
    fn exchange(
        &self,
        pin: u8,
        endpoint: &Endpoint,
        frame: &[u8],
        expected: u8,
    ) -> OneWireResult<Vec<u8>, T::Error> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        // armed before sending so a fast reply cannot slip past
        *endpoint.waiter.lock() = Some(Waiter {
            reply: expected,
            tx,
        });
        if let Err(e) = self.send(frame) {
            endpoint.release();
            return Err(e);
        }
        let received = match self.timeout {
            Some(timeout) => rx.recv_timeout(timeout),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let (reply, data) = match received {
            Ok(reply) => reply,
            Err(_) => {
                endpoint.release();
                // deliver may have taken the slot just before the release
                match rx.try_recv() {
                    Ok(reply) => reply,
                    Err(_) => {
                        log::warn!(
                            "timed out waiting for 1-Wire reply 0x{expected:02x} on pin {pin}"
                        );
                        return Err(OneWireError::Timeout);
                    }
                }
            }
        };
        if reply != expected {
            return Err(OneWireError::Protocol(
                ProtocolViolation::UnexpectedReply {
                    expected,
                    received: reply,
                },
            ));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack_8_to_7;
    use crossbeam_channel::Receiver;
    use std::{thread, vec};

    const PIN: u8 = 10;

    struct Recorder {
        frames: Sender<Vec<u8>>,
        fail: bool,
    }

    impl FirmataTransport for Recorder {
        type Error = &'static str;

        fn send_sysex(&mut self, command: u8, payload: &[u8]) -> Result<(), Self::Error> {
            assert_eq!(command, SYSEX_ONEWIRE);
            if self.fail {
                return Err("link down");
            }
            self.frames.send(payload.to_vec()).map_err(|_| "closed")
        }
    }

    fn session_with(
        fail: bool,
        timeout: Duration,
    ) -> (Arc<OneWireSession<Recorder>>, Receiver<Vec<u8>>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let (tx, rx) = crossbeam_channel::unbounded();
        let session = OneWireSession::new(Recorder { frames: tx, fail }).with_timeout(timeout);
        (Arc::new(session), rx)
    }

    fn session(fail: bool) -> (Arc<OneWireSession<Recorder>>, Receiver<Vec<u8>>) {
        session_with(fail, Duration::from_secs(5))
    }

    fn configured_with(timeout: Duration) -> (Arc<OneWireSession<Recorder>>, Receiver<Vec<u8>>) {
        let (session, rx) = session_with(false, timeout);
        session.configure(PIN, PowerMode::Normal).unwrap();
        assert_eq!(rx.recv().unwrap(), vec![0x41, PIN, 0]);
        (session, rx)
    }

    fn configured() -> (Arc<OneWireSession<Recorder>>, Receiver<Vec<u8>>) {
        configured_with(Duration::from_secs(5))
    }

    fn reply(subcommand: u8, pin: u8, data: &[u8]) -> Vec<u8> {
        let mut msg = vec![subcommand, pin];
        msg.extend_from_slice(&pack_8_to_7(data));
        msg
    }

    /// Answer the next frame sent with `message`.
    fn respond(
        session: &Arc<OneWireSession<Recorder>>,
        rx: &Receiver<Vec<u8>>,
        message: Vec<u8>,
    ) -> thread::JoinHandle<(Vec<u8>, Result<(), ProtocolViolation>)> {
        let session = Arc::clone(session);
        let rx = rx.clone();
        thread::spawn(move || {
            let frame = rx.recv().unwrap();
            (frame, session.deliver(&message))
        })
    }

    #[test]
    fn configure_is_idempotent() {
        let (session, rx) = configured();
        session.configure(PIN, PowerMode::Parasitic).unwrap();
        assert_eq!(rx.recv().unwrap(), vec![0x41, PIN, 1]);
        assert_eq!(session.endpoints.lock().len(), 1);
    }

    #[test]
    fn search_partitions_rom_codes() {
        let (session, rx) = configured();
        let data: Vec<u8> = (0..17).collect();
        let responder = respond(&session, &rx, reply(0x42, PIN, &data));
        let found = session.search(PIN, OneWireSearchKind::Normal).unwrap();
        let (frame, delivered) = responder.join().unwrap();
        assert_eq!(frame, vec![0x40, PIN]);
        assert_eq!(delivered, Ok(()));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].as_bytes(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(found[1].as_bytes(), &[8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn alarm_search_expects_alarm_reply() {
        let (session, rx) = configured();
        let responder = respond(&session, &rx, reply(0x42, PIN, &[0; 8]));
        let err = session.search(PIN, OneWireSearchKind::Alarmed).unwrap_err();
        let (frame, _) = responder.join().unwrap();
        assert_eq!(frame, vec![0x44, PIN]);
        assert!(matches!(
            err,
            OneWireError::Protocol(ProtocolViolation::UnexpectedReply {
                expected: 0x45,
                received: 0x42
            })
        ));
    }

    #[test]
    fn execute_without_read_does_not_wait() {
        let (session, rx) = configured();
        let req = OneWireRequest::new().reset().skip().write(&[0x44]);
        assert_eq!(session.execute(PIN, &req).unwrap(), None);
        assert_eq!(rx.recv().unwrap(), req.frame(PIN));
    }

    #[test]
    fn execute_with_read_returns_reply() {
        let (session, rx) = configured();
        let req = OneWireRequest::new()
            .reset()
            .skip()
            .write(&[0xbe])
            .read_default(2);
        let responder = respond(&session, &rx, reply(0x43, PIN, &[0x34, 0x12, 0xaa, 0x55]));
        let data = session.execute(PIN, &req).unwrap();
        let (frame, _) = responder.join().unwrap();
        assert_eq!(frame, req.frame(PIN));
        assert_eq!(data, Some(vec![0x34, 0x12, 0xaa, 0x55]));
    }

    #[test]
    fn correlation_mismatch_is_reported() {
        let (session, rx) = configured();
        let req = OneWireRequest::new().reset().skip().read(1, 0x0042);
        let responder = respond(&session, &rx, reply(0x43, PIN, &[0x34, 0x12, 0x00]));
        let err = session.execute(PIN, &req).unwrap_err();
        let (frame, delivered) = responder.join().unwrap();
        assert_eq!(frame, req.frame(PIN));
        assert_eq!(delivered, Ok(()));
        assert!(matches!(
            err,
            OneWireError::Protocol(ProtocolViolation::CorrelationMismatch {
                expected: 0x0042,
                received: DEFAULT_CORRELATION_ID
            })
        ));
    }

    #[test]
    fn transport_failure_skips_wait() {
        let (session, _rx) = session(true);
        session.endpoints.lock().entry(PIN).or_default();
        let req = OneWireRequest::new().reset().skip().read_default(9);
        assert!(matches!(
            session.execute(PIN, &req),
            Err(OneWireError::Transport("link down"))
        ));
        // the slot was released, a late reply has nobody to go to
        assert_eq!(
            session.deliver(&reply(0x43, PIN, &[0x34, 0x12])),
            Err(ProtocolViolation::Unsolicited { pin: PIN })
        );
    }

    #[test]
    fn unconfigured_pin_is_rejected() {
        let (session, rx) = session(false);
        let req = OneWireRequest::new().reset().skip().write(&[0x44]);
        assert!(matches!(
            session.execute(PIN, &req),
            Err(OneWireError::BusUninitialized)
        ));
        assert!(matches!(
            session.search(PIN, OneWireSearchKind::Normal),
            Err(OneWireError::BusUninitialized)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsolicited_and_malformed_replies() {
        let (session, _rx) = configured();
        assert_eq!(
            session.deliver(&reply(0x43, PIN, &[1, 2, 3])),
            Err(ProtocolViolation::Unsolicited { pin: PIN })
        );
        assert_eq!(
            session.deliver(&reply(0x43, PIN + 1, &[1, 2, 3])),
            Err(ProtocolViolation::Unsolicited { pin: PIN + 1 })
        );
        assert_eq!(session.deliver(&[0x43]), Err(ProtocolViolation::Truncated));
        assert_eq!(
            session.deliver(&[0x41, PIN]),
            Err(ProtocolViolation::UnknownReply(0x41))
        );
    }

    #[test]
    fn timeout_releases_slot() {
        let (session, rx) = configured_with(Duration::from_millis(100));
        let req = OneWireRequest::new().reset().skip().read_default(9);
        assert!(matches!(
            session.execute(PIN, &req),
            Err(OneWireError::Timeout)
        ));
        rx.recv().unwrap();
        assert_eq!(
            session.deliver(&reply(0x43, PIN, &[0x34, 0x12])),
            Err(ProtocolViolation::Unsolicited { pin: PIN })
        );
        // and the endpoint is usable again
        let responder = respond(&session, &rx, reply(0x43, PIN, &[0x35, 0x12, 7]));
        assert_eq!(
            session.execute(PIN, &req).unwrap(),
            Some(vec![0x35, 0x12, 7])
        );
        let (frame, delivered) = responder.join().unwrap();
        assert_eq!(frame, req.clone().read(9, 0x1235).frame(PIN));
        assert_eq!(delivered, Ok(()));
    }

    #[test]
    fn late_reply_does_not_answer_next_read() {
        let (session, rx) = configured_with(Duration::from_millis(250));
        let req = OneWireRequest::new().reset().skip().read_default(1);
        assert!(matches!(
            session.execute(PIN, &req),
            Err(OneWireError::Timeout)
        ));
        assert_eq!(rx.recv().unwrap(), req.clone().read(1, 0x1234).frame(PIN));

        let next = {
            let session = Arc::clone(&session);
            let req = req.clone();
            thread::spawn(move || session.execute(PIN, &req))
        };
        assert_eq!(rx.recv().unwrap(), req.clone().read(1, 0x1235).frame(PIN));
        // the first read's reply turns up while the second is waiting
        assert_eq!(session.deliver(&reply(0x43, PIN, &[0x34, 0x12, 0xaa])), Ok(()));
        assert!(matches!(
            next.join().unwrap(),
            Err(OneWireError::Protocol(
                ProtocolViolation::CorrelationMismatch {
                    expected: 0x1235,
                    received: 0x1234
                }
            ))
        ));
    }

    #[test]
    fn same_pin_reads_are_serialized() {
        let (session, rx) = configured();
        let req = OneWireRequest::new().reset().skip().read_default(1);
        let callers = (0..2)
            .map(|_| {
                let session = Arc::clone(&session);
                let req = req.clone();
                thread::spawn(move || session.execute(PIN, &req))
            })
            .collect::<Vec<_>>();

        assert_eq!(rx.recv().unwrap(), req.clone().read(1, 0x1234).frame(PIN));
        // the second caller waits for the first reply before sending
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(session.deliver(&reply(0x43, PIN, &[0x34, 0x12, 1])), Ok(()));

        assert_eq!(rx.recv().unwrap(), req.clone().read(1, 0x1235).frame(PIN));
        assert_eq!(session.deliver(&reply(0x43, PIN, &[0x35, 0x12, 2])), Ok(()));

        let mut results = callers
            .into_iter()
            .map(|caller| caller.join().unwrap().unwrap())
            .collect::<Vec<_>>();
        results.sort();
        assert_eq!(
            results,
            vec![Some(vec![0x34, 0x12, 1]), Some(vec![0x35, 0x12, 2])]
        );
    }

    #[test]
    fn endpoints_are_independent() {
        let (session, rx) = configured();
        session.configure(PIN + 1, PowerMode::Normal).unwrap();
        rx.recv().unwrap();
        let req = OneWireRequest::new().reset().skip().read_default(1);

        let waiting = {
            let session = Arc::clone(&session);
            let req = req.clone();
            thread::spawn(move || session.execute(PIN, &req))
        };
        assert_eq!(rx.recv().unwrap(), req.frame(PIN));

        // the other pin completes while the first is still waiting
        let responder = respond(&session, &rx, reply(0x43, PIN + 1, &[0x34, 0x12, 2]));
        assert_eq!(
            session.execute(PIN + 1, &req).unwrap(),
            Some(vec![0x34, 0x12, 2])
        );
        let (_, delivered) = responder.join().unwrap();
        assert_eq!(delivered, Ok(()));

        session
            .deliver(&reply(0x43, PIN, &[0x34, 0x12, 1]))
            .unwrap();
        assert_eq!(waiting.join().unwrap().unwrap(), Some(vec![0x34, 0x12, 1]));
    }
}
