//! AgentX session with the master agent.
//!
//! The session owns the socket, the session/transaction/packet counters and a
//! handle to the serving dataset. Its life cycle is
//! `Disconnected -> Opening -> Registering -> Serving -> Disconnected`;
//! [`Session::start`] walks the first three transitions and
//! [`Session::serve_once`] handles at most one request per call.

use std::{
    io::{self, Read, Write},
    time::{Duration, Instant},
};

use super::{
    dataset::{Dataset, SharedDataset},
    oid::Oid,
    pdu::{
        Payload, Pdu, PduHeader, PduType, Registration, Response, PDU_HEADER_SIZE,
        REASON_SHUTDOWN, RES_DUPLICATE_REGISTRATION, RES_NOT_WRITABLE, RES_NO_AGENTX_ERROR,
    },
    transport::{is_timeout, MasterAddress, Transport},
    AgentXError, DecodeError,
};

/// Upper bound for a single PDU payload; anything larger is a corrupt stream.
pub const MAX_PAYLOAD_LEN: usize = 100_000;

/// Default idle poll interval of the serving loop.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Timeout announced in the Open PDU, in seconds.
pub const DEFAULT_OPEN_TIMEOUT_SECS: u8 = 30;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for the rest of a PDU once its first bytes arrived.
const BODY_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Default deadline for the master's Response during the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Where the session is in its life cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Opening,
    Registering,
    Serving,
}

/// An AgentX sub-agent session with a master agent.
pub struct Session {
    address: MasterAddress,
    description: String,
    stream: Option<Transport>,
    state: SessionState,
    session_id: u32,
    transaction_id: u32,
    packet_id: u32,
    recv_timeout: Duration,
    handshake_timeout: Duration,
    debug: bool,
    dataset: SharedDataset,
}

impl Session {
    /// Creates a disconnected session for the master at `address`.
    pub fn new(address: MasterAddress, description: impl Into<String>) -> Self {
        Session {
            address,
            description: description.into(),
            stream: None,
            state: SessionState::Disconnected,
            session_id: 0,
            transaction_id: 0,
            packet_id: 0,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            debug: false,
            dataset: SharedDataset::new(),
        }
    }

    /// Sets how long a single receive blocks before reporting "no request".
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Sets how long each handshake step waits for the master's Response.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Enables PDU dumps at debug level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn address(&self) -> &MasterAddress {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Handle to the serving dataset, for refreshing it from elsewhere.
    pub fn dataset(&self) -> &SharedDataset {
        &self.dataset
    }

    /// Installs a new serving dataset, discarding the previous one.
    pub fn update(&self, dataset: Dataset) {
        let count = dataset.len();
        let previous = self.dataset.replace(dataset);
        if previous.is_empty() {
            log::info!("Setting initial serving dataset ({} OIDs)", count);
        } else {
            log::info!("Replacing serving dataset ({} OIDs)", count);
        }
    }

    /// Connects the socket. A no-op when already connected.
    ///
    /// On failure the session stays disconnected; the caller decides whether
    /// and when to retry.
    pub fn connect(&mut self) -> Result<(), AgentXError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = match Transport::connect(&self.address, CONNECT_TIMEOUT) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Failed to connect to {}: {}", self.address, e);
                return Err(e.into());
            }
        };
        stream.set_read_timeout(Some(self.recv_timeout))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

        self.stream = Some(stream);
        log::info!("Connected to {}", self.address);
        Ok(())
    }

    /// Closes the socket and forgets the session id. A no-op when disconnected.
    pub fn disconnect(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        log::info!("Disconnecting from {}", self.address);
        stream.shutdown();
        self.session_id = 0;
        self.state = SessionState::Disconnected;
    }

    /// Allocates a PDU stamped with the session id and the next transaction id.
    pub fn new_pdu(&mut self, pdu_type: PduType) -> Pdu {
        let mut pdu = Pdu::new(pdu_type);
        pdu.session_id = self.session_id;
        pdu.transaction_id = self.transaction_id;
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.packet_id = self.packet_id.wrapping_add(1);
        pdu.packet_id = self.packet_id;
        pdu
    }

    /// Builds a Response correlated with `request`.
    pub fn response_pdu(request: &Pdu) -> Pdu {
        let mut pdu = Pdu::new(PduType::Response);
        pdu.session_id = request.session_id;
        pdu.transaction_id = request.transaction_id;
        pdu.packet_id = request.packet_id;
        pdu
    }

    /// Encodes and writes a whole PDU.
    pub fn send_pdu(&mut self, pdu: &Pdu) -> Result<(), AgentXError> {
        if self.debug {
            log::debug!(">> {}", pdu);
        }
        let stream = self.stream.as_mut().ok_or(AgentXError::NotConnected)?;
        stream.write_all(&pdu.encode())?;
        stream.flush()?;
        Ok(())
    }

    /// Receives one PDU.
    ///
    /// Returns `Ok(None)` when nothing arrived within the receive timeout and
    /// [`AgentXError::PeerClosed`] when the master closed the stream.
    pub fn recv_pdu(&mut self) -> Result<Option<Pdu>, AgentXError> {
        let recv_timeout = self.recv_timeout;
        let stream = self.stream.as_mut().ok_or(AgentXError::NotConnected)?;

        let mut header = [0u8; PDU_HEADER_SIZE];
        let filled = match stream.read(&mut header) {
            Ok(0) => return Err(AgentXError::PeerClosed),
            Ok(n) => n,
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        stream.set_read_timeout(Some(BODY_READ_TIMEOUT))?;
        let buf = read_remaining(stream, header, filled);
        stream.set_read_timeout(Some(recv_timeout))?;

        let pdu = Pdu::decode(&buf?)?;
        if self.debug {
            log::debug!("<< {}", pdu);
        }
        Ok(Some(pdu))
    }

    /// Connects, opens the session, pings the master and registers `subtrees`.
    ///
    /// A registration refused by the master or left unanswered is logged and
    /// skipped. Any other failure leaves the session disconnected.
    pub fn start(&mut self, subtrees: &[Oid]) -> Result<(), AgentXError> {
        self.connect()?;
        let result = self.handshake(subtrees);
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    fn handshake(&mut self, subtrees: &[Oid]) -> Result<(), AgentXError> {
        self.state = SessionState::Opening;
        self.open()?;

        self.state = SessionState::Registering;
        self.ping()?;
        for subtree in subtrees {
            log::info!("Registering: {}", subtree);
            match self.register(subtree) {
                Ok(()) => {}
                Err(AgentXError::ResponseError { code, name }) => {
                    log::warn!("Registration of {} refused: {} ({})", subtree, name, code);
                }
                Err(AgentXError::Timeout) => {
                    log::warn!("Registration of {} timed out", subtree);
                }
                Err(e) => return Err(e),
            }
        }

        self.state = SessionState::Serving;
        Ok(())
    }

    /// Sends an Open PDU (RFC 2741 §6.2.1) and stores the assigned session id.
    fn open(&mut self) -> Result<(), AgentXError> {
        let mut pdu = self.new_pdu(PduType::Open);
        pdu.payload = Payload::Open {
            timeout: DEFAULT_OPEN_TIMEOUT_SECS,
            id: Oid::empty(),
            description: self.description.as_bytes().to_vec(),
        };
        self.send_pdu(&pdu)?;

        let (session_id, response) = self.await_response(pdu.packet_id, self.handshake_timeout)?;
        if response.error != RES_NO_AGENTX_ERROR {
            return Err(AgentXError::response(response.error));
        }
        self.session_id = session_id;
        log::info!("AgentX session opened (session_id={})", self.session_id);
        Ok(())
    }

    /// Sends a Ping PDU (RFC 2741 §6.2.13) to check the session is alive.
    fn ping(&mut self) -> Result<(), AgentXError> {
        let pdu = self.new_pdu(PduType::Ping);
        self.send_pdu(&pdu)?;
        let (_, response) = self.await_response(pdu.packet_id, self.handshake_timeout)?;
        if response.error != RES_NO_AGENTX_ERROR {
            return Err(AgentXError::response(response.error));
        }
        Ok(())
    }

    /// Registers an OID subtree with the master agent (RFC 2741 §6.2.3).
    pub fn register(&mut self, subtree: &Oid) -> Result<(), AgentXError> {
        let mut pdu = self.new_pdu(PduType::Register);
        pdu.payload = Payload::Register(Registration::subtree(subtree.clone()));
        self.send_pdu(&pdu)?;

        let (_, response) = self.await_response(pdu.packet_id, self.handshake_timeout)?;
        match response.error {
            RES_NO_AGENTX_ERROR => {
                log::info!("Registered OID subtree {}", subtree);
                Ok(())
            }
            RES_DUPLICATE_REGISTRATION => {
                log::warn!("OID subtree {} is already registered", subtree);
                Err(AgentXError::response(response.error))
            }
            code => Err(AgentXError::response(code)),
        }
    }

    /// Waits for the Response to `packet_id`, skipping unrelated PDUs.
    fn await_response(
        &mut self,
        packet_id: u32,
        timeout: Duration,
    ) -> Result<(u32, Response), AgentXError> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() >= deadline {
                return Err(AgentXError::Timeout);
            }
            match self.recv_pdu()? {
                Some(pdu) => match pdu.payload {
                    Payload::Response(response) if pdu.packet_id == packet_id => {
                        return Ok((pdu.session_id, response));
                    }
                    Payload::Response(_) => {
                        log::debug!(
                            "Ignoring response to packet {} while waiting for {}",
                            pdu.packet_id,
                            packet_id
                        );
                    }
                    _ if pdu.pdu_type == PduType::Close => {
                        return Err(AgentXError::ClosedByMaster(close_reason(&pdu)));
                    }
                    _ => {
                        log::warn!(
                            "Ignoring {:?} PDU received during handshake",
                            pdu.pdu_type
                        );
                    }
                },
                None => {}
            }
        }
    }

    /// Receives at most one request and answers it from the current dataset.
    ///
    /// Returns `Ok(())` when no request arrived within the receive timeout.
    pub fn serve_once(&mut self) -> Result<(), AgentXError> {
        if self.stream.is_none() {
            return Err(AgentXError::NotConnected);
        }

        let request = match self.recv_pdu() {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(AgentXError::PeerClosed) => {
                log::error!("Empty PDU, connection closed!");
                self.disconnect();
                return Err(AgentXError::PeerClosed);
            }
            Err(e) => return Err(e),
        };

        if let Some(response) = self.handle_request(&request)? {
            self.send_pdu(&response)?;
        }
        Ok(())
    }

    /// Builds the reply to `request`, or `None` when no reply is due.
    pub fn handle_request(&self, request: &Pdu) -> Result<Option<Pdu>, AgentXError> {
        let dataset = self.dataset.snapshot();
        let mut response = Response::default();

        match &request.payload {
            Payload::Get(ranges) => {
                log::debug!("Received GET PDU");
                response.varbinds = ranges
                    .iter()
                    .map(|range| {
                        let vb = dataset.get(&range.start);
                        log::debug!("GET: {} => {:?}", range.start, vb.value);
                        vb
                    })
                    .collect();
            }
            Payload::GetNext(ranges) => {
                log::debug!("Received GET_NEXT PDU");
                response.varbinds = ranges
                    .iter()
                    .map(|range| {
                        let vb = dataset.get_next(range);
                        log::debug!("GET_NEXT: {} => {}", range.start, vb.oid);
                        vb
                    })
                    .collect();
            }
            Payload::GetBulk {
                non_repeaters,
                max_repetitions,
                ranges,
            } => {
                log::debug!(
                    "Received GET_BULK PDU (non_repeaters={}, max_repetitions={})",
                    non_repeaters,
                    max_repetitions
                );
                response.varbinds = dataset.get_bulk(*non_repeaters, *max_repetitions, ranges);
            }
            Payload::VarBinds(varbinds) if request.pdu_type == PduType::TestSet => {
                log::warn!("Refusing SET of {} varbinds", varbinds.len());
                response.error = RES_NOT_WRITABLE;
                response.index = 1;
                response.varbinds = varbinds.clone();
            }
            Payload::Close { reason } => {
                log::info!("Master agent closed session (reason {})", reason);
                return Err(AgentXError::ClosedByMaster(*reason));
            }
            _ => match request.pdu_type {
                PduType::CommitSet | PduType::UndoSet | PduType::CleanupSet => {
                    log::debug!("Ignoring {:?} PDU", request.pdu_type);
                    return Ok(None);
                }
                PduType::Response => {
                    log::debug!("Ignoring unsolicited response (packet {})", request.packet_id);
                    return Ok(None);
                }
                other => {
                    log::warn!("Received unsupported PDU {:?}", other);
                    return Ok(None);
                }
            },
        }

        let mut pdu = Session::response_pdu(request);
        pdu.payload = Payload::Response(response);
        Ok(Some(pdu))
    }

    /// Sends Close(shutdown) when connected, then disconnects.
    pub fn close(&mut self) {
        if self.stream.is_none() {
            return;
        }
        let mut pdu = self.new_pdu(PduType::Close);
        pdu.payload = Payload::Close {
            reason: REASON_SHUTDOWN,
        };
        match self.send_pdu(&pdu) {
            Ok(()) => {
                // Best-effort wait for the master's acknowledgement.
                let _ = self.await_response(pdu.packet_id, CLOSE_TIMEOUT);
                log::info!("AgentX session closed");
            }
            Err(e) => log::debug!("Failed to send Close PDU: {}", e),
        }
        self.disconnect();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn close_reason(pdu: &Pdu) -> u8 {
    match pdu.payload {
        Payload::Close { reason } => reason,
        _ => 0,
    }
}

/// Reads the remainder of a PDU whose first `filled` header bytes are in `header`.
fn read_remaining(
    stream: &mut Transport,
    mut header: [u8; PDU_HEADER_SIZE],
    filled: usize,
) -> Result<Vec<u8>, AgentXError> {
    read_full(stream, &mut header[filled..])?;
    let parsed = PduHeader::decode(&header)?;
    let payload_len = parsed.payload_length as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(DecodeError::PayloadTooLarge(parsed.payload_length).into());
    }

    let mut buf = Vec::with_capacity(PDU_HEADER_SIZE + payload_len);
    buf.extend_from_slice(&header);
    buf.resize(PDU_HEADER_SIZE + payload_len, 0);
    read_full(stream, &mut buf[PDU_HEADER_SIZE..])?;
    Ok(buf)
}

fn read_full(stream: &mut Transport, buf: &mut [u8]) -> Result<(), AgentXError> {
    stream.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => AgentXError::PeerClosed,
        _ => AgentXError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentx::pdu::{SearchRange, VarBind, VarBindValue};

    fn session() -> Session {
        Session::new(
            "/nonexistent/agentx".parse().unwrap(),
            "test sub-agent",
        )
    }

    fn if_table(suffix: &[u32]) -> Oid {
        Oid::from([1, 3, 6, 1, 2, 1, 2, 2, 1]).child(suffix)
    }

    fn request(pdu_type: PduType, payload: Payload) -> Pdu {
        let mut pdu = Pdu::new(pdu_type);
        pdu.session_id = 11;
        pdu.transaction_id = 22;
        pdu.packet_id = 33;
        pdu.payload = payload;
        pdu
    }

    fn response_varbinds(pdu: &Pdu) -> &[VarBind] {
        match &pdu.payload {
            Payload::Response(r) => &r.varbinds,
            other => panic!("Expected Response payload, got {:?}", other),
        }
    }

    fn loaded_session() -> Session {
        let s = session();
        let mut ds = Dataset::new();
        ds.set(if_table(&[1, 1000]), VarBindValue::Integer(1000))
            .unwrap();
        ds.set(
            if_table(&[2, 1000]),
            VarBindValue::OctetString(b"eth0".to_vec()),
        )
        .unwrap();
        s.update(ds);
        s
    }

    #[test]
    fn test_new_pdu_increments_transaction_id() {
        let mut s = session();
        let a = s.new_pdu(PduType::Ping);
        let b = s.new_pdu(PduType::Ping);
        assert_eq!(a.transaction_id, 0);
        assert_eq!(b.transaction_id, 1);
        assert_ne!(a.packet_id, b.packet_id);
        assert_eq!(a.session_id, 0);
    }

    #[test]
    fn test_response_pdu_copies_correlation_fields() {
        let req = request(PduType::Get, Payload::Get(Vec::new()));
        let resp = Session::response_pdu(&req);
        assert_eq!(resp.pdu_type, PduType::Response);
        assert_eq!(resp.session_id, 11);
        assert_eq!(resp.transaction_id, 22);
        assert_eq!(resp.packet_id, 33);
    }

    #[test]
    fn test_handle_get() {
        let s = loaded_session();
        let req = request(
            PduType::Get,
            Payload::Get(vec![
                SearchRange::new(if_table(&[2, 1000]), Oid::empty()),
                SearchRange::new(if_table(&[3, 1000]), Oid::empty()),
            ]),
        );
        let resp = s.handle_request(&req).unwrap().unwrap();
        assert_eq!(resp.packet_id, req.packet_id);
        let vbs = response_varbinds(&resp);
        assert_eq!(vbs.len(), 2);
        assert_eq!(vbs[0].value, VarBindValue::OctetString(b"eth0".to_vec()));
        assert_eq!(vbs[1].oid, if_table(&[3, 1000]));
        assert_eq!(vbs[1].value, VarBindValue::NoSuchObject);
    }

    #[test]
    fn test_handle_get_next_scenario() {
        let s = loaded_session();
        let req = request(
            PduType::GetNext,
            Payload::GetNext(vec![SearchRange::new(if_table(&[1, 1000]), Oid::empty())]),
        );
        let resp = s.handle_request(&req).unwrap().unwrap();
        let vbs = response_varbinds(&resp);
        assert_eq!(vbs.len(), 1);
        assert_eq!(vbs[0].oid, if_table(&[2, 1000]));
        assert_eq!(vbs[0].value, VarBindValue::OctetString(b"eth0".to_vec()));
    }

    #[test]
    fn test_handle_get_next_end_of_mib_view() {
        let s = loaded_session();
        let req = request(
            PduType::GetNext,
            Payload::GetNext(vec![SearchRange::new(if_table(&[2, 1000]), Oid::empty())]),
        );
        let resp = s.handle_request(&req).unwrap().unwrap();
        let vbs = response_varbinds(&resp);
        assert_eq!(vbs[0].oid, if_table(&[2, 1000]));
        assert_eq!(vbs[0].value, VarBindValue::EndOfMibView);
    }

    #[test]
    fn test_handle_test_set_is_refused() {
        let s = loaded_session();
        let req = request(
            PduType::TestSet,
            Payload::VarBinds(vec![VarBind::new(
                if_table(&[2, 1000]),
                VarBindValue::OctetString(b"x".to_vec()),
            )]),
        );
        let resp = s.handle_request(&req).unwrap().unwrap();
        match resp.payload {
            Payload::Response(r) => {
                assert_eq!(r.error, RES_NOT_WRITABLE);
                assert_eq!(r.index, 1);
            }
            other => panic!("Expected Response payload, got {:?}", other),
        }
    }

    #[test]
    fn test_handle_unsupported_pdu_is_dropped() {
        let s = loaded_session();
        let req = request(PduType::IndexAllocate, Payload::Raw(Vec::new()));
        assert!(s.handle_request(&req).unwrap().is_none());
        let req = request(PduType::CleanupSet, Payload::Empty);
        assert!(s.handle_request(&req).unwrap().is_none());
    }

    #[test]
    fn test_handle_close_ends_session() {
        let s = loaded_session();
        let req = request(
            PduType::Close,
            Payload::Close {
                reason: crate::agentx::pdu::REASON_BY_MANAGER,
            },
        );
        assert!(matches!(
            s.handle_request(&req),
            Err(AgentXError::ClosedByMaster(6))
        ));
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let mut s = session();
        assert!(s.connect().is_err());
        assert!(!s.is_connected());
        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(s.start(&[if_table(&[])]).is_err());
        assert!(!s.is_connected());
    }

    #[test]
    fn test_serve_once_requires_connection() {
        let mut s = session();
        assert!(matches!(s.serve_once(), Err(AgentXError::NotConnected)));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut s = session();
        s.disconnect();
        s.disconnect();
        s.close();
        assert!(!s.is_connected());
    }
}
