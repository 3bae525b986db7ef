//! AgentX PDU encoding and decoding per RFC 2741 §5 and §6.
//!
//! Encoding always uses network byte order and sets the NETWORK_BYTE_ORDER
//! header flag. Decoding honors the flag of the incoming PDU, so a master that
//! speaks little-endian is understood as well.

use std::fmt;

use thiserror::Error;

use super::oid::{encode_oid, expand_prefix, Oid};

/// AgentX protocol version.
pub const AGENTX_VERSION: u8 = 1;

/// PDU header size in bytes.
pub const PDU_HEADER_SIZE: usize = 20;

// --- Header flags (RFC 2741 §6.1) ---

pub const FLAG_INSTANCE_REGISTRATION: u8 = 0x01;
pub const FLAG_NEW_INDEX: u8 = 0x02;
pub const FLAG_ANY_INDEX: u8 = 0x04;
pub const FLAG_NON_DEFAULT_CONTEXT: u8 = 0x08;
pub const FLAG_NETWORK_BYTE_ORDER: u8 = 0x10;

// --- VarBind type constants (RFC 2741 §5.4) ---

pub const VARBIND_INTEGER: u16 = 2;
pub const VARBIND_OCTET_STRING: u16 = 4;
pub const VARBIND_NULL: u16 = 5;
pub const VARBIND_OBJECT_IDENTIFIER: u16 = 6;
pub const VARBIND_IP_ADDRESS: u16 = 64;
pub const VARBIND_COUNTER32: u16 = 65;
pub const VARBIND_GAUGE32: u16 = 66;
pub const VARBIND_TIMETICKS: u16 = 67;
pub const VARBIND_OPAQUE: u16 = 68;
pub const VARBIND_COUNTER64: u16 = 70;
pub const VARBIND_NO_SUCH_OBJECT: u16 = 128;
pub const VARBIND_NO_SUCH_INSTANCE: u16 = 129;
pub const VARBIND_END_OF_MIB_VIEW: u16 = 130;

// --- Close reasons (RFC 2741 §6.2.2) ---

pub const REASON_OTHER: u8 = 1;
pub const REASON_PARSE_ERROR: u8 = 2;
pub const REASON_PROTOCOL_ERROR: u8 = 3;
pub const REASON_TIMEOUTS: u8 = 4;
pub const REASON_SHUTDOWN: u8 = 5;
pub const REASON_BY_MANAGER: u8 = 6;

// --- Response res.error values (RFC 2741 §6.2.16) ---

pub const RES_NO_AGENTX_ERROR: u16 = 0;
pub const RES_NOT_WRITABLE: u16 = 17;
pub const RES_OPEN_FAILED: u16 = 256;
pub const RES_NOT_OPEN: u16 = 257;
pub const RES_INDEX_WRONG_TYPE: u16 = 258;
pub const RES_INDEX_ALREADY_ALLOCATED: u16 = 259;
pub const RES_INDEX_NONE_AVAILABLE: u16 = 260;
pub const RES_INDEX_NOT_ALLOCATED: u16 = 261;
pub const RES_UNSUPPORTED_CONTEXT: u16 = 262;
pub const RES_DUPLICATE_REGISTRATION: u16 = 263;
pub const RES_UNKNOWN_REGISTRATION: u16 = 264;
pub const RES_UNKNOWN_AGENT_CAPS: u16 = 265;
pub const RES_PARSE_ERROR: u16 = 266;
pub const RES_REQUEST_DENIED: u16 = 267;
pub const RES_PROCESSING_ERROR: u16 = 268;

/// Human readable name of a Response res.error value.
pub fn response_error_name(code: u16) -> &'static str {
    match code {
        RES_NO_AGENTX_ERROR => "noAgentXError",
        RES_NOT_WRITABLE => "notWritable",
        RES_OPEN_FAILED => "openFailed",
        RES_NOT_OPEN => "notOpen",
        RES_INDEX_WRONG_TYPE => "indexWrongType",
        RES_INDEX_ALREADY_ALLOCATED => "indexAlreadyAllocated",
        RES_INDEX_NONE_AVAILABLE => "indexNoneAvailable",
        RES_INDEX_NOT_ALLOCATED => "indexNotAllocated",
        RES_UNSUPPORTED_CONTEXT => "unsupportedContext",
        RES_DUPLICATE_REGISTRATION => "duplicateRegistration",
        RES_UNKNOWN_REGISTRATION => "unknownRegistration",
        RES_UNKNOWN_AGENT_CAPS => "unknownAgentCaps",
        RES_PARSE_ERROR => "parseError",
        RES_REQUEST_DENIED => "requestDenied",
        RES_PROCESSING_ERROR => "processingError",
        _ => "unknown",
    }
}

/// Errors raised while decoding a PDU from the wire.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("unsupported AgentX version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown PDU type {0}")]
    UnknownPduType(u8),
    #[error("unknown VarBind type {0}")]
    UnknownValueType(u16),
    #[error("IpAddress value must be 4 octets, got {0}")]
    InvalidIpAddress(usize),
    #[error("payload length {0} exceeds the maximum PDU size")]
    PayloadTooLarge(u32),
}

/// AgentX PDU types (RFC 2741 §6.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    Open = 1,
    Close = 2,
    Register = 3,
    Unregister = 4,
    Get = 5,
    GetNext = 6,
    GetBulk = 7,
    TestSet = 8,
    CommitSet = 9,
    UndoSet = 10,
    CleanupSet = 11,
    Notify = 12,
    Ping = 13,
    IndexAllocate = 14,
    IndexDeallocate = 15,
    AddAgentCaps = 16,
    RemoveAgentCaps = 17,
    Response = 18,
}

impl PduType {
    /// Whether a non-default context may precede the payload of this type.
    pub fn carries_context(self) -> bool {
        !matches!(
            self,
            PduType::Open
                | PduType::Close
                | PduType::Response
                | PduType::CommitSet
                | PduType::UndoSet
                | PduType::CleanupSet
        )
    }
}

impl TryFrom<u8> for PduType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => PduType::Open,
            2 => PduType::Close,
            3 => PduType::Register,
            4 => PduType::Unregister,
            5 => PduType::Get,
            6 => PduType::GetNext,
            7 => PduType::GetBulk,
            8 => PduType::TestSet,
            9 => PduType::CommitSet,
            10 => PduType::UndoSet,
            11 => PduType::CleanupSet,
            12 => PduType::Notify,
            13 => PduType::Ping,
            14 => PduType::IndexAllocate,
            15 => PduType::IndexDeallocate,
            16 => PduType::AddAgentCaps,
            17 => PduType::RemoveAgentCaps,
            18 => PduType::Response,
            other => return Err(DecodeError::UnknownPduType(other)),
        })
    }
}

/// An SNMP variable binding value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VarBindValue {
    Integer(i32),
    OctetString(Vec<u8>),
    Null,
    ObjectIdentifier(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl VarBindValue {
    /// The RFC 2741 §5.4 type tag.
    pub fn type_tag(&self) -> u16 {
        match self {
            VarBindValue::Integer(_) => VARBIND_INTEGER,
            VarBindValue::OctetString(_) => VARBIND_OCTET_STRING,
            VarBindValue::Null => VARBIND_NULL,
            VarBindValue::ObjectIdentifier(_) => VARBIND_OBJECT_IDENTIFIER,
            VarBindValue::IpAddress(_) => VARBIND_IP_ADDRESS,
            VarBindValue::Counter32(_) => VARBIND_COUNTER32,
            VarBindValue::Gauge32(_) => VARBIND_GAUGE32,
            VarBindValue::TimeTicks(_) => VARBIND_TIMETICKS,
            VarBindValue::Opaque(_) => VARBIND_OPAQUE,
            VarBindValue::Counter64(_) => VARBIND_COUNTER64,
            VarBindValue::NoSuchObject => VARBIND_NO_SUCH_OBJECT,
            VarBindValue::NoSuchInstance => VARBIND_NO_SUCH_INSTANCE,
            VarBindValue::EndOfMibView => VARBIND_END_OF_MIB_VIEW,
        }
    }

    /// True for the response-only sentinels (noSuchObject, noSuchInstance, endOfMibView).
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            VarBindValue::NoSuchObject | VarBindValue::NoSuchInstance | VarBindValue::EndOfMibView
        )
    }
}

/// A variable binding (OID + value).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: VarBindValue,
}

impl VarBind {
    pub fn new(oid: Oid, value: VarBindValue) -> Self {
        VarBind { oid, value }
    }
}

/// A SearchRange (RFC 2741 §5.2). An empty `end` means unbounded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRange {
    pub start: Oid,
    pub end: Oid,
    /// Whether `start` itself is part of the range.
    pub include: bool,
}

impl SearchRange {
    pub fn new(start: Oid, end: Oid) -> Self {
        SearchRange {
            start,
            end,
            include: false,
        }
    }
}

/// Register / Unregister payload (RFC 2741 §6.2.3, §6.2.4).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Reserved (zero) in Unregister PDUs.
    pub timeout: u8,
    pub priority: u8,
    pub range_subid: u8,
    pub subtree: Oid,
    /// Present iff `range_subid` is non-zero.
    pub upper_bound: Option<u32>,
}

impl Registration {
    /// A plain subtree registration with the default priority.
    pub fn subtree(subtree: Oid) -> Self {
        Registration {
            timeout: 0,
            priority: 127,
            range_subid: 0,
            subtree,
            upper_bound: None,
        }
    }
}

/// Response payload (RFC 2741 §6.2.16).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub sys_uptime: u32,
    pub error: u16,
    pub index: u16,
    pub varbinds: Vec<VarBind>,
}

/// Type-specific PDU payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Ping, CommitSet, UndoSet and CleanupSet carry nothing.
    Empty,
    Open {
        timeout: u8,
        id: Oid,
        description: Vec<u8>,
    },
    Close {
        reason: u8,
    },
    Register(Registration),
    Unregister(Registration),
    Get(Vec<SearchRange>),
    GetNext(Vec<SearchRange>),
    GetBulk {
        non_repeaters: u16,
        max_repetitions: u16,
        ranges: Vec<SearchRange>,
    },
    /// TestSet and Notify.
    VarBinds(Vec<VarBind>),
    Response(Response),
    /// Recognized types this sub-agent never interprets.
    Raw(Vec<u8>),
}

impl Payload {
    /// The empty payload matching a PDU type.
    pub fn empty_for(pdu_type: PduType) -> Self {
        match pdu_type {
            PduType::Open => Payload::Open {
                timeout: 0,
                id: Oid::empty(),
                description: Vec::new(),
            },
            PduType::Close => Payload::Close {
                reason: REASON_SHUTDOWN,
            },
            PduType::Register => Payload::Register(Registration::subtree(Oid::empty())),
            PduType::Unregister => Payload::Unregister(Registration::subtree(Oid::empty())),
            PduType::Get => Payload::Get(Vec::new()),
            PduType::GetNext => Payload::GetNext(Vec::new()),
            PduType::GetBulk => Payload::GetBulk {
                non_repeaters: 0,
                max_repetitions: 0,
                ranges: Vec::new(),
            },
            PduType::TestSet | PduType::Notify => Payload::VarBinds(Vec::new()),
            PduType::Response => Payload::Response(Response::default()),
            PduType::Ping | PduType::CommitSet | PduType::UndoSet | PduType::CleanupSet => {
                Payload::Empty
            }
            PduType::IndexAllocate
            | PduType::IndexDeallocate
            | PduType::AddAgentCaps
            | PduType::RemoveAgentCaps => Payload::Raw(Vec::new()),
        }
    }
}

/// Decoded AgentX PDU header (20 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PduHeader {
    pub version: u8,
    pub pdu_type: PduType,
    pub flags: u8,
    pub session_id: u32,
    pub transaction_id: u32,
    pub packet_id: u32,
    pub payload_length: u32,
}

impl PduHeader {
    /// Decodes the fixed header, honoring the byte order flag.
    pub fn decode(buf: &[u8]) -> Result<PduHeader, DecodeError> {
        if buf.len() < PDU_HEADER_SIZE {
            return Err(DecodeError::Truncated {
                needed: PDU_HEADER_SIZE,
                available: buf.len(),
            });
        }
        if buf[0] != AGENTX_VERSION {
            return Err(DecodeError::UnsupportedVersion(buf[0]));
        }
        let pdu_type = PduType::try_from(buf[1])?;
        let flags = buf[2];

        let mut reader = Reader::new(&buf[4..PDU_HEADER_SIZE], flags);
        Ok(PduHeader {
            version: buf[0],
            pdu_type,
            flags,
            session_id: reader.u32()?,
            transaction_id: reader.u32()?,
            packet_id: reader.u32()?,
            payload_length: reader.u32()?,
        })
    }
}

/// A complete AgentX PDU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub flags: u8,
    pub session_id: u32,
    pub transaction_id: u32,
    pub packet_id: u32,
    /// Non-default context, only meaningful for context-carrying types.
    pub context: Option<Vec<u8>>,
    pub payload: Payload,
}

impl Pdu {
    /// Creates a PDU of `pdu_type` with zeroed ids and an empty payload.
    pub fn new(pdu_type: PduType) -> Self {
        Pdu {
            pdu_type,
            flags: FLAG_NETWORK_BYTE_ORDER,
            session_id: 0,
            transaction_id: 0,
            packet_id: 0,
            context: None,
            payload: Payload::empty_for(pdu_type),
        }
    }

    /// Encodes the PDU (header + payload) in network byte order.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        let mut flags = self.flags | FLAG_NETWORK_BYTE_ORDER;

        match (&self.context, self.pdu_type.carries_context()) {
            (Some(context), true) => {
                flags |= FLAG_NON_DEFAULT_CONTEXT;
                encode_octet_string(&mut payload, context);
            }
            _ => flags &= !FLAG_NON_DEFAULT_CONTEXT,
        }

        match &self.payload {
            Payload::Empty => {}
            Payload::Open {
                timeout,
                id,
                description,
            } => {
                payload.extend_from_slice(&[*timeout, 0, 0, 0]);
                encode_oid(&mut payload, id, false);
                encode_octet_string(&mut payload, description);
            }
            Payload::Close { reason } => payload.extend_from_slice(&[*reason, 0, 0, 0]),
            Payload::Register(reg) | Payload::Unregister(reg) => {
                payload.extend_from_slice(&[reg.timeout, reg.priority, reg.range_subid, 0]);
                encode_oid(&mut payload, &reg.subtree, false);
                if let Some(bound) = reg.upper_bound {
                    payload.extend_from_slice(&bound.to_be_bytes());
                }
            }
            Payload::Get(ranges) | Payload::GetNext(ranges) => {
                for range in ranges {
                    encode_search_range(&mut payload, range);
                }
            }
            Payload::GetBulk {
                non_repeaters,
                max_repetitions,
                ranges,
            } => {
                payload.extend_from_slice(&non_repeaters.to_be_bytes());
                payload.extend_from_slice(&max_repetitions.to_be_bytes());
                for range in ranges {
                    encode_search_range(&mut payload, range);
                }
            }
            Payload::VarBinds(varbinds) => {
                for vb in varbinds {
                    encode_varbind(&mut payload, vb);
                }
            }
            Payload::Response(response) => {
                payload.extend_from_slice(&response.sys_uptime.to_be_bytes());
                payload.extend_from_slice(&response.error.to_be_bytes());
                payload.extend_from_slice(&response.index.to_be_bytes());
                for vb in &response.varbinds {
                    encode_varbind(&mut payload, vb);
                }
            }
            Payload::Raw(raw) => payload.extend_from_slice(raw),
        }

        let mut buf = Vec::with_capacity(PDU_HEADER_SIZE + payload.len());
        buf.push(AGENTX_VERSION);
        buf.push(self.pdu_type as u8);
        buf.push(flags);
        buf.push(0); // reserved
        buf.extend_from_slice(&self.session_id.to_be_bytes());
        buf.extend_from_slice(&self.transaction_id.to_be_bytes());
        buf.extend_from_slice(&self.packet_id.to_be_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&payload);
        buf
    }

    /// Decodes a complete PDU. Bytes beyond the declared payload length are ignored.
    pub fn decode(buf: &[u8]) -> Result<Pdu, DecodeError> {
        let header = PduHeader::decode(buf)?;
        let total = PDU_HEADER_SIZE + header.payload_length as usize;
        if buf.len() < total {
            return Err(DecodeError::Truncated {
                needed: total,
                available: buf.len(),
            });
        }

        let mut reader = Reader::new(&buf[PDU_HEADER_SIZE..total], header.flags);

        let context = if header.pdu_type.carries_context()
            && header.flags & FLAG_NON_DEFAULT_CONTEXT != 0
        {
            Some(reader.octet_string()?)
        } else {
            None
        };

        let payload = match header.pdu_type {
            PduType::Open => {
                let timeout = reader.u8()?;
                reader.skip(3)?;
                let (id, _) = reader.oid()?;
                let description = reader.octet_string()?;
                Payload::Open {
                    timeout,
                    id,
                    description,
                }
            }
            PduType::Close => {
                let reason = reader.u8()?;
                reader.skip(3)?;
                Payload::Close { reason }
            }
            PduType::Register => Payload::Register(reader.registration()?),
            PduType::Unregister => Payload::Unregister(reader.registration()?),
            PduType::Get => Payload::Get(reader.search_ranges()?),
            PduType::GetNext => Payload::GetNext(reader.search_ranges()?),
            PduType::GetBulk => {
                let non_repeaters = reader.u16()?;
                let max_repetitions = reader.u16()?;
                Payload::GetBulk {
                    non_repeaters,
                    max_repetitions,
                    ranges: reader.search_ranges()?,
                }
            }
            PduType::TestSet | PduType::Notify => Payload::VarBinds(reader.varbinds()?),
            PduType::Response => {
                let sys_uptime = reader.u32()?;
                let error = reader.u16()?;
                let index = reader.u16()?;
                Payload::Response(Response {
                    sys_uptime,
                    error,
                    index,
                    varbinds: reader.varbinds()?,
                })
            }
            PduType::Ping | PduType::CommitSet | PduType::UndoSet | PduType::CleanupSet => {
                Payload::Empty
            }
            PduType::IndexAllocate
            | PduType::IndexDeallocate
            | PduType::AddAgentCaps
            | PduType::RemoveAgentCaps => Payload::Raw(reader.rest().to_vec()),
        };

        Ok(Pdu {
            pdu_type: header.pdu_type,
            flags: header.flags,
            session_id: header.session_id,
            transaction_id: header.transaction_id,
            packet_id: header.packet_id,
            context,
            payload,
        })
    }
}

impl fmt::Display for Pdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} flags=0x{:02x} session_id={} transaction_id={} packet_id={}",
            self.pdu_type, self.flags, self.session_id, self.transaction_id, self.packet_id
        )?;
        match &self.payload {
            Payload::Get(ranges) | Payload::GetNext(ranges) => {
                for r in ranges {
                    write!(f, " [{}{} .. {}]", if r.include { "=" } else { "" }, r.start, r.end)?;
                }
            }
            Payload::Register(reg) | Payload::Unregister(reg) => {
                write!(f, " subtree={} priority={}", reg.subtree, reg.priority)?;
            }
            Payload::Response(resp) => {
                write!(
                    f,
                    " error={} index={}",
                    response_error_name(resp.error),
                    resp.index
                )?;
                for vb in &resp.varbinds {
                    write!(f, " {}={:?}", vb.oid, vb.value)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// --- Encoding helpers ---

/// Encodes an octet string per RFC 2741 §5.3: length(4) + data + padding to 4 bytes.
pub fn encode_octet_string(buf: &mut Vec<u8>, s: &[u8]) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s);
    let pad = (4 - (s.len() % 4)) % 4;
    buf.resize(buf.len() + pad, 0);
}

/// Encodes a SearchRange per RFC 2741 §5.2.
pub fn encode_search_range(buf: &mut Vec<u8>, range: &SearchRange) {
    encode_oid(buf, &range.start, range.include);
    encode_oid(buf, &range.end, false);
}

/// Encodes a VarBind per RFC 2741 §5.4.
pub fn encode_varbind(buf: &mut Vec<u8>, vb: &VarBind) {
    buf.extend_from_slice(&vb.value.type_tag().to_be_bytes());
    buf.extend_from_slice(&[0, 0]); // reserved
    encode_oid(buf, &vb.oid, false);

    match &vb.value {
        VarBindValue::Integer(v) => buf.extend_from_slice(&v.to_be_bytes()),
        VarBindValue::Counter32(v) | VarBindValue::Gauge32(v) | VarBindValue::TimeTicks(v) => {
            buf.extend_from_slice(&v.to_be_bytes())
        }
        VarBindValue::Counter64(v) => buf.extend_from_slice(&v.to_be_bytes()),
        VarBindValue::OctetString(v) | VarBindValue::Opaque(v) => encode_octet_string(buf, v),
        VarBindValue::IpAddress(v) => encode_octet_string(buf, v),
        VarBindValue::ObjectIdentifier(oid) => encode_oid(buf, oid, false),
        VarBindValue::Null
        | VarBindValue::NoSuchObject
        | VarBindValue::NoSuchInstance
        | VarBindValue::EndOfMibView => {}
    }
}

// --- Decoding ---

/// Cursor over a payload that reads integers in the byte order of the PDU.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    network_order: bool,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], flags: u8) -> Self {
        Reader {
            buf,
            pos: 0,
            network_order: flags & FLAG_NETWORK_BYTE_ORDER != 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(DecodeError::Truncated {
                needed: end,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        let bytes = [b[0], b[1]];
        Ok(if self.network_order {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        let bytes = [b[0], b[1], b[2], b[3]];
        Ok(if self.network_order {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(b);
        Ok(if self.network_order {
            u64::from_be_bytes(bytes)
        } else {
            u64::from_le_bytes(bytes)
        })
    }

    /// Decodes an OID, returning it with its include flag.
    fn oid(&mut self) -> Result<(Oid, bool), DecodeError> {
        let n_subid = self.u8()? as usize;
        let prefix = self.u8()?;
        let include = self.u8()? != 0;
        self.skip(1)?; // reserved

        let mut tail = Vec::with_capacity(n_subid);
        for _ in 0..n_subid {
            tail.push(self.u32()?);
        }
        Ok((expand_prefix(prefix, tail), include))
    }

    fn octet_string(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.u32()? as usize;
        let data = self.take(len)?.to_vec();
        self.skip((4 - (len % 4)) % 4)?;
        Ok(data)
    }

    fn search_range(&mut self) -> Result<SearchRange, DecodeError> {
        let (start, include) = self.oid()?;
        let (end, _) = self.oid()?;
        Ok(SearchRange {
            start,
            end,
            include,
        })
    }

    fn search_ranges(&mut self) -> Result<Vec<SearchRange>, DecodeError> {
        let mut ranges = Vec::new();
        while !self.is_empty() {
            ranges.push(self.search_range()?);
        }
        Ok(ranges)
    }

    fn registration(&mut self) -> Result<Registration, DecodeError> {
        let timeout = self.u8()?;
        let priority = self.u8()?;
        let range_subid = self.u8()?;
        self.skip(1)?;
        let (subtree, _) = self.oid()?;
        let upper_bound = if range_subid != 0 {
            Some(self.u32()?)
        } else {
            None
        };
        Ok(Registration {
            timeout,
            priority,
            range_subid,
            subtree,
            upper_bound,
        })
    }

    fn varbind(&mut self) -> Result<VarBind, DecodeError> {
        let tag = self.u16()?;
        self.skip(2)?;
        let (oid, _) = self.oid()?;

        let value = match tag {
            VARBIND_INTEGER => VarBindValue::Integer(self.u32()? as i32),
            VARBIND_OCTET_STRING => VarBindValue::OctetString(self.octet_string()?),
            VARBIND_NULL => VarBindValue::Null,
            VARBIND_OBJECT_IDENTIFIER => VarBindValue::ObjectIdentifier(self.oid()?.0),
            VARBIND_IP_ADDRESS => {
                let octets = self.octet_string()?;
                let addr: [u8; 4] = octets
                    .as_slice()
                    .try_into()
                    .map_err(|_| DecodeError::InvalidIpAddress(octets.len()))?;
                VarBindValue::IpAddress(addr)
            }
            VARBIND_COUNTER32 => VarBindValue::Counter32(self.u32()?),
            VARBIND_GAUGE32 => VarBindValue::Gauge32(self.u32()?),
            VARBIND_TIMETICKS => VarBindValue::TimeTicks(self.u32()?),
            VARBIND_OPAQUE => VarBindValue::Opaque(self.octet_string()?),
            VARBIND_COUNTER64 => VarBindValue::Counter64(self.u64()?),
            VARBIND_NO_SUCH_OBJECT => VarBindValue::NoSuchObject,
            VARBIND_NO_SUCH_INSTANCE => VarBindValue::NoSuchInstance,
            VARBIND_END_OF_MIB_VIEW => VarBindValue::EndOfMibView,
            other => return Err(DecodeError::UnknownValueType(other)),
        };
        Ok(VarBind { oid, value })
    }

    fn varbinds(&mut self) -> Result<Vec<VarBind>, DecodeError> {
        let mut varbinds = Vec::new();
        while !self.is_empty() {
            varbinds.push(self.varbind()?);
        }
        Ok(varbinds)
    }
}
