//! Minimal AgentX sub-agent implementation per RFC 2741.
//!
//! Implements only the sub-agent side: Open, Ping, Register, Close, and
//! answering Get/GetNext/GetBulk requests from the master agent out of a
//! [`Dataset`] snapshot. Sets are refused, notifications are never sent.

pub mod dataset;
pub mod oid;
pub mod pdu;
pub mod session;
pub mod transport;

use std::io;

pub use dataset::{Dataset, DatasetError, SharedDataset};
pub use oid::{Oid, OidParseError};
pub use pdu::{DecodeError, Pdu, PduType, SearchRange, VarBind, VarBindValue};
pub use session::{Session, SessionState};
pub use transport::{AddressError, MasterAddress};

/// Errors that can occur during AgentX protocol operations.
///
/// Every variant ends the current connection; the agent loop disconnects and
/// retries.
#[derive(Debug, thiserror::Error)]
pub enum AgentXError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Protocol error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Not connected to the master agent")]
    NotConnected,
    #[error("Master agent closed the connection")]
    PeerClosed,
    #[error("Master agent closed the session (reason {0})")]
    ClosedByMaster(u8),
    #[error("Timed out waiting for a response from the master agent")]
    Timeout,
    #[error("Master agent returned error: {name} ({code})")]
    ResponseError { code: u16, name: &'static str },
}

impl AgentXError {
    pub(crate) fn response(code: u16) -> Self {
        AgentXError::ResponseError {
            code,
            name: pdu::response_error_name(code),
        }
    }
}
