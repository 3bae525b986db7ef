//! Interface inventory and counters from the forwarding plane.

mod sysfs;

pub use sysfs::SysfsDataplane;

use std::path::PathBuf;

/// Errors reported by a dataplane backend.
#[derive(Debug, thiserror::Error)]
pub enum DataplaneError {
    /// The backend cannot be queried at all.
    #[error("Dataplane unreachable at {path}: {source}")]
    Unreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A single attribute of one interface is missing or malformed.
    #[error("Lookup of {attribute} on {interface} failed")]
    LookupMiss {
        interface: String,
        attribute: &'static str,
    },
}

/// Per-interface statistics. Counters are monotonically increasing 64-bit values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_multicast: u64,
    pub rx_broadcast: u64,
    pub rx_dropped: u64,
    pub rx_errors: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_multicast: u64,
    pub tx_broadcast: u64,
    pub tx_dropped: u64,
    pub tx_errors: u64,
}

/// Operational state as reported by the kernel (RFC 2863 names).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperState {
    Up,
    Down,
    Testing,
    Unknown,
    Dormant,
    NotPresent,
    LowerLayerDown,
}

impl OperState {
    pub fn parse(s: &str) -> Option<OperState> {
        match s.trim() {
            "up" => Some(OperState::Up),
            "down" => Some(OperState::Down),
            "testing" => Some(OperState::Testing),
            "unknown" => Some(OperState::Unknown),
            "dormant" => Some(OperState::Dormant),
            "notpresent" => Some(OperState::NotPresent),
            "lowerlayerdown" => Some(OperState::LowerLayerDown),
            _ => None,
        }
    }
}

/// One dataplane interface. `None` means the backend could not tell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub kernel_index: Option<u32>,
    pub mtu: Option<u32>,
    /// Link speed in bits per second.
    pub speed: Option<u64>,
    pub mac: Option<[u8; 6]>,
    pub admin_up: Option<bool>,
    pub oper_state: Option<OperState>,
    pub counters: InterfaceCounters,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Interface {
            name: name.into(),
            ..Interface::default()
        }
    }

    /// Software loopback and tap interfaces carry no physical speed.
    pub fn is_virtual(&self) -> bool {
        self.is_loopback() || self.name.starts_with("tap")
    }

    pub fn is_loopback(&self) -> bool {
        self.name == "lo" || self.name.starts_with("loop")
    }
}

/// Source of interface snapshots.
pub trait Dataplane {
    /// Returns every interface, in a stable order, with its current counters.
    fn snapshot(&mut self) -> Result<Vec<Interface>, DataplaneError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oper_state_parse() {
        assert_eq!(OperState::parse("up\n"), Some(OperState::Up));
        assert_eq!(
            OperState::parse("lowerlayerdown"),
            Some(OperState::LowerLayerDown)
        );
        assert_eq!(OperState::parse("sideways"), None);
    }

    #[test]
    fn test_virtual_interfaces() {
        assert!(Interface::new("loop0").is_virtual());
        assert!(Interface::new("lo").is_loopback());
        assert!(Interface::new("tap3").is_virtual());
        assert!(!Interface::new("tap3").is_loopback());
        assert!(!Interface::new("eth0").is_virtual());
    }
}
