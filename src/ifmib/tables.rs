//! IF-MIB column definitions (RFC 2863).
//!
//! Each table is a subtree plus a list of columns; a column maps one
//! interface row to a value. Rows are instantiated as
//! `<subtree>.<column>.<ifIndex>`.

use crate::{
    agentx::{Oid, VarBindValue},
    dataplane::{Interface, OperState},
};

/// ifTable entry: .1.3.6.1.2.1.2.2.1
pub const IF_ENTRY: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1];
/// ifXTable entry: .1.3.6.1.2.1.31.1.1.1
pub const IF_X_ENTRY: &[u32] = &[1, 3, 6, 1, 2, 1, 31, 1, 1, 1];

const IF_TYPE_ETHERNET_CSMACD: i32 = 6;
const IF_TYPE_SOFTWARE_LOOPBACK: i32 = 24;

const STATUS_UP: i32 = 1;
const STATUS_DOWN: i32 = 2;
const STATUS_TESTING: i32 = 3;

const TRUTH_TRUE: i32 = 1;
const TRUTH_FALSE: i32 = 2;

/// Speed reported for loopback and tap interfaces, in bits per second.
const VIRTUAL_SPEED: u64 = 1_000_000_000;

/// One interface as seen by the column functions.
pub struct Row<'a> {
    pub index: u32,
    pub interface: &'a Interface,
    pub alias: &'a str,
}

pub type Column = (u32, fn(&Row) -> VarBindValue);

/// A conceptual table: where it lives and which columns it has.
pub struct Table {
    pub name: &'static str,
    pub entry: &'static [u32],
    pub columns: &'static [Column],
}

impl Table {
    pub fn subtree(&self) -> Oid {
        Oid::from_slice(self.entry)
    }

    pub fn instance(&self, column: u32, index: u32) -> Oid {
        self.subtree().child(&[column, index])
    }
}

pub const IF_TABLE: Table = Table {
    name: "ifTable",
    entry: IF_ENTRY,
    columns: &[
        (1, |r| VarBindValue::Integer(r.index as i32)),
        (2, |r| VarBindValue::OctetString(r.interface.name.as_bytes().to_vec())),
        (3, if_type),
        (4, if_mtu),
        (5, if_speed),
        (6, |r| VarBindValue::OctetString(r.interface.mac.unwrap_or([0; 6]).to_vec())),
        (7, admin_status),
        (8, oper_status),
        (9, |_| VarBindValue::TimeTicks(0)),
        (10, |r| counter32(r.interface.counters.rx_bytes)),
        (11, |r| counter32(r.interface.counters.rx_packets)),
        (12, |r| counter32(r.interface.counters.rx_multicast)),
        (13, |r| counter32(r.interface.counters.rx_dropped)),
        (14, |r| counter32(r.interface.counters.rx_errors)),
        (16, |r| counter32(r.interface.counters.tx_bytes)),
        (17, |r| counter32(r.interface.counters.tx_packets)),
        (18, |r| counter32(r.interface.counters.tx_multicast)),
        (19, |r| counter32(r.interface.counters.tx_dropped)),
        (20, |r| counter32(r.interface.counters.tx_errors)),
    ],
};

pub const IF_X_TABLE: Table = Table {
    name: "ifXTable",
    entry: IF_X_ENTRY,
    columns: &[
        (1, |r| VarBindValue::OctetString(r.interface.name.as_bytes().to_vec())),
        (2, |r| counter32(r.interface.counters.rx_multicast)),
        (3, |r| counter32(r.interface.counters.rx_broadcast)),
        (4, |r| counter32(r.interface.counters.tx_multicast)),
        (5, |r| counter32(r.interface.counters.tx_broadcast)),
        (6, |r| VarBindValue::Counter64(r.interface.counters.rx_bytes)),
        (7, |r| VarBindValue::Counter64(r.interface.counters.rx_packets)),
        (8, |r| VarBindValue::Counter64(r.interface.counters.rx_multicast)),
        (9, |r| VarBindValue::Counter64(r.interface.counters.rx_broadcast)),
        (10, |r| VarBindValue::Counter64(r.interface.counters.tx_bytes)),
        (11, |r| VarBindValue::Counter64(r.interface.counters.tx_packets)),
        (12, |r| VarBindValue::Counter64(r.interface.counters.tx_multicast)),
        (13, |r| VarBindValue::Counter64(r.interface.counters.tx_broadcast)),
        (15, if_high_speed),
        (16, |_| VarBindValue::Integer(TRUTH_FALSE)),
        (17, |_| VarBindValue::Integer(TRUTH_TRUE)),
        (18, |r| VarBindValue::OctetString(r.alias.as_bytes().to_vec())),
        (19, |_| VarBindValue::TimeTicks(0)),
    ],
};

pub const TABLES: &[Table] = &[IF_TABLE, IF_X_TABLE];

/// 32-bit counters wrap modulo 2^32.
fn counter32(value: u64) -> VarBindValue {
    VarBindValue::Counter32(value as u32)
}

fn speed_bps(iface: &Interface) -> Option<u64> {
    if iface.is_virtual() {
        return Some(VIRTUAL_SPEED);
    }
    iface.speed
}

fn if_type(r: &Row) -> VarBindValue {
    if r.interface.is_loopback() {
        VarBindValue::Integer(IF_TYPE_SOFTWARE_LOOPBACK)
    } else {
        VarBindValue::Integer(IF_TYPE_ETHERNET_CSMACD)
    }
}

/// ifMtu is an Integer32; larger kernel values saturate.
fn if_mtu(r: &Row) -> VarBindValue {
    let mtu = r.interface.mtu.unwrap_or(0);
    VarBindValue::Integer(i32::try_from(mtu).unwrap_or(i32::MAX))
}

fn if_speed(r: &Row) -> VarBindValue {
    let speed = speed_bps(r.interface).unwrap_or(0);
    VarBindValue::Gauge32(speed.min(u32::MAX as u64) as u32)
}

fn if_high_speed(r: &Row) -> VarBindValue {
    let mbps = speed_bps(r.interface).unwrap_or(0) / 1_000_000;
    VarBindValue::Gauge32(mbps.min(u32::MAX as u64) as u32)
}

fn admin_status(r: &Row) -> VarBindValue {
    VarBindValue::Integer(match r.interface.admin_up {
        Some(true) => STATUS_UP,
        Some(false) => STATUS_DOWN,
        None => STATUS_TESTING,
    })
}

fn oper_status(r: &Row) -> VarBindValue {
    VarBindValue::Integer(match r.interface.oper_state {
        Some(OperState::Up) => STATUS_UP,
        Some(OperState::Down) => STATUS_DOWN,
        Some(OperState::Testing) | None => STATUS_TESTING,
        Some(OperState::Unknown) => 4,
        Some(OperState::Dormant) => 5,
        Some(OperState::NotPresent) => 6,
        Some(OperState::LowerLayerDown) => 7,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(iface: &Interface) -> Row<'_> {
        Row {
            index: 1000,
            interface: iface,
            alias: "",
        }
    }

    #[test]
    fn test_column_numbers_ascend() {
        for table in TABLES {
            let numbers: Vec<u32> = table.columns.iter().map(|(n, _)| *n).collect();
            let mut sorted = numbers.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(numbers, sorted, "{} columns out of order", table.name);
        }
        assert_eq!(IF_TABLE.columns.len(), 19);
        assert_eq!(IF_X_TABLE.columns.len(), 18);
    }

    #[test]
    fn test_speed_capped() {
        let mut iface = Interface::new("eth0");
        iface.speed = Some(100_000_000_000);
        assert_eq!(if_speed(&row(&iface)), VarBindValue::Gauge32(u32::MAX));
        assert_eq!(if_high_speed(&row(&iface)), VarBindValue::Gauge32(100_000));

        iface.speed = None;
        assert_eq!(if_speed(&row(&iface)), VarBindValue::Gauge32(0));
    }

    #[test]
    fn test_mtu_saturates() {
        let mut iface = Interface::new("eth0");
        assert_eq!(if_mtu(&row(&iface)), VarBindValue::Integer(0));
        iface.mtu = Some(9000);
        assert_eq!(if_mtu(&row(&iface)), VarBindValue::Integer(9000));
        iface.mtu = Some(u32::MAX);
        assert_eq!(if_mtu(&row(&iface)), VarBindValue::Integer(i32::MAX));
    }

    #[test]
    fn test_virtual_speed() {
        let tap = Interface::new("tap0");
        assert_eq!(if_speed(&row(&tap)), VarBindValue::Gauge32(1_000_000_000));
        assert_eq!(if_high_speed(&row(&tap)), VarBindValue::Gauge32(1000));
    }

    #[test]
    fn test_if_type() {
        assert_eq!(
            if_type(&row(&Interface::new("loop0"))),
            VarBindValue::Integer(24)
        );
        assert_eq!(
            if_type(&row(&Interface::new("eth0"))),
            VarBindValue::Integer(6)
        );
    }

    #[test]
    fn test_status_defaults_to_testing() {
        let iface = Interface::new("eth0");
        assert_eq!(admin_status(&row(&iface)), VarBindValue::Integer(3));
        assert_eq!(oper_status(&row(&iface)), VarBindValue::Integer(3));

        let mut iface = Interface::new("eth0");
        iface.admin_up = Some(false);
        iface.oper_state = Some(OperState::LowerLayerDown);
        assert_eq!(admin_status(&row(&iface)), VarBindValue::Integer(2));
        assert_eq!(oper_status(&row(&iface)), VarBindValue::Integer(7));
    }

    #[test]
    fn test_counter32_wraps() {
        assert_eq!(counter32((1u64 << 32) + 5), VarBindValue::Counter32(5));
    }
}
