//! IF-MIB application: publishes dataplane interfaces as `ifTable` and
//! `ifXTable` rows.

pub mod tables;

use crate::{
    agent::{Application, Registrations},
    agentx::{Dataset, DatasetError},
    dataplane::{Dataplane, DataplaneError},
    metadata::Metadata,
};

use tables::{Row, TABLES};

/// ifIndex of the first interface; later ones follow in snapshot order.
pub const IF_INDEX_BASE: u32 = 1000;

/// Errors building the IF-MIB dataset.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Dataplane(#[from] DataplaneError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// [`Application`] serving IF-MIB from a [`Dataplane`].
pub struct IfMibAgent<D: Dataplane> {
    dataplane: D,
    metadata: Metadata,
}

impl<D: Dataplane> IfMibAgent<D> {
    pub fn new(dataplane: D, metadata: Metadata) -> Self {
        IfMibAgent {
            dataplane,
            metadata,
        }
    }

    /// Takes a dataplane snapshot and renders every table row.
    pub fn build_dataset(&mut self) -> Result<Dataset, CollectError> {
        let interfaces = self.dataplane.snapshot()?;
        log::debug!("{} dataplane interfaces retrieved", interfaces.len());

        let mut ds = Dataset::new();
        for (position, interface) in interfaces.iter().enumerate() {
            let index = IF_INDEX_BASE + position as u32;
            let alias = self
                .metadata
                .description(&interface.name)
                .unwrap_or(interface.name.as_str());
            let row = Row {
                index,
                interface,
                alias,
            };

            if interface.mtu.is_none() {
                log::warn!("Could not get MTU for interface {}", interface.name);
            }
            if interface.speed.is_none() && !interface.is_virtual() {
                log::warn!("Could not get link speed for interface {}", interface.name);
            }

            for table in TABLES {
                for (column, value) in table.columns {
                    ds.set(table.instance(*column, index), value(&row))?;
                }
            }
        }
        Ok(ds)
    }
}

impl<D: Dataplane> Application for IfMibAgent<D> {
    type Error = CollectError;

    fn setup(&mut self, registrations: &mut Registrations) -> bool {
        if let Err(e) = self.dataplane.snapshot() {
            log::error!("Can't reach the dataplane, bailing: {}", e);
            return false;
        }
        registrations.register_all(TABLES.iter().map(|table| table.subtree()));
        true
    }

    fn collect(&mut self) -> Result<Dataset, CollectError> {
        self.build_dataset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agentx::{Oid, SearchRange, VarBindValue},
        dataplane::{Interface, OperState},
    };
    use std::path::PathBuf;

    struct FakeDataplane {
        interfaces: Vec<Interface>,
        reachable: bool,
    }

    impl Dataplane for FakeDataplane {
        fn snapshot(&mut self) -> Result<Vec<Interface>, DataplaneError> {
            if !self.reachable {
                return Err(DataplaneError::Unreachable {
                    path: PathBuf::from("/fake"),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            Ok(self.interfaces.clone())
        }
    }

    fn eth0() -> Interface {
        let mut iface = Interface::new("eth0");
        iface.mtu = Some(1500);
        iface.speed = Some(10_000_000_000);
        iface.mac = Some([2, 0, 0, 0, 0, 1]);
        iface.admin_up = Some(true);
        iface.oper_state = Some(OperState::Up);
        iface.counters.rx_bytes = (1 << 32) + 10;
        iface
    }

    fn agent(interfaces: Vec<Interface>) -> IfMibAgent<FakeDataplane> {
        IfMibAgent::new(
            FakeDataplane {
                interfaces,
                reachable: true,
            },
            Metadata::from_yaml("interfaces:\n  eth0:\n    description: Uplink\n").unwrap(),
        )
    }

    fn if_entry(suffix: &[u32]) -> Oid {
        Oid::from_slice(tables::IF_ENTRY).child(suffix)
    }

    fn if_x_entry(suffix: &[u32]) -> Oid {
        Oid::from_slice(tables::IF_X_ENTRY).child(suffix)
    }

    #[test]
    fn test_setup_registers_both_tables() {
        let mut a = agent(vec![eth0()]);
        let mut regs = Registrations::new();
        assert!(a.setup(&mut regs));
        assert_eq!(
            regs.subtrees(),
            &[
                Oid::from([1, 3, 6, 1, 2, 1, 2, 2, 1]),
                Oid::from([1, 3, 6, 1, 2, 1, 31, 1, 1, 1])
            ]
        );
    }

    #[test]
    fn test_setup_fails_when_unreachable() {
        let mut a = agent(Vec::new());
        a.dataplane.reachable = false;
        let mut regs = Registrations::new();
        assert!(!a.setup(&mut regs));
        assert!(regs.is_empty());
    }

    #[test]
    fn test_dataset_rows() {
        let mut a = agent(vec![eth0(), Interface::new("loop0")]);
        let ds = a.collect().unwrap();
        assert_eq!(ds.len(), 2 * (19 + 18));

        assert_eq!(
            ds.value(&if_entry(&[1, 1000])),
            Some(&VarBindValue::Integer(1000))
        );
        assert_eq!(
            ds.value(&if_entry(&[2, 1000])),
            Some(&VarBindValue::OctetString(b"eth0".to_vec()))
        );
        assert_eq!(
            ds.value(&if_entry(&[6, 1000])),
            Some(&VarBindValue::OctetString(vec![2, 0, 0, 0, 0, 1]))
        );
        assert_eq!(
            ds.value(&if_entry(&[10, 1000])),
            Some(&VarBindValue::Counter32(10))
        );
        assert_eq!(
            ds.value(&if_x_entry(&[6, 1000])),
            Some(&VarBindValue::Counter64((1 << 32) + 10))
        );
        assert_eq!(
            ds.value(&if_x_entry(&[18, 1000])),
            Some(&VarBindValue::OctetString(b"Uplink".to_vec()))
        );

        assert_eq!(
            ds.value(&if_entry(&[3, 1001])),
            Some(&VarBindValue::Integer(24))
        );
        assert_eq!(
            ds.value(&if_entry(&[6, 1001])),
            Some(&VarBindValue::OctetString(vec![0; 6]))
        );
        assert_eq!(
            ds.value(&if_x_entry(&[18, 1001])),
            Some(&VarBindValue::OctetString(b"loop0".to_vec()))
        );
    }

    #[test]
    fn test_walk_visits_columns_in_order() {
        let mut a = agent(vec![eth0(), Interface::new("eth1")]);
        let ds = a.collect().unwrap();

        let entry = Oid::from_slice(tables::IF_ENTRY);
        let first = ds.get_next(&SearchRange::new(entry, Oid::empty()));
        assert_eq!(first.oid, if_entry(&[1, 1000]));
        let second = ds.get_next(&SearchRange::new(first.oid, Oid::empty()));
        assert_eq!(second.oid, if_entry(&[1, 1001]));
        let third = ds.get_next(&SearchRange::new(second.oid, Oid::empty()));
        assert_eq!(third.oid, if_entry(&[2, 1000]));
    }

    #[test]
    fn test_collect_fails_when_unreachable() {
        let mut a = agent(vec![eth0()]);
        a.dataplane.reachable = false;
        assert!(matches!(a.collect(), Err(CollectError::Dataplane(_))));
    }
}
