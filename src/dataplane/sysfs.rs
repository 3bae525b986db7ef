//! Linux `/sys/class/net` backend.

use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use super::{Dataplane, DataplaneError, Interface, InterfaceCounters, OperState};

const IFF_UP: u32 = 0x1;

/// Reads interfaces from a sysfs `class/net` directory.
pub struct SysfsDataplane {
    root: PathBuf,
}

impl SysfsDataplane {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SysfsDataplane { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_interface(&self, name: &str) -> Interface {
        let dir = self.root.join(name);
        let mut iface = Interface::new(name);

        iface.kernel_index = lookup(&dir, name, "ifindex", parse_number);
        iface.mtu = lookup(&dir, name, "mtu", parse_number);
        // Mb/s in sysfs; -1 or EINVAL when the link has no speed.
        iface.speed = lookup(&dir, name, "speed", |s| {
            s.parse::<i64>()
                .ok()
                .filter(|mbps| *mbps >= 0)
                .map(|mbps| mbps as u64 * 1_000_000)
        });
        iface.mac = lookup(&dir, name, "address", parse_mac);
        iface.admin_up = lookup(&dir, name, "flags", |s| {
            u32::from_str_radix(s.trim_start_matches("0x"), 16)
                .ok()
                .map(|flags| flags & IFF_UP != 0)
        });
        iface.oper_state = lookup(&dir, name, "operstate", OperState::parse);
        iface.counters = read_counters(&dir.join("statistics"));

        iface
    }
}

impl Dataplane for SysfsDataplane {
    fn snapshot(&mut self) -> Result<Vec<Interface>, DataplaneError> {
        let entries = fs::read_dir(&self.root).map_err(|source| DataplaneError::Unreachable {
            path: self.root.clone(),
            source,
        })?;

        let mut interfaces: Vec<Interface> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .map(|name| self.read_interface(&name))
            .collect();

        interfaces.sort_by(|a, b| {
            a.kernel_index
                .unwrap_or(u32::MAX)
                .cmp(&b.kernel_index.unwrap_or(u32::MAX))
                .then_with(|| a.name.cmp(&b.name))
        });

        log::debug!(
            "{} interfaces retrieved from {}",
            interfaces.len(),
            self.root.display()
        );
        Ok(interfaces)
    }
}

/// Reads and parses one attribute, logging a lookup miss when it fails.
fn lookup<T>(
    dir: &Path,
    interface: &str,
    attribute: &'static str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Option<T> {
    let value = read_attribute(&dir.join(attribute))
        .ok()
        .and_then(|raw| parse(raw.trim()));
    if value.is_none() {
        let miss = DataplaneError::LookupMiss {
            interface: interface.to_string(),
            attribute,
        };
        log::debug!("{}", miss);
    }
    value
}

fn read_attribute(path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
}

fn parse_number<T: FromStr>(s: &str) -> Option<T> {
    s.parse().ok()
}

fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = s.split(':');
    for octet in mac.iter_mut() {
        *octet = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

/// Missing counter files read as zero; not every driver exposes all of them.
fn read_counters(dir: &Path) -> InterfaceCounters {
    let counter = |file: &str| {
        read_attribute(&dir.join(file))
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0)
    };

    InterfaceCounters {
        rx_bytes: counter("rx_bytes"),
        rx_packets: counter("rx_packets"),
        rx_multicast: counter("multicast"),
        rx_broadcast: counter("rx_broadcast"),
        rx_dropped: counter("rx_dropped"),
        rx_errors: counter("rx_errors"),
        tx_bytes: counter("tx_bytes"),
        tx_packets: counter("tx_packets"),
        tx_multicast: counter("tx_multicast"),
        tx_broadcast: counter("tx_broadcast"),
        tx_dropped: counter("tx_dropped"),
        tx_errors: counter("tx_errors"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_iface(root: &Path, name: &str, attrs: &[(&str, &str)]) {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("statistics")).unwrap();
        for (file, content) in attrs {
            fs::write(dir.join(file), format!("{}\n", content)).unwrap();
        }
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(
            parse_mac("aa:bb:cc:00:11:ff"),
            Some([0xaa, 0xbb, 0xcc, 0x00, 0x11, 0xff])
        );
        assert_eq!(parse_mac("aa:bb:cc"), None);
        assert_eq!(parse_mac("aa:bb:cc:00:11:ff:00"), None);
        assert_eq!(parse_mac("zz:bb:cc:00:11:ff"), None);
    }

    #[test]
    fn test_snapshot_reads_attributes() {
        let root = tempfile::tempdir().unwrap();
        write_iface(
            root.path(),
            "eth0",
            &[
                ("ifindex", "2"),
                ("mtu", "9000"),
                ("speed", "10000"),
                ("address", "02:00:00:00:00:01"),
                ("flags", "0x1003"),
                ("operstate", "up"),
                ("statistics/rx_bytes", "1234"),
                ("statistics/multicast", "7"),
                ("statistics/tx_errors", "3"),
            ],
        );

        let mut dp = SysfsDataplane::new(root.path());
        let ifaces = dp.snapshot().unwrap();
        assert_eq!(ifaces.len(), 1);
        let eth0 = &ifaces[0];
        assert_eq!(eth0.name, "eth0");
        assert_eq!(eth0.kernel_index, Some(2));
        assert_eq!(eth0.mtu, Some(9000));
        assert_eq!(eth0.speed, Some(10_000_000_000));
        assert_eq!(eth0.mac, Some([2, 0, 0, 0, 0, 1]));
        assert_eq!(eth0.admin_up, Some(true));
        assert_eq!(eth0.oper_state, Some(OperState::Up));
        assert_eq!(eth0.counters.rx_bytes, 1234);
        assert_eq!(eth0.counters.rx_multicast, 7);
        assert_eq!(eth0.counters.tx_errors, 3);
        assert_eq!(eth0.counters.tx_bytes, 0);
    }

    #[test]
    fn test_snapshot_orders_by_ifindex() {
        let root = tempfile::tempdir().unwrap();
        write_iface(root.path(), "eth1", &[("ifindex", "3")]);
        write_iface(root.path(), "lo", &[("ifindex", "1")]);
        write_iface(root.path(), "eth0", &[("ifindex", "2")]);
        write_iface(root.path(), "orphan", &[]);

        let names: Vec<String> = SysfsDataplane::new(root.path())
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["lo", "eth0", "eth1", "orphan"]);
    }

    #[test]
    fn test_missing_attributes_are_unset() {
        let root = tempfile::tempdir().unwrap();
        write_iface(
            root.path(),
            "tap0",
            &[("speed", "-1"), ("flags", "0x1002"), ("operstate", "weird")],
        );

        let ifaces = SysfsDataplane::new(root.path()).snapshot().unwrap();
        let tap = &ifaces[0];
        assert_eq!(tap.speed, None);
        assert_eq!(tap.mtu, None);
        assert_eq!(tap.mac, None);
        assert_eq!(tap.admin_up, Some(false));
        assert_eq!(tap.oper_state, None);
    }

    #[test]
    fn test_unreachable_root() {
        let root = tempfile::tempdir().unwrap();
        let mut dp = SysfsDataplane::new(root.path().join("missing"));
        assert!(matches!(
            dp.snapshot(),
            Err(DataplaneError::Unreachable { .. })
        ));
    }
}
