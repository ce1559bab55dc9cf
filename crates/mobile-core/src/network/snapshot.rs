//! Address snapshots and their diff

use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::config::AddressFamily;

use super::platform::{AddressScope, NetworkId, NetworkPlatform};

/// Local addresses handed to the engine, keyed by address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub addresses: BTreeMap<IpAddr, String>,
    pub active: Option<NetworkId>,
}

impl NetworkSnapshot {
    /// Collect usable addresses from every attached network
    ///
    /// A network contributes only when it has capabilities and link
    /// properties, and (where the platform reports it) the foreground
    /// capability. Addresses must have universe scope, a named interface and a
    /// matching family.
    pub fn collect(platform: &dyn NetworkPlatform, family: AddressFamily) -> Self {
        let check_foreground = platform.reports_foreground_capability();
        let mut addresses = BTreeMap::new();

        for network in platform.all_networks() {
            let Some(caps) = platform.capabilities(network) else {
                continue;
            };
            if check_foreground && !caps.foreground {
                continue;
            }
            let Some(props) = platform.link_properties(network) else {
                continue;
            };
            let Some(interface) = props.interface_name.as_deref() else {
                continue;
            };
            for link in &props.addresses {
                if link.scope == AddressScope::Universe && family.matches(&link.address) {
                    addresses.insert(link.address, interface.to_string());
                }
            }
        }

        Self {
            addresses,
            active: platform.active_network(),
        }
    }

    pub fn merge(&mut self, extra: &BTreeMap<IpAddr, String>) {
        for (address, interface) in extra {
            self.addresses
                .entry(*address)
                .or_insert_with(|| interface.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<(IpAddr, String)>,
    pub removed: Vec<IpAddr>,
}

impl SnapshotDiff {
    /// Address-level difference `old → new`
    ///
    /// An address that moved to a different interface counts as removed and
    /// re-added.
    pub fn between(old: &NetworkSnapshot, new: &NetworkSnapshot) -> Self {
        let removed = old
            .addresses
            .iter()
            .filter(|(address, interface)| new.addresses.get(address) != Some(interface))
            .map(|(address, _)| *address)
            .collect();
        let added = new
            .addresses
            .iter()
            .filter(|(address, interface)| old.addresses.get(address) != Some(interface))
            .map(|(address, interface)| (*address, interface.clone()))
            .collect();
        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot(entries: &[(&str, &str)]) -> NetworkSnapshot {
        NetworkSnapshot {
            addresses: entries
                .iter()
                .map(|(a, i)| (a.parse().unwrap(), i.to_string()))
                .collect(),
            active: None,
        }
    }

    #[test]
    fn test_diff_add_and_remove() {
        let old = snapshot(&[("10.0.0.2", "wlan0"), ("2001:db8::2", "wlan0")]);
        let new = snapshot(&[("10.0.0.2", "wlan0"), ("100.64.0.7", "rmnet0")]);
        let diff = SnapshotDiff::between(&old, &new);
        assert_eq!(diff.added, vec![("100.64.0.7".parse().unwrap(), "rmnet0".to_string())]);
        assert_eq!(diff.removed, vec!["2001:db8::2".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_interface_move_is_remove_plus_add() {
        let old = snapshot(&[("10.0.0.2", "wlan0")]);
        let new = snapshot(&[("10.0.0.2", "wlan1")]);
        let diff = SnapshotDiff::between(&old, &new);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.added.len(), 1);
    }

    const INTERFACES: [&str; 3] = ["wlan0", "rmnet0", "ap0"];

    fn addresses() -> impl Strategy<Value = BTreeMap<IpAddr, String>> {
        proptest::collection::btree_map(0u8..8, 0usize..INTERFACES.len(), 0..6).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(host, iface)| (IpAddr::from([10, 0, 0, host]), INTERFACES[iface].to_string()))
                .collect()
        })
    }

    fn apply(snapshot: &NetworkSnapshot, diff: &SnapshotDiff) -> NetworkSnapshot {
        let mut next = snapshot.clone();
        for address in &diff.removed {
            next.addresses.remove(address);
        }
        for (address, interface) in &diff.added {
            next.addresses.insert(*address, interface.clone());
        }
        next
    }

    proptest! {
        #[test]
        fn test_round_trip_converges(a in addresses(), b in addresses()) {
            let a = NetworkSnapshot { addresses: a, active: None };
            let b = NetworkSnapshot { addresses: b, active: None };

            let there = SnapshotDiff::between(&a, &b);
            let back = SnapshotDiff::between(&b, &a);
            prop_assert_eq!(there.added.len() + back.added.len(), there.removed.len() + back.removed.len());
            prop_assert_eq!(&apply(&a, &there), &b);
            prop_assert_eq!(apply(&apply(&a, &there), &back), a.clone());
            prop_assert!(SnapshotDiff::between(&a, &a).is_empty());
        }
    }

    #[test]
    fn test_merge_keeps_existing_interface() {
        let mut snap = snapshot(&[("192.168.43.1", "wlan0")]);
        let extra = snapshot(&[("192.168.43.1", "ap0"), ("192.168.44.1", "ap0")]);
        snap.merge(&extra.addresses);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.addresses[&"192.168.43.1".parse::<IpAddr>().unwrap()], "wlan0");
    }
}
