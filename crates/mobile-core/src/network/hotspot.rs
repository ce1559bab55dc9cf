//! Tethering hotspot address discovery

use std::collections::BTreeMap;
use std::net::IpAddr;

use super::platform::InterfaceInfo;

/// Whether an interface name looks like a hotspot/tethering interface
pub fn is_hotspot_interface(name: &str) -> bool {
    name.starts_with("ap") || name.contains("wlan")
}

/// Private-network addresses (RFC 1918, and deprecated IPv6 site-local fec0::/10)
pub fn is_site_local(address: &IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfec0,
    }
}

/// Addresses of the first hotspot interface that has any site-local address
pub fn discover(interfaces: &[InterfaceInfo]) -> BTreeMap<IpAddr, String> {
    interfaces
        .iter()
        .filter(|iface| is_hotspot_interface(&iface.name))
        .map(|iface| {
            iface
                .addresses
                .iter()
                .filter(|a| is_site_local(a))
                .map(|a| (*a, iface.name.clone()))
                .collect::<BTreeMap<_, _>>()
        })
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}
