//! Resolver list derived from attached networks

use std::net::{IpAddr, SocketAddr};

use super::platform::NetworkPlatform;

pub const DNS_PORT: u16 = 53;

/// Ordered, de-duplicated resolver addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsServerList(Vec<IpAddr>);

impl DnsServerList {
    pub fn new(servers: impl IntoIterator<Item = IpAddr>) -> Self {
        let mut list = Self::default();
        for server in servers {
            list.push(server);
        }
        list
    }

    /// Active network's resolvers first, then every other network's
    pub fn collect(platform: &dyn NetworkPlatform) -> Self {
        let active = platform.active_network();
        let mut list = Self::default();

        if let Some(props) = active.and_then(|id| platform.link_properties(id)) {
            props.dns_servers.into_iter().for_each(|s| list.push(s));
        }
        for network in platform.all_networks() {
            if Some(network) == active {
                continue;
            }
            if let Some(props) = platform.link_properties(network) {
                props.dns_servers.into_iter().for_each(|s| list.push(s));
            }
        }
        list
    }

    fn push(&mut self, server: IpAddr) {
        if !self.0.contains(&server) {
            self.0.push(server);
        }
    }

    pub fn servers(&self) -> &[IpAddr] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolver endpoints as handed to the engine
    pub fn socket_addrs(&self) -> Vec<SocketAddr> {
        self.0.iter().map(|ip| SocketAddr::new(*ip, DNS_PORT)).collect()
    }

    /// Engine's textual form: `ip:53` / `[ip6]:53`, comma separated
    pub fn to_engine_string(&self) -> String {
        self.socket_addrs()
            .iter()
            .map(|addr| addr.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_preserves_order() {
        let list = DnsServerList::new(
            ["8.8.8.8", "1.1.1.1", "8.8.8.8", "2001:4860:4860::8888"]
                .iter()
                .map(|s| s.parse().unwrap()),
        );
        assert_eq!(list.servers().len(), 3);
        assert_eq!(list.servers()[0], "8.8.8.8".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_engine_string_brackets_ipv6() {
        let list = DnsServerList::new(
            ["192.168.1.1", "fd00::1"].iter().map(|s| s.parse().unwrap()),
        );
        assert_eq!(list.to_engine_string(), "192.168.1.1:53,[fd00::1]:53");
    }
}
