//! Platform network primitives
//!
//! The OS connectivity layer is reached through [`NetworkPlatform`]. Calls
//! are synchronous snapshots of platform state. Change notifications arrive
//! separately, as [`NetworkNotification`]s on the coordinator's platform
//! channel.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Platform identifier of an attached network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net#{}", self.0)
    }
}

/// Routing scope of a link address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressScope {
    /// Globally routable (includes private ranges on the local link)
    Universe,
    Link,
    Host,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAddress {
    pub address: IpAddr,
    pub scope: AddressScope,
}

impl LinkAddress {
    pub fn universe(address: IpAddr) -> Self {
        Self { address, scope: AddressScope::Universe }
    }

    pub fn link_local(address: IpAddr) -> Self {
        Self { address, scope: AddressScope::Link }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkProperties {
    pub interface_name: Option<String>,
    pub addresses: Vec<LinkAddress>,
    pub dns_servers: Vec<IpAddr>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCapabilities {
    /// Network is usable by a foreground app
    pub foreground: bool,
    /// Network runs over Wi-Fi transport
    pub wifi: bool,
}

/// A local interface as enumerated by the OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

/// Connectivity change reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkNotification {
    Available(NetworkId),
    /// About to be lost; informational only
    Losing(NetworkId),
    Lost(NetworkId),
    CapabilitiesChanged(NetworkId),
    LinkPropertiesChanged(NetworkId),
    HotspotChanged { enabled: bool },
}

impl NetworkNotification {
    pub fn name(&self) -> &'static str {
        match self {
            NetworkNotification::Available(_) => "available",
            NetworkNotification::Losing(_) => "losing",
            NetworkNotification::Lost(_) => "lost",
            NetworkNotification::CapabilitiesChanged(_) => "capabilities_changed",
            NetworkNotification::LinkPropertiesChanged(_) => "link_properties_changed",
            NetworkNotification::HotspotChanged { .. } => "hotspot_changed",
        }
    }
}

/// Read access to OS connectivity state plus the Wi-Fi performance lock
pub trait NetworkPlatform: Send + Sync {
    fn active_network(&self) -> Option<NetworkId>;

    /// Every currently attached network
    fn all_networks(&self) -> Vec<NetworkId>;

    fn link_properties(&self, network: NetworkId) -> Option<LinkProperties>;

    fn capabilities(&self, network: NetworkId) -> Option<NetworkCapabilities>;

    fn interfaces(&self) -> Vec<InterfaceInfo>;

    fn hotspot_enabled(&self) -> bool;

    /// Whether the platform reports the foreground capability at all
    ///
    /// Older platforms do not; their networks are never filtered on it.
    fn reports_foreground_capability(&self) -> bool;

    fn acquire_performance_lock(&self);

    fn release_performance_lock(&self);
}
