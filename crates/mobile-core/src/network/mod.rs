//! Network mobility
//!
//! Keeps the engine's local address set, transport bindings and resolver list
//! in line with whatever networks the device is attached to. All inputs end up
//! in one entry point, [`NetworkMobilityManager::reconcile`]. The inputs are
//! network notifications, hotspot transitions and their deferred timers.
//!
//! A pass runs in four steps:
//!
//! 1. Recompute DNS servers (dynamic mode, or while stopped) and apply them on change
//! 2. Collect the address snapshot from every attached network, plus hotspot addresses
//! 3. Push the diff to the engine, one `remove_address` / `add_address` per entry
//! 4. Reset the transport if the engine's addresses or the active network changed,
//!    then follow Wi-Fi with the performance lock
//!
//! Passes are single-flight. Triggers only mark the manager as pending, and
//! the coordinator runs one pass after draining every queued notification.

pub mod dns;
pub mod hotspot;
pub mod platform;
pub mod snapshot;

use std::collections::BTreeMap;
use std::net::IpAddr;

use tracing::{debug, info, warn};

use crate::config::{DnsMode, NetworkSettings};
use crate::engine::SipEngine;
use crate::timer::{TimerKind, Timers};

pub use dns::DnsServerList;
pub use platform::{
    AddressScope, InterfaceInfo, LinkAddress, LinkProperties, NetworkCapabilities, NetworkId,
    NetworkNotification, NetworkPlatform,
};
pub use snapshot::{NetworkSnapshot, SnapshotDiff};

/// Result of a single reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub removed: usize,
    pub failures: usize,
    pub transport_reset: bool,
    pub dns_changed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MobilityStats {
    pub passes: u64,
    /// Triggers absorbed by an already pending pass
    pub coalesced: u64,
    pub transport_resets: u64,
    pub address_failures: u64,
}

#[derive(Debug, Default)]
struct HotspotState {
    enabled: bool,
    addresses: BTreeMap<IpAddr, String>,
}

#[derive(Debug)]
pub struct NetworkMobilityManager {
    settings: NetworkSettings,
    running: bool,
    snapshot: NetworkSnapshot,
    dns: DnsServerList,
    hotspot: HotspotState,
    lock_held: bool,
    pending: bool,
    /// Engine addresses changed outside a pass (hotspot handling)
    dirty: bool,
    stats: MobilityStats,
}

impl NetworkMobilityManager {
    pub fn new(settings: NetworkSettings) -> Self {
        Self {
            settings,
            running: false,
            snapshot: NetworkSnapshot::default(),
            dns: DnsServerList::default(),
            hotspot: HotspotState::default(),
            lock_held: false,
            pending: false,
            dirty: false,
            stats: MobilityStats::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn snapshot(&self) -> &NetworkSnapshot {
        &self.snapshot
    }

    pub fn dns_servers(&self) -> &DnsServerList {
        &self.dns
    }

    pub fn lock_held(&self) -> bool {
        self.lock_held
    }

    pub fn hotspot_enabled(&self) -> bool {
        self.hotspot.enabled
    }

    pub fn hotspot_addresses(&self) -> &BTreeMap<IpAddr, String> {
        &self.hotspot.addresses
    }

    pub fn stats(&self) -> MobilityStats {
        self.stats
    }

    /// Mark the session running; applies a static resolver list once
    ///
    /// A hotspot that is already on is picked up here, so the first pass
    /// registers its addresses.
    pub async fn start(&mut self, platform: &dyn NetworkPlatform, engine: &dyn SipEngine) {
        self.running = true;
        self.hotspot.enabled = platform.hotspot_enabled();
        if self.hotspot.enabled {
            self.hotspot.addresses = hotspot::discover(&platform.interfaces());
            info!(addresses = self.hotspot.addresses.len(), "Hotspot already enabled");
        }
        if let DnsMode::Static(servers) = &self.settings.dns {
            let list = DnsServerList::new(servers.iter().copied());
            match engine.set_dns_servers(&list.socket_addrs()).await {
                Ok(()) => {
                    info!(servers = %list.to_engine_string(), "Applied static DNS servers");
                    self.dns = list;
                }
                Err(e) => warn!(error = %e, "Failed to apply static DNS servers"),
            }
        }
    }

    /// Stop reacting to notifications and drop the performance lock
    pub fn stop(&mut self, platform: &dyn NetworkPlatform) {
        self.running = false;
        self.pending = false;
        self.release_lock(platform);
    }

    pub fn release_lock(&mut self, platform: &dyn NetworkPlatform) {
        if self.lock_held {
            platform.release_performance_lock();
            self.lock_held = false;
            debug!("Released network performance lock");
        }
    }

    /// Record a connectivity notification; hotspot transitions go through
    /// [`on_hotspot_changed`](Self::on_hotspot_changed) instead
    pub fn observe(&mut self, notification: &NetworkNotification) {
        match notification {
            NetworkNotification::Losing(id) => {
                info!(network = %id, "Network is about to be lost");
            }
            NetworkNotification::HotspotChanged { .. } => {
                debug!("Hotspot change must be routed to on_hotspot_changed");
            }
            other => {
                debug!(notification = other.name(), "Network notification");
                if self.running {
                    self.request();
                }
            }
        }
    }

    /// Ask for a reconciliation pass
    pub fn request(&mut self) {
        if self.pending {
            self.stats.coalesced += 1;
        }
        self.pending = true;
    }

    /// Consume the pending flag; `true` means a pass should run now
    pub fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    /// Run one reconciliation pass against the current platform state
    pub async fn reconcile(
        &mut self,
        platform: &dyn NetworkPlatform,
        engine: &dyn SipEngine,
    ) -> ReconcileOutcome {
        self.stats.passes += 1;
        let mut outcome = ReconcileOutcome::default();

        outcome.dns_changed = self.update_dns(platform, engine).await;

        let mut next = NetworkSnapshot::collect(platform, self.settings.address_family);
        if self.hotspot.enabled {
            next.merge(&self.hotspot_matching());
        }
        let diff = SnapshotDiff::between(&self.snapshot, &next);

        // Removals first: an address that moved interfaces is in both lists
        let mut failed_removes = Vec::new();
        for address in &diff.removed {
            match engine.remove_address(*address).await {
                Ok(()) => outcome.removed += 1,
                Err(e) => {
                    outcome.failures += 1;
                    failed_removes.push(*address);
                    warn!(operation = "remove_address", %address, error = %e, "Failed to remove address");
                }
            }
        }
        for (address, interface) in &diff.added {
            match engine.add_address(*address, interface).await {
                Ok(()) => outcome.added += 1,
                Err(e) => {
                    outcome.failures += 1;
                    next.addresses.remove(address);
                    warn!(operation = "add_address", %address, %interface, error = %e, "Failed to add address");
                }
            }
        }
        self.stats.address_failures += outcome.failures as u64;

        // The stored snapshot mirrors the engine, so failed entries are retried next pass
        for address in failed_removes {
            if let Some(interface) = self.snapshot.addresses.get(&address) {
                next.addresses.entry(address).or_insert_with(|| interface.clone());
            }
        }

        let active_changed = next.active != self.snapshot.active;
        let dirty = std::mem::take(&mut self.dirty);
        if outcome.added > 0 || outcome.removed > 0 || active_changed || dirty {
            info!(
                added = outcome.added,
                removed = outcome.removed,
                active = ?next.active,
                active_changed,
                "Network changed, resetting transport"
            );
            if let Err(e) = engine.reset_transport(true, true).await {
                warn!(operation = "reset_transport", error = %e, "Transport reset failed");
            }
            outcome.transport_reset = true;
            self.stats.transport_resets += 1;
        }

        let wifi = next
            .active
            .and_then(|id| platform.capabilities(id))
            .is_some_and(|caps| caps.wifi);
        self.snapshot = next;
        self.follow_wifi(platform, wifi);

        debug!(?outcome, "Reconciliation pass complete");
        outcome
    }

    /// React to a hotspot transition
    ///
    /// Enabling only arms the debounce timer. Disabling removes the known
    /// hotspot addresses right away and requests a pass.
    pub async fn on_hotspot_changed(&mut self, enabled: bool, engine: &dyn SipEngine, timers: &mut Timers) {
        if enabled == self.hotspot.enabled {
            debug!(enabled, "Hotspot state unchanged");
            return;
        }
        self.hotspot.enabled = enabled;

        if enabled {
            info!("Hotspot enabled");
            timers.cancel_kind(TimerKind::HotspotDebounce);
            timers.schedule_once(TimerKind::HotspotDebounce, self.settings.hotspot_debounce);
            return;
        }

        info!(addresses = self.hotspot.addresses.len(), "Hotspot disabled");
        timers.cancel_kind(TimerKind::HotspotDebounce);
        timers.cancel_kind(TimerKind::HotspotFollowUp);
        for address in std::mem::take(&mut self.hotspot.addresses).into_keys() {
            if let Err(e) = engine.remove_address(address).await {
                warn!(operation = "remove_address", %address, error = %e, "Failed to remove hotspot address");
            }
            self.snapshot.addresses.remove(&address);
            self.dirty = true;
        }
        if self.running {
            self.request();
        }
    }

    /// Debounce elapsed: enumerate hotspot interfaces and add their addresses
    pub async fn on_hotspot_debounce(
        &mut self,
        platform: &dyn NetworkPlatform,
        engine: &dyn SipEngine,
        timers: &mut Timers,
    ) {
        if !self.hotspot.enabled {
            return;
        }
        let found = hotspot::discover(&platform.interfaces());
        if found.is_empty() {
            warn!("Hotspot enabled but no hotspot addresses found");
            return;
        }

        let mut added = 0;
        for (address, interface) in found {
            if !self.settings.address_family.matches(&address) {
                continue;
            }
            match engine.add_address(address, &interface).await {
                Ok(()) => {
                    info!(%address, %interface, "Added hotspot address");
                    self.snapshot.addresses.insert(address, interface.clone());
                    self.hotspot.addresses.insert(address, interface);
                    added += 1;
                }
                Err(e) => {
                    warn!(operation = "add_address", %address, %interface, error = %e, "Failed to add hotspot address");
                }
            }
        }

        if added > 0 {
            self.dirty = true;
            timers.schedule_once(TimerKind::HotspotFollowUp, self.settings.hotspot_follow_up);
        }
    }

    async fn update_dns(&mut self, platform: &dyn NetworkPlatform, engine: &dyn SipEngine) -> bool {
        if self.running && !self.settings.dns.is_dynamic() {
            return false;
        }
        let servers = match &self.settings.dns {
            DnsMode::Dynamic => DnsServerList::collect(platform),
            DnsMode::Static(list) => DnsServerList::new(list.iter().copied()),
        };
        if servers == self.dns {
            return false;
        }
        if self.running {
            if let Err(e) = engine.set_dns_servers(&servers.socket_addrs()).await {
                warn!(
                    operation = "set_dns_servers",
                    servers = %servers.to_engine_string(),
                    error = %e,
                    "Failed to update DNS servers, keeping previous list"
                );
                return false;
            }
        }
        info!(servers = %servers.to_engine_string(), "DNS servers updated");
        self.dns = servers;
        true
    }

    fn hotspot_matching(&self) -> BTreeMap<IpAddr, String> {
        self.hotspot
            .addresses
            .iter()
            .filter(|(address, _)| self.settings.address_family.matches(address))
            .map(|(a, i)| (*a, i.clone()))
            .collect()
    }

    fn follow_wifi(&mut self, platform: &dyn NetworkPlatform, wifi: bool) {
        if wifi && !self.lock_held {
            platform.acquire_performance_lock();
            self.lock_held = true;
            debug!("Acquired network performance lock");
        } else if !wifi {
            self.release_lock(platform);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AddressFamily;
    use crate::mock::{EngineOp, MockEngine, MockNetworkPlatform};
    use proptest::prelude::*;

    fn wifi_platform() -> MockNetworkPlatform {
        let platform = MockNetworkPlatform::new();
        platform.attach_network(
            NetworkId(1),
            "wlan0",
            &["10.0.0.5", "fe80::5"],
            &["192.168.1.1"],
            true,
        );
        platform.set_active(Some(NetworkId(1)));
        platform
    }

    async fn running_manager(
        settings: NetworkSettings,
        platform: &MockNetworkPlatform,
        engine: &MockEngine,
    ) -> NetworkMobilityManager {
        let mut manager = NetworkMobilityManager::new(settings);
        manager.start(platform, engine).await;
        manager
    }

    #[tokio::test]
    async fn test_first_pass_adds_and_resets_once() {
        let engine = MockEngine::new();
        let platform = wifi_platform();
        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;

        let outcome = manager.reconcile(&platform, &engine).await;
        assert_eq!(outcome.added, 1);
        assert!(outcome.transport_reset);
        assert!(outcome.dns_changed);
        assert!(manager.lock_held());
        assert_eq!(engine.count(|op| matches!(op, EngineOp::ResetTransport { .. })), 1);

        // Nothing changed: no engine traffic at all
        engine.clear_ops();
        let outcome = manager.reconcile(&platform, &engine).await;
        assert_eq!(outcome, ReconcileOutcome::default());
        assert!(engine.ops().is_empty());
    }

    #[tokio::test]
    async fn test_a_b_a_converges() {
        let engine = MockEngine::new();
        let platform = wifi_platform();
        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;
        manager.reconcile(&platform, &engine).await;
        engine.clear_ops();

        // Switch to cellular
        platform.detach_network(NetworkId(1));
        platform.attach_network(NetworkId(2), "rmnet0", &["100.64.0.9", "2001:db8::9"], &["8.8.8.8"], false);
        platform.set_active(Some(NetworkId(2)));
        manager.reconcile(&platform, &engine).await;
        assert!(!manager.lock_held());

        // And back
        platform.detach_network(NetworkId(2));
        platform.attach_network(NetworkId(1), "wlan0", &["10.0.0.5", "fe80::5"], &["192.168.1.1"], true);
        platform.set_active(Some(NetworkId(1)));
        manager.reconcile(&platform, &engine).await;

        let adds = engine.count(|op| matches!(op, EngineOp::AddAddress { .. }));
        let removes = engine.count(|op| matches!(op, EngineOp::RemoveAddress { .. }));
        assert_eq!(adds, removes);
        assert_eq!(manager.snapshot().len(), 1);
        assert!(manager.lock_held());
    }

    /// Hosts of 10.0.0.0/24 on Wi-Fi (`true`) or cellular (`false`)
    fn attach_split(platform: &MockNetworkPlatform, hosts: &BTreeMap<u8, bool>) {
        for (id, interface, wifi) in [(NetworkId(1), "wlan0", true), (NetworkId(2), "rmnet0", false)] {
            let list: Vec<String> = hosts
                .iter()
                .filter(|(_, on_wifi)| **on_wifi == wifi)
                .map(|(host, _)| format!("10.0.0.{}", host))
                .collect();
            let refs: Vec<&str> = list.iter().map(String::as_str).collect();
            platform.attach_network(id, interface, &refs, &[], wifi);
        }
        platform.set_active(Some(NetworkId(1)));
    }

    proptest! {
        #[test]
        fn test_a_b_a_converges_for_any_address_sets(
            a in proptest::collection::btree_map(0u8..8, any::<bool>(), 0..6),
            b in proptest::collection::btree_map(0u8..8, any::<bool>(), 0..6),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let engine = MockEngine::new();
                let platform = MockNetworkPlatform::new();
                attach_split(&platform, &a);
                let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;
                manager.reconcile(&platform, &engine).await;
                let first = manager.snapshot().clone();
                engine.clear_ops();

                attach_split(&platform, &b);
                manager.reconcile(&platform, &engine).await;
                attach_split(&platform, &a);
                manager.reconcile(&platform, &engine).await;

                let adds = engine.count(|op| matches!(op, EngineOp::AddAddress { .. }));
                let removes = engine.count(|op| matches!(op, EngineOp::RemoveAddress(_)));
                assert_eq!(adds, removes);
                assert_eq!(manager.snapshot(), &first);
            });
        }
    }

    #[tokio::test]
    async fn test_address_family_filter() {
        let engine = MockEngine::new();
        let platform = MockNetworkPlatform::new();
        platform.attach_network(NetworkId(3), "rmnet0", &["100.64.0.9", "2001:db8::9"], &[], false);
        platform.set_active(Some(NetworkId(3)));

        let settings = NetworkSettings {
            address_family: AddressFamily::Ipv6Only,
            ..NetworkSettings::default()
        };
        let mut manager = running_manager(settings, &platform, &engine).await;
        manager.reconcile(&platform, &engine).await;
        let addresses: Vec<_> = manager.snapshot().addresses.keys().copied().collect();
        assert_eq!(addresses, vec!["2001:db8::9".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_foreground_filter_only_where_reported() {
        let engine = MockEngine::new();
        let platform = wifi_platform();
        platform.set_foreground(NetworkId(1), false);

        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;
        manager.reconcile(&platform, &engine).await;
        assert!(manager.snapshot().is_empty());

        platform.set_reports_foreground(false);
        manager.reconcile(&platform, &engine).await;
        assert_eq!(manager.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_add_does_not_abort_pass() {
        let engine = MockEngine::new();
        engine.fail_add_address("10.0.0.5".parse().unwrap());
        let platform = wifi_platform();
        platform.add_link_address(NetworkId(1), "10.0.0.6");

        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;
        let outcome = manager.reconcile(&platform, &engine).await;
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.failures, 1);
        assert!(outcome.transport_reset);
        assert_eq!(manager.stats().address_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_add_is_retried_next_pass() {
        let engine = MockEngine::new();
        let address: IpAddr = "10.0.0.5".parse().unwrap();
        engine.fail_add_address(address);
        let platform = wifi_platform();
        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;

        let outcome = manager.reconcile(&platform, &engine).await;
        assert_eq!(outcome.failures, 1);
        assert!(!manager.snapshot().addresses.contains_key(&address));

        // Still failing and nothing else moved: no reset for an unchanged engine
        let outcome = manager.reconcile(&platform, &engine).await;
        assert_eq!(outcome.failures, 1);
        assert!(!outcome.transport_reset);

        engine.heal_addresses();
        engine.clear_ops();
        let outcome = manager.reconcile(&platform, &engine).await;
        assert_eq!(outcome.added, 1);
        assert!(outcome.transport_reset);
        assert!(manager.snapshot().addresses.contains_key(&address));
        assert_eq!(
            engine.ops(),
            vec![
                EngineOp::AddAddress { address, interface: "wlan0".into() },
                EngineOp::ResetTransport { register: true, reinvite: true },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_remove_is_retried_next_pass() {
        let engine = MockEngine::new();
        let address: IpAddr = "10.0.0.5".parse().unwrap();
        let platform = wifi_platform();
        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;
        manager.reconcile(&platform, &engine).await;

        engine.fail_remove_address(address);
        platform.attach_network(NetworkId(1), "wlan0", &["10.0.0.6"], &["192.168.1.1"], true);
        let outcome = manager.reconcile(&platform, &engine).await;
        assert_eq!((outcome.added, outcome.failures), (1, 1));
        assert!(manager.snapshot().addresses.contains_key(&address));

        engine.heal_addresses();
        engine.clear_ops();
        let outcome = manager.reconcile(&platform, &engine).await;
        assert_eq!(outcome.removed, 1);
        assert_eq!(engine.count(|op| matches!(op, EngineOp::RemoveAddress(a) if *a == address)), 1);
        assert_eq!(manager.snapshot().len(), 1);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_failed_remove_is_logged() {
        let engine = MockEngine::new();
        let platform = wifi_platform();
        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;
        manager.reconcile(&platform, &engine).await;

        engine.fail_remove_address("10.0.0.5".parse().unwrap());
        platform.detach_network(NetworkId(1));
        let outcome = manager.reconcile(&platform, &engine).await;
        assert_eq!(outcome.failures, 1);
        assert!(outcome.transport_reset);
        assert!(!manager.lock_held());
        assert!(logs_contain("Failed to remove address"));
    }

    #[tokio::test]
    async fn test_dns_failure_keeps_previous_list() {
        let engine = MockEngine::new();
        let platform = wifi_platform();
        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;
        manager.reconcile(&platform, &engine).await;
        let before = manager.dns_servers().clone();

        platform.set_dns(NetworkId(1), &["9.9.9.9"]);
        engine.fail_dns(true);
        let outcome = manager.reconcile(&platform, &engine).await;
        assert!(!outcome.dns_changed);
        assert_eq!(manager.dns_servers(), &before);

        engine.fail_dns(false);
        assert!(manager.reconcile(&platform, &engine).await.dns_changed);
    }

    #[tokio::test]
    async fn test_static_dns_is_not_recomputed_while_running() {
        let engine = MockEngine::new();
        let platform = wifi_platform();
        let settings = NetworkSettings {
            dns: DnsMode::Static(vec!["1.1.1.1".parse().unwrap()]),
            ..NetworkSettings::default()
        };
        let mut manager = running_manager(settings, &platform, &engine).await;
        assert_eq!(engine.count(|op| matches!(op, EngineOp::SetDnsServers(_))), 1);

        let outcome = manager.reconcile(&platform, &engine).await;
        assert!(!outcome.dns_changed);
        assert_eq!(manager.dns_servers().servers(), &["1.1.1.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_notifications_coalesce() {
        let engine = MockEngine::new();
        let platform = MockNetworkPlatform::new();
        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;
        manager.observe(&NetworkNotification::Available(NetworkId(1)));
        manager.observe(&NetworkNotification::LinkPropertiesChanged(NetworkId(1)));
        manager.observe(&NetworkNotification::Losing(NetworkId(1)));
        assert!(manager.take_pending());
        assert!(!manager.take_pending());
        assert_eq!(manager.stats().coalesced, 1);
    }

    #[tokio::test]
    async fn test_not_running_ignores_notifications() {
        let mut manager = NetworkMobilityManager::new(NetworkSettings::default());
        manager.observe(&NetworkNotification::Lost(NetworkId(1)));
        assert!(!manager.take_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hotspot_enable_debounces_then_follows_up() {
        let engine = MockEngine::new();
        let platform = wifi_platform();
        platform.set_interfaces(vec![InterfaceInfo {
            name: "ap0".into(),
            addresses: vec!["192.168.43.1".parse().unwrap()],
        }]);
        let (mut timers, mut fired) = Timers::new();
        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;
        manager.reconcile(&platform, &engine).await;
        engine.clear_ops();

        manager.on_hotspot_changed(true, &engine, &mut timers).await;
        assert!(engine.ops().is_empty());

        let debounce = fired.recv().await.unwrap();
        assert_eq!(debounce.kind, TimerKind::HotspotDebounce);
        assert!(timers.accept(&debounce));
        manager.on_hotspot_debounce(&platform, &engine, &mut timers).await;
        assert_eq!(engine.count(|op| matches!(op, EngineOp::AddAddress { .. })), 1);

        let follow_up = fired.recv().await.unwrap();
        assert_eq!(follow_up.kind, TimerKind::HotspotFollowUp);

        // The follow-up pass sees the hotspot address as already known but resets
        engine.clear_ops();
        let outcome = manager.reconcile(&platform, &engine).await;
        assert_eq!(outcome.added, 0);
        assert!(outcome.transport_reset);
        assert_eq!(manager.snapshot().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hotspot_disable_removes_and_cancels() {
        let engine = MockEngine::new();
        let platform = wifi_platform();
        platform.set_interfaces(vec![InterfaceInfo {
            name: "ap0".into(),
            addresses: vec!["192.168.43.1".parse().unwrap()],
        }]);
        let (mut timers, _fired) = Timers::new();
        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;

        manager.on_hotspot_changed(true, &engine, &mut timers).await;
        manager.on_hotspot_debounce(&platform, &engine, &mut timers).await;
        assert_eq!(manager.hotspot_addresses().len(), 1);

        manager.on_hotspot_changed(false, &engine, &mut timers).await;
        assert!(manager.hotspot_addresses().is_empty());
        assert!(timers.is_empty());
        assert!(manager.take_pending());
        assert_eq!(engine.count(|op| matches!(op, EngineOp::RemoveAddress { .. })), 1);

        // Same state again is ignored
        manager.on_hotspot_changed(false, &engine, &mut timers).await;
        assert!(!manager.take_pending());
    }

    #[tokio::test]
    async fn test_stop_releases_lock() {
        let engine = MockEngine::new();
        let platform = wifi_platform();
        let mut manager = running_manager(NetworkSettings::default(), &platform, &engine).await;
        manager.reconcile(&platform, &engine).await;
        assert!(platform.lock_held());

        manager.stop(&platform);
        assert!(!platform.lock_held());
        assert!(!manager.is_running());
    }
}
