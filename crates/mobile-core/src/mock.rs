//! In-memory engine and platform doubles
//!
//! Used by the crate's own tests and handy for host applications that want
//! to exercise the coordinator without a SIP stack or a device. Each double
//! records what was asked of it. Doubles that share a [`Journal`] record into
//! one ordered log, which makes cross-component ordering observable.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::audio::backend::{AudioBackend, AudioMode, AudioRoute, AudioStream, RingerMode, Tone, ToneBackend};
use crate::config::AccountConfig;
use crate::engine::{AgentHandle, CallHandle, SipEngine};
use crate::error::{MobileError, MobileResult};
use crate::network::platform::{
    InterfaceInfo, LinkAddress, LinkProperties, NetworkCapabilities, NetworkId, NetworkPlatform,
};

/// Shared, ordered log of side effects across doubles
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Position of the first entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

fn record(journal: &Option<Journal>, entry: &str) {
    if let Some(journal) = journal {
        journal.record(entry);
    }
}

/// Engine primitive invocation, as recorded by [`MockEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    AllocateAgent(String),
    Register(AgentHandle),
    Unregister(AgentHandle),
    AllocateCall(AgentHandle),
    Connect { call: CallHandle, target: String },
    Answer(CallHandle),
    Hangup { call: CallHandle, code: u16, reason: String },
    Hold { call: CallHandle, hold: bool },
    Transfer { call: CallHandle, target: String },
    SendDtmf { call: CallHandle, digit: char },
    MuteAll(bool),
    AddAddress { address: IpAddr, interface: String },
    RemoveAddress(IpAddr),
    ResetTransport { register: bool, reinvite: bool },
    SetDnsServers(Vec<SocketAddr>),
}

#[derive(Debug, Default)]
struct EngineFailures {
    allocate_agent: bool,
    register: bool,
    allocate_call: bool,
    connect: bool,
    hold: bool,
    dns: bool,
    add_address: HashSet<IpAddr>,
    remove_address: HashSet<IpAddr>,
}

#[derive(Debug, Clone, Default)]
struct MockCall {
    held: bool,
    target: Option<String>,
}

/// SIP engine double
#[derive(Debug)]
pub struct MockEngine {
    ops: Mutex<Vec<EngineOp>>,
    next_handle: AtomicU64,
    muted: AtomicBool,
    calls: DashMap<CallHandle, MockCall>,
    failures: Mutex<EngineFailures>,
    journal: Option<Journal>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(100),
            muted: AtomicBool::new(false),
            calls: DashMap::new(),
            failures: Mutex::new(EngineFailures::default()),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn ops(&self) -> Vec<EngineOp> {
        self.ops.lock().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    pub fn count(&self, predicate: impl Fn(&EngineOp) -> bool) -> usize {
        self.ops.lock().iter().filter(|op| predicate(op)).count()
    }

    pub fn is_held(&self, call: CallHandle) -> bool {
        self.calls.get(&call).is_some_and(|c| c.held)
    }

    pub fn connected_target(&self, call: CallHandle) -> Option<String> {
        self.calls.get(&call).and_then(|c| c.target.clone())
    }

    pub fn fail_allocate_agent(&self, fail: bool) {
        self.failures.lock().allocate_agent = fail;
    }

    pub fn fail_register(&self, fail: bool) {
        self.failures.lock().register = fail;
    }

    pub fn fail_allocate_call(&self, fail: bool) {
        self.failures.lock().allocate_call = fail;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.failures.lock().connect = fail;
    }

    pub fn fail_hold(&self, fail: bool) {
        self.failures.lock().hold = fail;
    }

    pub fn fail_dns(&self, fail: bool) {
        self.failures.lock().dns = fail;
    }

    pub fn fail_add_address(&self, address: IpAddr) {
        self.failures.lock().add_address.insert(address);
    }

    pub fn fail_remove_address(&self, address: IpAddr) {
        self.failures.lock().remove_address.insert(address);
    }

    /// Let every address bind and unbind again
    pub fn heal_addresses(&self) {
        let mut failures = self.failures.lock();
        failures.add_address.clear();
        failures.remove_address.clear();
    }

    fn push(&self, op: EngineOp, entry: &str) {
        self.ops.lock().push(op);
        record(&self.journal, entry);
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl SipEngine for MockEngine {
    async fn allocate_agent(&self, account: &AccountConfig) -> MobileResult<AgentHandle> {
        self.push(EngineOp::AllocateAgent(account.aor()), "engine.allocate_agent");
        if self.failures.lock().allocate_agent {
            return Err(MobileError::agent_allocation_failed("mock refused account"));
        }
        Ok(AgentHandle::new(self.next()))
    }

    async fn register(&self, agent: AgentHandle) -> MobileResult<()> {
        self.push(EngineOp::Register(agent), "engine.register");
        if self.failures.lock().register {
            return Err(MobileError::engine("register", "mock register failure"));
        }
        Ok(())
    }

    async fn unregister(&self, agent: AgentHandle) -> MobileResult<()> {
        self.push(EngineOp::Unregister(agent), "engine.unregister");
        Ok(())
    }

    async fn allocate_call(&self, agent: AgentHandle) -> MobileResult<CallHandle> {
        self.push(EngineOp::AllocateCall(agent), "engine.allocate_call");
        if self.failures.lock().allocate_call {
            return Err(MobileError::call_setup_failed("mock call allocation failure"));
        }
        let handle = CallHandle::new(self.next());
        self.calls.insert(handle, MockCall::default());
        Ok(handle)
    }

    async fn connect(&self, call: CallHandle, target: &str) -> MobileResult<()> {
        self.push(
            EngineOp::Connect { call, target: target.to_string() },
            "engine.connect",
        );
        if self.failures.lock().connect {
            return Err(MobileError::call_setup_failed("mock connect failure"));
        }
        self.calls.entry(call).or_default().target = Some(target.to_string());
        Ok(())
    }

    async fn answer(&self, _agent: AgentHandle, call: CallHandle) -> MobileResult<()> {
        self.push(EngineOp::Answer(call), "engine.answer");
        Ok(())
    }

    async fn hangup(&self, _agent: AgentHandle, call: CallHandle, code: u16, reason: &str) -> MobileResult<()> {
        self.push(
            EngineOp::Hangup { call, code, reason: reason.to_string() },
            "engine.hangup",
        );
        Ok(())
    }

    async fn hold(&self, call: CallHandle, hold: bool) -> MobileResult<()> {
        self.push(EngineOp::Hold { call, hold }, "engine.hold");
        if self.failures.lock().hold {
            return Err(MobileError::engine("hold", "mock re-INVITE rejected"));
        }
        self.calls.entry(call).or_default().held = hold;
        Ok(())
    }

    async fn transfer(&self, call: CallHandle, target: &str) -> MobileResult<()> {
        self.push(
            EngineOp::Transfer { call, target: target.to_string() },
            "engine.transfer",
        );
        Ok(())
    }

    async fn send_dtmf(&self, call: CallHandle, digit: char) -> MobileResult<()> {
        self.push(EngineOp::SendDtmf { call, digit }, "engine.send_dtmf");
        Ok(())
    }

    async fn is_muted(&self, _call: CallHandle) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    async fn mute_all(&self, muted: bool) {
        self.push(EngineOp::MuteAll(muted), "engine.mute_all");
        self.muted.store(muted, Ordering::SeqCst);
    }

    async fn add_address(&self, address: IpAddr, interface: &str) -> MobileResult<()> {
        self.push(
            EngineOp::AddAddress { address, interface: interface.to_string() },
            "engine.add_address",
        );
        if self.failures.lock().add_address.contains(&address) {
            return Err(MobileError::engine("add_address", format!("mock cannot bind {}", address)));
        }
        Ok(())
    }

    async fn remove_address(&self, address: IpAddr) -> MobileResult<()> {
        self.push(EngineOp::RemoveAddress(address), "engine.remove_address");
        if self.failures.lock().remove_address.contains(&address) {
            return Err(MobileError::engine("remove_address", format!("mock cannot unbind {}", address)));
        }
        Ok(())
    }

    async fn reset_transport(&self, register: bool, reinvite: bool) -> MobileResult<()> {
        self.push(EngineOp::ResetTransport { register, reinvite }, "engine.reset_transport");
        Ok(())
    }

    async fn set_dns_servers(&self, servers: &[SocketAddr]) -> MobileResult<()> {
        self.push(EngineOp::SetDnsServers(servers.to_vec()), "engine.set_dns_servers");
        if self.failures.lock().dns {
            return Err(MobileError::engine("set_dns_servers", "mock resolver rejected"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct NetState {
    networks: BTreeMap<NetworkId, (LinkProperties, NetworkCapabilities)>,
    active: Option<NetworkId>,
    interfaces: Vec<InterfaceInfo>,
    hotspot: bool,
    reports_foreground: bool,
    lock_held: bool,
    lock_acquisitions: usize,
}

/// Connectivity double
#[derive(Debug)]
pub struct MockNetworkPlatform {
    state: Mutex<NetState>,
    journal: Option<Journal>,
}

impl Default for MockNetworkPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn link_address(address: IpAddr) -> LinkAddress {
    let link_local = match address {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    };
    if link_local {
        LinkAddress::link_local(address)
    } else {
        LinkAddress::universe(address)
    }
}

fn parse_all(addresses: &[&str]) -> Vec<IpAddr> {
    addresses
        .iter()
        .filter_map(|a| a.parse().ok())
        .collect()
}

impl MockNetworkPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NetState {
                networks: BTreeMap::new(),
                active: None,
                interfaces: Vec::new(),
                hotspot: false,
                reports_foreground: true,
                lock_held: false,
                lock_acquisitions: 0,
            }),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Attach a foreground network with the given addresses and resolvers
    pub fn attach_network(&self, id: NetworkId, interface: &str, addresses: &[&str], dns: &[&str], wifi: bool) {
        let props = LinkProperties {
            interface_name: Some(interface.to_string()),
            addresses: parse_all(addresses).into_iter().map(link_address).collect(),
            dns_servers: parse_all(dns),
        };
        let caps = NetworkCapabilities { foreground: true, wifi };
        self.state.lock().networks.insert(id, (props, caps));
    }

    pub fn detach_network(&self, id: NetworkId) {
        let mut state = self.state.lock();
        state.networks.remove(&id);
        if state.active == Some(id) {
            state.active = None;
        }
    }

    pub fn set_active(&self, id: Option<NetworkId>) {
        self.state.lock().active = id;
    }

    pub fn set_foreground(&self, id: NetworkId, foreground: bool) {
        if let Some((_, caps)) = self.state.lock().networks.get_mut(&id) {
            caps.foreground = foreground;
        }
    }

    pub fn set_reports_foreground(&self, reports: bool) {
        self.state.lock().reports_foreground = reports;
    }

    pub fn add_link_address(&self, id: NetworkId, address: &str) {
        if let (Some((props, _)), Ok(address)) = (self.state.lock().networks.get_mut(&id), address.parse()) {
            props.addresses.push(link_address(address));
        }
    }

    pub fn set_dns(&self, id: NetworkId, dns: &[&str]) {
        if let Some((props, _)) = self.state.lock().networks.get_mut(&id) {
            props.dns_servers = parse_all(dns);
        }
    }

    pub fn set_interfaces(&self, interfaces: Vec<InterfaceInfo>) {
        self.state.lock().interfaces = interfaces;
    }

    pub fn set_hotspot(&self, enabled: bool) {
        self.state.lock().hotspot = enabled;
    }

    pub fn lock_held(&self) -> bool {
        self.state.lock().lock_held
    }

    pub fn lock_acquisitions(&self) -> usize {
        self.state.lock().lock_acquisitions
    }
}

impl NetworkPlatform for MockNetworkPlatform {
    fn active_network(&self) -> Option<NetworkId> {
        self.state.lock().active
    }

    fn all_networks(&self) -> Vec<NetworkId> {
        self.state.lock().networks.keys().copied().collect()
    }

    fn link_properties(&self, network: NetworkId) -> Option<LinkProperties> {
        self.state.lock().networks.get(&network).map(|(props, _)| props.clone())
    }

    fn capabilities(&self, network: NetworkId) -> Option<NetworkCapabilities> {
        self.state.lock().networks.get(&network).map(|(_, caps)| *caps)
    }

    fn interfaces(&self) -> Vec<InterfaceInfo> {
        self.state.lock().interfaces.clone()
    }

    fn hotspot_enabled(&self) -> bool {
        self.state.lock().hotspot
    }

    fn reports_foreground_capability(&self) -> bool {
        self.state.lock().reports_foreground
    }

    fn acquire_performance_lock(&self) {
        let mut state = self.state.lock();
        state.lock_held = true;
        state.lock_acquisitions += 1;
        drop(state);
        record(&self.journal, "network.acquire_lock");
    }

    fn release_performance_lock(&self) {
        self.state.lock().lock_held = false;
        record(&self.journal, "network.release_lock");
    }
}

#[derive(Debug)]
struct AudioState {
    available: Vec<AudioRoute>,
    route: AudioRoute,
    mode: AudioMode,
    requires_normal: bool,
    volumes: HashMap<AudioStream, u32>,
    focus_abandoned: bool,
    route_switches: usize,
    mode_requests: Vec<AudioMode>,
}

/// Routing/volume double; starts on earpiece in normal mode
#[derive(Debug)]
pub struct MockAudioBackend {
    state: Mutex<AudioState>,
    journal: Option<Journal>,
}

pub const MOCK_MAX_VOLUME: u32 = 15;

impl Default for MockAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAudioBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AudioState {
                available: vec![AudioRoute::Earpiece, AudioRoute::Speaker],
                route: AudioRoute::Earpiece,
                mode: AudioMode::Normal,
                requires_normal: true,
                volumes: HashMap::from([(AudioStream::Music, 5), (AudioStream::VoiceCall, 5)]),
                focus_abandoned: false,
                route_switches: 0,
                mode_requests: Vec::new(),
            }),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn set_available_routes(&self, routes: Vec<AudioRoute>) {
        self.state.lock().available = routes;
    }

    pub fn set_requires_normal_mode(&self, requires: bool) {
        self.state.lock().requires_normal = requires;
    }

    /// Number of explicit route selections made
    pub fn route_switches(&self) -> usize {
        self.state.lock().route_switches
    }

    pub fn mode_requests(&self) -> Vec<AudioMode> {
        self.state.lock().mode_requests.clone()
    }

    pub fn focus_abandoned(&self) -> bool {
        self.state.lock().focus_abandoned
    }
}

impl AudioBackend for MockAudioBackend {
    fn available_routes(&self) -> Vec<AudioRoute> {
        self.state.lock().available.clone()
    }

    fn current_route(&self) -> AudioRoute {
        self.state.lock().route
    }

    fn apply_route(&self, route: AudioRoute) -> bool {
        let mut state = self.state.lock();
        if !state.available.contains(&route) {
            return false;
        }
        state.route = route;
        state.route_switches += 1;
        true
    }

    fn clear_route(&self) {}

    fn mode(&self) -> AudioMode {
        self.state.lock().mode
    }

    fn set_mode(&self, mode: AudioMode) {
        let mut state = self.state.lock();
        state.mode = mode;
        state.mode_requests.push(mode);
    }

    fn speaker_requires_normal_mode(&self) -> bool {
        self.state.lock().requires_normal
    }

    fn stream_volume(&self, stream: AudioStream) -> u32 {
        self.state.lock().volumes.get(&stream).copied().unwrap_or(0)
    }

    fn max_stream_volume(&self, _stream: AudioStream) -> u32 {
        MOCK_MAX_VOLUME
    }

    fn set_stream_volume(&self, stream: AudioStream, volume: u32) {
        self.state.lock().volumes.insert(stream, volume);
    }

    fn abandon_focus(&self) {
        self.state.lock().focus_abandoned = true;
        record(&self.journal, "audio.abandon_focus");
    }
}

#[derive(Debug)]
struct ToneState {
    ringer_mode: RingerMode,
    ring_volume: u32,
    vibrate_when_ringing: bool,
    supports_looping: bool,
    ringtone_playing: bool,
    ringtone_starts: usize,
    tone_playing: Option<Tone>,
    played: Vec<String>,
    missing_resources: bool,
    vibrations: usize,
}

/// Ringtone/tone/vibrator double
#[derive(Debug)]
pub struct MockToneBackend {
    state: Mutex<ToneState>,
    journal: Option<Journal>,
}

impl Default for MockToneBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockToneBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ToneState {
                ringer_mode: RingerMode::Normal,
                ring_volume: 5,
                vibrate_when_ringing: false,
                supports_looping: true,
                ringtone_playing: false,
                ringtone_starts: 0,
                tone_playing: None,
                played: Vec::new(),
                missing_resources: false,
                vibrations: 0,
            }),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn set_ringer(&self, mode: RingerMode, ring_volume: u32, vibrate_when_ringing: bool) {
        let mut state = self.state.lock();
        state.ringer_mode = mode;
        state.ring_volume = ring_volume;
        state.vibrate_when_ringing = vibrate_when_ringing;
    }

    pub fn set_supports_looping(&self, supports: bool) {
        self.state.lock().supports_looping = supports;
    }

    pub fn set_missing_resources(&self, missing: bool) {
        self.state.lock().missing_resources = missing;
    }

    /// Simulate a non-looping ringtone reaching its end
    pub fn finish_ringtone(&self) {
        self.state.lock().ringtone_playing = false;
    }

    pub fn ringtone_starts(&self) -> usize {
        self.state.lock().ringtone_starts
    }

    pub fn tone_playing(&self) -> Option<Tone> {
        self.state.lock().tone_playing
    }

    /// Tone resources started, in order
    pub fn played(&self) -> Vec<String> {
        self.state.lock().played.clone()
    }

    pub fn vibrations(&self) -> usize {
        self.state.lock().vibrations
    }
}

impl ToneBackend for MockToneBackend {
    fn ringer_mode(&self) -> RingerMode {
        self.state.lock().ringer_mode
    }

    fn ring_volume(&self) -> u32 {
        self.state.lock().ring_volume
    }

    fn vibrate_when_ringing(&self) -> bool {
        self.state.lock().vibrate_when_ringing
    }

    fn supports_looping_ringtone(&self) -> bool {
        self.state.lock().supports_looping
    }

    fn start_ringtone(&self, _looping: bool) {
        let mut state = self.state.lock();
        state.ringtone_playing = true;
        state.ringtone_starts += 1;
    }

    fn is_ringtone_playing(&self) -> bool {
        self.state.lock().ringtone_playing
    }

    fn stop_ringtone(&self) {
        self.state.lock().ringtone_playing = false;
        record(&self.journal, "tones.stop_ringtone");
    }

    fn play_tone(&self, tone: Tone, resource: &str, _looping: bool) -> bool {
        let mut state = self.state.lock();
        if state.missing_resources {
            return false;
        }
        state.tone_playing = Some(tone);
        state.played.push(resource.to_string());
        true
    }

    fn stop_tone(&self) {
        self.state.lock().tone_playing = None;
        record(&self.journal, "tones.stop_tone");
    }

    fn vibrate(&self, _duration: Duration) {
        self.state.lock().vibrations += 1;
    }

    fn cancel_vibration(&self) {}
}
