//! Configuration for the mobile coordinator
//!
//! [`MobileConfig`] is supplied once when the coordinator starts and covers
//! network policy, audio policy and channel sizing. [`AccountConfig`] is
//! supplied on every `initialize` call and describes the SIP account.
//!
//! Both are plain serde types so a host application can keep them in JSON:
//!
//! ```rust
//! use rvoip_mobile_core::config::{AddressFamily, MobileConfig};
//!
//! let config = MobileConfig::from_json_str(r#"{
//!     "network": { "address_family": "ipv4_only" },
//!     "audio": { "call_volume": 7 }
//! }"#).unwrap();
//! assert_eq!(config.network.address_family, AddressFamily::Ipv4Only);
//! assert_eq!(config.audio.call_volume, 7);
//! assert_eq!(config.audio.tone_country, "us");
//! ```

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MobileError, MobileResult};

/// Default registration interval in seconds
pub const DEFAULT_REGISTRATION_EXPIRES: u32 = 900;
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
/// Highest accepted call volume step; 0 leaves stream volumes untouched
pub const MAX_CALL_VOLUME: u8 = 10;

/// Which local address families are handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    #[default]
    Any,
    Ipv4Only,
    Ipv6Only,
}

impl AddressFamily {
    pub fn matches(&self, address: &IpAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::Ipv4Only => address.is_ipv4(),
            AddressFamily::Ipv6Only => address.is_ipv6(),
        }
    }
}

/// Where resolver addresses come from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsMode {
    /// Follow the resolvers of the attached networks
    #[default]
    Dynamic,
    /// Use a fixed list and never recompute it while running
    Static(Vec<IpAddr>),
}

impl DnsMode {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, DnsMode::Dynamic)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub address_family: AddressFamily,
    pub dns: DnsMode,
    /// Wait after a hotspot comes up before enumerating its interfaces
    #[serde(with = "duration_millis")]
    pub hotspot_debounce: Duration,
    /// Delay of the follow-up reconciliation after hotspot addresses were added
    #[serde(with = "duration_millis")]
    pub hotspot_follow_up: Duration,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            address_family: AddressFamily::Any,
            dns: DnsMode::Dynamic,
            hotspot_debounce: Duration::from_millis(1000),
            hotspot_follow_up: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Call volume step 0..=10 applied on answer, 0 = leave volumes alone
    pub call_volume: u8,
    /// Country suffix of the ringback/busy tone resources
    pub tone_country: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            call_volume: 0,
            tone_country: "us".to_string(),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobileConfig {
    pub network: NetworkSettings,
    pub audio: AudioSettings,
    /// Capacity of each bounded channel feeding the coordination task
    pub event_capacity: usize,
}

impl Default for MobileConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MobileConfig {
    pub fn new() -> Self {
        Self {
            network: NetworkSettings::default(),
            audio: AudioSettings::default(),
            event_capacity: 256,
        }
    }

    pub fn from_json_str(json: &str) -> MobileResult<Self> {
        let config: MobileConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_address_family(mut self, family: AddressFamily) -> Self {
        self.network.address_family = family;
        self
    }

    pub fn with_dns(mut self, dns: DnsMode) -> Self {
        self.network.dns = dns;
        self
    }

    pub fn with_hotspot_delays(mut self, debounce: Duration, follow_up: Duration) -> Self {
        self.network.hotspot_debounce = debounce;
        self.network.hotspot_follow_up = follow_up;
        self
    }

    pub fn with_call_volume(mut self, volume: u8) -> Self {
        self.audio.call_volume = volume;
        self
    }

    pub fn with_tone_country(mut self, country: impl Into<String>) -> Self {
        self.audio.tone_country = country.into();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn validate(&self) -> MobileResult<()> {
        if self.audio.call_volume > MAX_CALL_VOLUME {
            return Err(MobileError::invalid_configuration(
                "audio.call_volume",
                format!("{} exceeds {}", self.audio.call_volume, MAX_CALL_VOLUME),
            ));
        }
        if self.audio.tone_country.trim().is_empty() {
            return Err(MobileError::invalid_configuration(
                "audio.tone_country",
                "must not be empty",
            ));
        }
        if self.event_capacity == 0 {
            return Err(MobileError::invalid_configuration(
                "event_capacity",
                "must be at least 1",
            ));
        }
        if let DnsMode::Static(servers) = &self.network.dns {
            if servers.is_empty() {
                return Err(MobileError::invalid_configuration(
                    "network.dns",
                    "static mode needs at least one server",
                ));
            }
        }
        Ok(())
    }
}

/// SIP account handed to the engine when allocating an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    pub domain: String,
    pub password: String,
    /// Registration interval in seconds
    #[serde(default)]
    pub expires: Option<u32>,
    #[serde(default = "default_stun_server")]
    pub stun_server: String,
}

fn default_stun_server() -> String {
    DEFAULT_STUN_SERVER.to_string()
}

impl AccountConfig {
    pub fn new(
        username: impl Into<String>,
        domain: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            domain: domain.into(),
            password: password.into(),
            expires: None,
            stun_server: default_stun_server(),
        }
    }

    pub fn with_expires(mut self, seconds: u32) -> Self {
        self.expires = Some(seconds);
        self
    }

    pub fn with_stun_server(mut self, server: impl Into<String>) -> Self {
        self.stun_server = server.into();
        self
    }

    pub fn registration_interval(&self) -> u32 {
        self.expires.unwrap_or(DEFAULT_REGISTRATION_EXPIRES)
    }

    /// Address of record, `sip:user@domain`
    pub fn aor(&self) -> String {
        format!("sip:{}@{}", self.username, self.domain)
    }

    /// Account line in the engine's account-file syntax
    ///
    /// ```rust
    /// use rvoip_mobile_core::config::AccountConfig;
    ///
    /// let line = AccountConfig::new("1001", "pbx.example.com", "secret").with_expires(300).account_line();
    /// assert!(line.starts_with("<sip:1001@pbx.example.com>;auth_pass=secret;"));
    /// assert!(line.ends_with(";regint=300"));
    /// ```
    pub fn account_line(&self) -> String {
        format!(
            "<{}>;auth_pass={};stunserver=\"{}\";regq=0.5;pubint=0;regint={}",
            self.aor(),
            self.password,
            self.stun_server,
            self.registration_interval()
        )
    }

    pub fn validate(&self) -> MobileResult<()> {
        if self.username.trim().is_empty() {
            return Err(MobileError::invalid_configuration("username", "must not be empty"));
        }
        if self.domain.trim().is_empty() {
            return Err(MobileError::invalid_configuration("domain", "must not be empty"));
        }
        if self.expires == Some(0) {
            return Err(MobileError::invalid_configuration("expires", "must be positive"));
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = MobileConfig::default();
        assert_eq!(config.network.hotspot_debounce, Duration::from_secs(1));
        assert_eq!(config.network.hotspot_follow_up, Duration::from_secs(2));
        assert_eq!(config.audio.tone_country, "us");
        assert!(config.network.dns.is_dynamic());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_call_volume_is_bounded() {
        let err = MobileConfig::new().with_call_volume(11).validate().unwrap_err();
        assert_eq!(err.category(), "configuration");
        assert!(MobileConfig::new().with_call_volume(10).validate().is_ok());
    }

    #[test]
    fn test_static_dns_needs_servers() {
        assert!(MobileConfig::new().with_dns(DnsMode::Static(vec![])).validate().is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_durations_in_millis() {
        let config = MobileConfig::new()
            .with_hotspot_delays(Duration::from_millis(250), Duration::from_millis(750))
            .with_address_family(AddressFamily::Ipv6Only);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["network"]["hotspot_debounce"], 250);
        let back: MobileConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_account_line_uses_default_interval() {
        let account = AccountConfig::new("alice", "example.com", "pw");
        assert_eq!(
            account.account_line(),
            "<sip:alice@example.com>;auth_pass=pw;stunserver=\"stun:stun.l.google.com:19302\";regq=0.5;pubint=0;regint=900"
        );
        assert!(account.validate().is_ok());
        assert!(AccountConfig::new("", "example.com", "pw").validate().is_err());
    }

    #[test]
    fn test_address_family_filter() {
        let v4: IpAddr = "192.168.1.10".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(AddressFamily::Any.matches(&v4) && AddressFamily::Any.matches(&v6));
        assert!(AddressFamily::Ipv4Only.matches(&v4));
        assert!(!AddressFamily::Ipv4Only.matches(&v6));
        assert!(AddressFamily::Ipv6Only.matches(&v6));
    }
}
