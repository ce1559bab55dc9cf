//! SIP engine seam
//!
//! The SIP protocol engine is an external collaborator. The coordinator drives
//! it through the [`SipEngine`] trait and receives its notifications through a
//! bounded channel of [`EngineEvent`]s. An adapter for a concrete engine only
//! has to enqueue events with [`EngineEventSender`]; it never touches
//! coordinator state directly.
//!
//! Engines commonly report events as comma separated text (`"call closed,486 Busy Here,busy,sip:bob@host"`).
//! [`EngineEvent::parse`] turns that form into typed events.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::AccountConfig;
use crate::error::{MobileError, MobileResult};

/// Media direction flag reported with `call progress`: the far end only receives
pub const SDP_RECV_ONLY: u32 = 0x1;

/// Opaque handle for a user agent (one per registered account)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentHandle(u64);

impl AgentHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Opaque engine handle for a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallHandle(u64);

impl CallHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Primitives the coordinator needs from a SIP engine
///
/// All methods are invoked from the coordination task only, one at a time.
#[async_trait]
pub trait SipEngine: Send + Sync {
    /// Create a user agent for the account
    async fn allocate_agent(&self, account: &AccountConfig) -> MobileResult<AgentHandle>;

    async fn register(&self, agent: AgentHandle) -> MobileResult<()>;

    async fn unregister(&self, agent: AgentHandle) -> MobileResult<()>;

    /// Allocate an outbound call on the agent, without connecting it
    async fn allocate_call(&self, agent: AgentHandle) -> MobileResult<CallHandle>;

    async fn connect(&self, call: CallHandle, target: &str) -> MobileResult<()>;

    async fn answer(&self, agent: AgentHandle, call: CallHandle) -> MobileResult<()>;

    async fn hangup(
        &self,
        agent: AgentHandle,
        call: CallHandle,
        code: u16,
        reason: &str,
    ) -> MobileResult<()>;

    async fn hold(&self, call: CallHandle, hold: bool) -> MobileResult<()>;

    async fn transfer(&self, call: CallHandle, target: &str) -> MobileResult<()>;

    async fn send_dtmf(&self, call: CallHandle, digit: char) -> MobileResult<()>;

    async fn is_muted(&self, call: CallHandle) -> bool;

    /// Mute or unmute the microphone for every call
    async fn mute_all(&self, muted: bool);

    async fn add_address(&self, address: IpAddr, interface: &str) -> MobileResult<()>;

    async fn remove_address(&self, address: IpAddr) -> MobileResult<()>;

    /// Rebind transports, optionally re-registering and re-inviting active calls
    async fn reset_transport(&self, register: bool, reinvite: bool) -> MobileResult<()>;

    async fn set_dns_servers(&self, servers: &[SocketAddr]) -> MobileResult<()>;
}

/// Registration-level notification from the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationSignal {
    Registering,
    Unregistering,
    Registered,
    RegistrationFailed { reason: Option<String> },
}

/// Call-level event class, with its class specific payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEventKind {
    Incoming,
    Outgoing,
    Ringing,
    /// Early media / provisional response; carries the media direction flags
    Progress { flags: u32 },
    /// Re-INVITE outcome: 1 = put on hold, 3 = resumed
    Update { code: u32 },
    Established,
    /// Call ended; `tone` is the local tone hint (e.g. `"busy"`)
    Closed { tone: Option<String> },
}

impl CallEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            CallEventKind::Incoming => "incoming",
            CallEventKind::Outgoing => "outgoing",
            CallEventKind::Ringing => "ringing",
            CallEventKind::Progress { .. } => "progress",
            CallEventKind::Update { .. } => "update",
            CallEventKind::Established => "established",
            CallEventKind::Closed { .. } => "closed",
        }
    }

    /// Whether this class may introduce a handle the registry has not seen
    pub fn admits_new_call(&self) -> bool {
        matches!(self, CallEventKind::Incoming | CallEventKind::Outgoing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    pub handle: CallHandle,
    pub kind: CallEventKind,
    /// Remote party as reported by the engine
    pub remote: String,
}

impl CallEvent {
    pub fn new(handle: CallHandle, kind: CallEventKind, remote: impl Into<String>) -> Self {
        Self {
            handle,
            kind,
            remote: remote.into(),
        }
    }
}

/// Notification from the engine to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Registration(RegistrationSignal),
    Call(CallEvent),
}

impl EngineEvent {
    /// Decode the engine's textual event form
    ///
    /// Call events carry the call handle out of band. Their text is
    /// `"<class>[,<args>...],<remote>"`, where the remote URI is always the
    /// last field. Registration events have no handle. Unknown classes yield
    /// `None`.
    ///
    /// ```rust
    /// use rvoip_mobile_core::engine::{CallEventKind, CallHandle, EngineEvent};
    ///
    /// let ev = EngineEvent::parse("call closed,486,busy,sip:bob@example.com", Some(CallHandle::new(3)));
    /// match ev {
    ///     Some(EngineEvent::Call(call)) => {
    ///         assert_eq!(call.kind, CallEventKind::Closed { tone: Some("busy".into()) });
    ///         assert_eq!(call.remote, "sip:bob@example.com");
    ///     }
    ///     other => panic!("unexpected {:?}", other),
    /// }
    /// ```
    pub fn parse(text: &str, call: Option<CallHandle>) -> Option<EngineEvent> {
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        let class = fields.first().copied().unwrap_or_default();

        let Some(handle) = call else {
            let signal = match class {
                "registering" => RegistrationSignal::Registering,
                "unregistering" => RegistrationSignal::Unregistering,
                "registered" => RegistrationSignal::Registered,
                "registering failed" => RegistrationSignal::RegistrationFailed {
                    reason: fields.get(1).map(|r| r.to_string()).filter(|r| !r.is_empty()),
                },
                _ => {
                    debug!(class, "Ignoring unknown engine event");
                    return None;
                }
            };
            return Some(EngineEvent::Registration(signal));
        };

        let remote = if fields.len() > 1 {
            fields.last().copied().unwrap_or_default()
        } else {
            ""
        };
        let numeric = |idx: usize| fields.get(idx).and_then(|f| f.parse::<u32>().ok());

        let kind = match class {
            "call incoming" => CallEventKind::Incoming,
            "call outgoing" => CallEventKind::Outgoing,
            "call ringing" => CallEventKind::Ringing,
            "call progress" => CallEventKind::Progress {
                flags: numeric(1).unwrap_or(0),
            },
            "call update" => match numeric(1) {
                Some(code) => CallEventKind::Update { code },
                None => {
                    warn!(text, "Call update without sub-code");
                    return None;
                }
            },
            "call established" => CallEventKind::Established,
            "call closed" => {
                // The tone hint sits right before the remote URI when present
                let tone = if fields.len() >= 4 {
                    fields.get(fields.len() - 2).map(|t| t.to_string())
                } else {
                    None
                };
                CallEventKind::Closed {
                    tone: tone.filter(|t| !t.is_empty()),
                }
            }
            _ => {
                debug!(class, %handle, "Ignoring unknown call event");
                return None;
            }
        };

        Some(EngineEvent::Call(CallEvent::new(handle, kind, remote)))
    }
}

/// Sending half of the bounded engine→coordinator channel
///
/// Engine adapters hold one of these and call [`EngineEventSender::send`] from
/// whatever thread or callback the engine reports on.
#[derive(Debug, Clone)]
pub struct EngineEventSender {
    tx: mpsc::Sender<EngineEvent>,
}

impl EngineEventSender {
    pub(crate) fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }

    /// Enqueue an event, waiting for room in the channel
    pub async fn send(&self, event: EngineEvent) -> MobileResult<()> {
        self.tx.send(event).await.map_err(MobileError::from)
    }

    /// Enqueue from a synchronous callback; fails when the channel is full
    pub fn try_send(&self, event: EngineEvent) -> MobileResult<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                MobileError::engine("event_queue", "engine event channel is full")
            }
            mpsc::error::TrySendError::Closed(_) => MobileError::CoordinatorStopped,
        })
    }

    /// Parse the engine's textual form and enqueue it
    pub async fn send_raw(&self, text: &str, call: Option<CallHandle>) -> MobileResult<()> {
        match EngineEvent::parse(text, call) {
            Some(event) => self.send(event).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_kind(text: &str) -> CallEventKind {
        match EngineEvent::parse(text, Some(CallHandle::new(1))) {
            Some(EngineEvent::Call(ev)) => ev.kind,
            other => panic!("expected call event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_call_classes() {
        assert_eq!(call_kind("call incoming,sip:alice@example.com"), CallEventKind::Incoming);
        assert_eq!(call_kind("call ringing,sip:alice@example.com"), CallEventKind::Ringing);
        assert_eq!(
            call_kind("call progress,1,sip:alice@example.com"),
            CallEventKind::Progress { flags: 1 }
        );
        assert_eq!(
            call_kind("call update,3,sip:alice@example.com"),
            CallEventKind::Update { code: 3 }
        );
        assert_eq!(
            call_kind("call closed,,sip:alice@example.com"),
            CallEventKind::Closed { tone: None }
        );
    }

    #[test]
    fn test_parse_closed_keeps_remote_last() {
        let ev = EngineEvent::parse("call closed,487,busy,sip:bob@example.com", Some(CallHandle::new(9)));
        let Some(EngineEvent::Call(ev)) = ev else {
            panic!("expected call event");
        };
        assert_eq!(ev.handle, CallHandle::new(9));
        assert_eq!(ev.remote, "sip:bob@example.com");
        assert_eq!(ev.kind, CallEventKind::Closed { tone: Some("busy".to_string()) });
    }

    #[test]
    fn test_parse_registration_signals() {
        assert_eq!(
            EngineEvent::parse("registered", None),
            Some(EngineEvent::Registration(RegistrationSignal::Registered))
        );
        assert_eq!(
            EngineEvent::parse("registering failed,401 Unauthorized", None),
            Some(EngineEvent::Registration(RegistrationSignal::RegistrationFailed {
                reason: Some("401 Unauthorized".to_string())
            }))
        );
        assert_eq!(EngineEvent::parse("mwi notify", None), None);
    }

    #[tokio::test]
    async fn test_sender_reports_full_channel() {
        let (tx, _rx) = mpsc::channel(1);
        let sender = EngineEventSender::new(tx);
        sender
            .try_send(EngineEvent::Registration(RegistrationSignal::Registering))
            .unwrap();
        let err = sender
            .try_send(EngineEvent::Registration(RegistrationSignal::Registered))
            .unwrap_err();
        assert_eq!(err.category(), "engine");
    }
}
