//! Events published to the application bridge
//!
//! Every state change the UI cares about is published as a [`MobileEvent`] on
//! a broadcast channel. Subscribers that fall behind lose the oldest events
//! instead of stalling the coordinator.
//!
//! Events serialize to the bridge's `{"event": <name>, "body": {...}}` shape:
//!
//! ```rust
//! use rvoip_mobile_core::call::CallDirection;
//! use rvoip_mobile_core::events::MobileEvent;
//!
//! let ring = MobileEvent::Ring {
//!     remote: "sip:alice@example.com".into(),
//!     direction: CallDirection::Inbound,
//! };
//! let json = ring.to_bridge_json();
//! assert_eq!(json["event"], "Ring");
//! assert_eq!(json["body"]["username"], "sip:alice@example.com");
//! assert_eq!(json["body"]["callType"], "inbound");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::call::CallDirection;
use crate::registration::RegistrationState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "body")]
pub enum MobileEvent {
    #[serde(rename = "AccountRegistrationStateChanged")]
    RegistrationStateChanged {
        #[serde(rename = "registrationState")]
        state: RegistrationState,
    },
    Ring {
        #[serde(rename = "username")]
        remote: String,
        #[serde(rename = "callType")]
        direction: CallDirection,
    },
    Up,
    Paused,
    Resuming,
    Hangup,
    Missed {
        #[serde(rename = "username")]
        remote: String,
        at: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl MobileEvent {
    /// Bridge-level event name
    pub fn name(&self) -> &'static str {
        match self {
            MobileEvent::RegistrationStateChanged { .. } => "AccountRegistrationStateChanged",
            MobileEvent::Ring { .. } => "Ring",
            MobileEvent::Up => "Up",
            MobileEvent::Paused => "Paused",
            MobileEvent::Resuming => "Resuming",
            MobileEvent::Hangup => "Hangup",
            MobileEvent::Missed { .. } => "Missed",
            MobileEvent::Error { .. } => "Error",
        }
    }

    /// JSON payload for the bridge; unit events get an empty body
    pub fn to_bridge_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self)
            .unwrap_or_else(|_| serde_json::json!({ "event": self.name() }));
        if let Some(map) = value.as_object_mut() {
            map.entry("body").or_insert_with(|| serde_json::json!({}));
        }
        value
    }
}

/// Event stream type
pub type EventStream = BroadcastStream<MobileEvent>;

/// Pull-style reader that skips over lag notifications
pub struct EventIterator {
    stream: EventStream,
}

impl EventIterator {
    pub fn new(stream: EventStream) -> Self {
        Self { stream }
    }

    /// Next event, or `None` once the coordinator is gone
    pub async fn next(&mut self) -> Option<MobileEvent> {
        use tokio_stream::StreamExt;
        loop {
            match self.stream.next().await? {
                Ok(event) => return Some(event),
                Err(e) => tracing::warn!(error = %e, "Event subscriber lagged"),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<MobileEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: MobileEvent) {
        tracing::debug!(event = event.name(), "Publishing event");
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn subscribe_simple(&self) -> EventIterator {
        EventIterator::new(self.subscribe())
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unit_events_have_empty_body() {
        let json = MobileEvent::Hangup.to_bridge_json();
        assert_eq!(json, serde_json::json!({ "event": "Hangup", "body": {} }));
    }

    #[test]
    fn test_registration_event_shape() {
        let json = MobileEvent::RegistrationStateChanged {
            state: RegistrationState::Ok,
        }
        .to_bridge_json();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "AccountRegistrationStateChanged",
                "body": { "registrationState": "Ok" }
            })
        );
    }

    #[tokio::test]
    async fn test_emitter_fans_out() {
        let emitter = EventEmitter::new(8);
        let mut a = emitter.subscribe_simple();
        let mut b = emitter.subscribe_simple();
        emitter.emit(MobileEvent::Up);
        assert_eq!(a.next().await, Some(MobileEvent::Up));
        assert_eq!(b.next().await, Some(MobileEvent::Up));
        assert_eq!(emitter.receiver_count(), 2);
    }
}
