//! Call data model
//!
//! A [`Call`] is created either by the call state machine (inbound or
//! outbound engine event for an unknown handle) or by `dial`, and lives in the
//! [`CallRegistry`](crate::registry::CallRegistry) until it closes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{AgentHandle, CallHandle};

/// Client-facing call identifier, stable for the lifetime of the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Inbound => write!(f, "inbound"),
            CallDirection::Outbound => write!(f, "outbound"),
        }
    }
}

/// Lifecycle state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Allocated locally, engine has not reported anything yet
    Idle,
    Ringing(CallDirection),
    /// Provisional response or early media seen
    Early,
    Established,
    Held,
    /// Terminal; the call is only kept while a closing tone plays
    Closed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Closed)
    }

    /// States in which media is flowing or paused on an answered call
    pub fn is_answered(&self) -> bool {
        matches!(self, CallState::Established | CallState::Held)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Idle => write!(f, "Idle"),
            CallState::Ringing(dir) => write!(f, "Ringing({})", dir),
            CallState::Early => write!(f, "Early"),
            CallState::Established => write!(f, "Established"),
            CallState::Held => write!(f, "Held"),
            CallState::Closed => write!(f, "Closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub handle: CallHandle,
    pub agent: AgentHandle,
    pub direction: CallDirection,
    /// Outbound target or inbound remote URI
    pub remote: String,
    pub state: CallState,
    pub created_at: DateTime<Utc>,
    pub established_at: Option<DateTime<Utc>>,
}

impl Call {
    pub fn new(
        handle: CallHandle,
        agent: AgentHandle,
        direction: CallDirection,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            id: CallId::new(),
            handle,
            agent,
            direction,
            remote: remote.into(),
            state: CallState::Idle,
            created_at: Utc::now(),
            established_at: None,
        }
    }

    pub fn inbound(handle: CallHandle, agent: AgentHandle, remote: impl Into<String>) -> Self {
        Self::new(handle, agent, CallDirection::Inbound, remote)
    }

    pub fn outbound(handle: CallHandle, agent: AgentHandle, remote: impl Into<String>) -> Self {
        Self::new(handle, agent, CallDirection::Outbound, remote)
    }

    /// Whether the call was ever answered
    pub fn was_established(&self) -> bool {
        self.established_at.is_some()
    }

    /// Whether user-facing call control may still act on this call
    pub fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// An inbound call that ended before it was answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissedCall {
    pub remote: String,
    pub at: DateTime<Utc>,
}
