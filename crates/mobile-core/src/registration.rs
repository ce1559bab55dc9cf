//! Registration state machine
//!
//! Maps engine registration signals onto the bridge-visible
//! [`RegistrationState`] and owns the agent handle. Every transition is
//! published, even when the state does not change, so a UI that subscribes
//! late still converges on the next signal.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::{AgentHandle, RegistrationSignal};

/// Registration state as reported to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegistrationState {
    /// No registration attempted, or registered without an agent
    #[default]
    None,
    Progress,
    Ok,
    /// Unregistered on request
    Cleared,
    Failed,
    /// A refresh was requested and is being re-issued
    Refreshing,
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationState::None => "None",
            RegistrationState::Progress => "Progress",
            RegistrationState::Ok => "Ok",
            RegistrationState::Cleared => "Cleared",
            RegistrationState::Failed => "Failed",
            RegistrationState::Refreshing => "Refreshing",
        };
        f.write_str(name)
    }
}

/// What a refresh request amounts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Already registered, nothing to do
    AlreadyRegistered,
    /// Re-issue registration on this agent
    Register(AgentHandle),
    /// No agent exists
    NoAgent,
}

#[derive(Debug, Default)]
pub struct RegistrationMachine {
    state: RegistrationState,
    agent: Option<AgentHandle>,
}

impl RegistrationMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn agent(&self) -> Option<AgentHandle> {
        self.agent
    }

    pub fn attach(&mut self, agent: AgentHandle) {
        debug!(%agent, "Attached agent");
        self.agent = Some(agent);
    }

    /// Apply an engine signal; the returned state is always published
    pub fn on_signal(&mut self, signal: &RegistrationSignal) -> RegistrationState {
        let next = match signal {
            RegistrationSignal::Registering | RegistrationSignal::Unregistering => {
                RegistrationState::Progress
            }
            RegistrationSignal::Registered => {
                if self.agent.is_some() {
                    RegistrationState::Ok
                } else {
                    RegistrationState::None
                }
            }
            RegistrationSignal::RegistrationFailed { reason } => {
                warn!(reason = reason.as_deref().unwrap_or("unknown"), "Registration failed");
                RegistrationState::Failed
            }
        };
        if next != self.state {
            info!(from = %self.state, to = %next, "Registration state changed");
        }
        self.state = next;
        next
    }

    /// Decide what a refresh request should do; marks `Refreshing` when it re-registers
    pub fn refresh(&mut self) -> RefreshDecision {
        match self.agent {
            None => RefreshDecision::NoAgent,
            Some(_) if self.state == RegistrationState::Ok => RefreshDecision::AlreadyRegistered,
            Some(agent) => {
                self.state = RegistrationState::Refreshing;
                RefreshDecision::Register(agent)
            }
        }
    }

    /// Begin unregistration: drop the agent and move to `Cleared`
    ///
    /// Returns the agent to unregister, or `None` when there was none.
    pub fn begin_unregister(&mut self) -> Option<AgentHandle> {
        let agent = self.agent.take()?;
        self.state = RegistrationState::Cleared;
        info!(%agent, "Unregistering agent");
        Some(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_signals() -> Vec<RegistrationSignal> {
        vec![
            RegistrationSignal::Registering,
            RegistrationSignal::Unregistering,
            RegistrationSignal::Registered,
            RegistrationSignal::RegistrationFailed { reason: None },
        ]
    }

    #[test]
    fn test_signal_mapping_with_agent() {
        let mut machine = RegistrationMachine::new();
        machine.attach(AgentHandle::new(1));
        assert_eq!(machine.on_signal(&RegistrationSignal::Registering), RegistrationState::Progress);
        assert_eq!(machine.on_signal(&RegistrationSignal::Registered), RegistrationState::Ok);
        assert_eq!(
            machine.on_signal(&RegistrationSignal::RegistrationFailed { reason: Some("403".into()) }),
            RegistrationState::Failed
        );
        assert_eq!(machine.on_signal(&RegistrationSignal::Unregistering), RegistrationState::Progress);
    }

    #[test]
    fn test_registered_without_agent_is_none() {
        let mut machine = RegistrationMachine::new();
        assert_eq!(machine.on_signal(&RegistrationSignal::Registered), RegistrationState::None);
    }

    #[test]
    fn test_every_state_accepts_every_signal() {
        for with_agent in [false, true] {
            for first in all_signals() {
                for second in all_signals() {
                    let mut machine = RegistrationMachine::new();
                    if with_agent {
                        machine.attach(AgentHandle::new(1));
                    }
                    machine.on_signal(&first);
                    let state = machine.on_signal(&second);
                    assert_eq!(machine.state(), state);
                }
            }
        }
    }

    #[test]
    fn test_refresh_is_noop_when_registered() {
        let mut machine = RegistrationMachine::new();
        assert_eq!(machine.refresh(), RefreshDecision::NoAgent);

        machine.attach(AgentHandle::new(4));
        machine.on_signal(&RegistrationSignal::Registered);
        assert_eq!(machine.refresh(), RefreshDecision::AlreadyRegistered);
        assert_eq!(machine.state(), RegistrationState::Ok);

        machine.on_signal(&RegistrationSignal::RegistrationFailed { reason: None });
        assert_eq!(machine.refresh(), RefreshDecision::Register(AgentHandle::new(4)));
        assert_eq!(machine.state(), RegistrationState::Refreshing);
    }

    #[test]
    fn test_unregister_drops_agent() {
        let mut machine = RegistrationMachine::new();
        assert_eq!(machine.begin_unregister(), None);
        assert_eq!(machine.state(), RegistrationState::None);

        machine.attach(AgentHandle::new(2));
        assert_eq!(machine.begin_unregister(), Some(AgentHandle::new(2)));
        assert_eq!(machine.state(), RegistrationState::Cleared);
        assert!(machine.agent().is_none());
        // A late confirmation no longer finds an agent
        assert_eq!(machine.on_signal(&RegistrationSignal::Registered), RegistrationState::None);
    }
}
