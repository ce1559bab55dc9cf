//! Call state machine
//!
//! Consumes engine call events and decides what should happen, without doing
//! it: every transition yields a list of [`CallAction`]s that the coordinator
//! executes in order against the tone/audio layer and the event stream. The
//! machine owns the [`CallRegistry`], so registry mutation and the actions
//! that go with it are decided in one step.
//!
//! ```text
//! Idle ─▶ Ringing(in|out) ─▶ Early ─▶ Established ⇄ Held
//!   └──────────┴───────────────┴──────────┴─────────┴──▶ Closed
//! ```
//!
//! A call closed with the `busy` tone hint lingers in `Closed` until the busy
//! tone finishes, which keeps `answer` and friends from acting on it while
//! audio is still being torn down.

use chrono::Utc;
use tracing::{debug, info};

use crate::call::{Call, CallDirection, CallState, MissedCall};
use crate::engine::{AgentHandle, CallEvent, CallEventKind, CallHandle, SDP_RECV_ONLY};
use crate::events::MobileEvent;
use crate::registry::CallRegistry;

/// Tone hint that asks for the busy tone on close
pub const BUSY_TONE_HINT: &str = "busy";

/// Re-INVITE sub-codes reported with `update`
pub const UPDATE_HELD: u32 = 1;
pub const UPDATE_RESUMED: u32 = 3;

/// Side effect requested by a call transition
#[derive(Debug, Clone, PartialEq)]
pub enum CallAction {
    /// Start ringtone and vibration for an inbound call
    StartRinging,
    StopRinging,
    PlayRingback,
    /// Stop the ringback/busy player
    StopTone,
    /// Play the busy tone once; completion arrives as `ToneFinished`
    PlayBusy,
    /// Restore call volume, abandon audio focus, return to normal mode
    ReleaseAudio,
    Emit(MobileEvent),
}

#[derive(Debug, Default)]
pub struct CallMachine {
    registry: CallRegistry,
    missed: Vec<MissedCall>,
    /// Closed call kept around while its busy tone plays
    closing: Option<CallHandle>,
}

impl CallMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CallRegistry {
        &mut self.registry
    }

    pub fn missed_calls(&self) -> &[MissedCall] {
        &self.missed
    }

    /// Apply one engine call event
    ///
    /// Events are dropped while no agent exists, and for unknown handles
    /// unless the event class admits a new call.
    pub fn handle(&mut self, event: &CallEvent, agent: Option<AgentHandle>) -> Vec<CallAction> {
        let Some(agent) = agent else {
            debug!(handle = %event.handle, kind = event.kind.name(), "Dropping call event without agent");
            return Vec::new();
        };

        match self.registry.find(event.handle) {
            None if !event.kind.admits_new_call() => {
                debug!(handle = %event.handle, kind = event.kind.name(), "Dropping event for unknown call");
                return Vec::new();
            }
            Some(call) if call.state.is_terminal() => {
                debug!(handle = %event.handle, kind = event.kind.name(), "Dropping event for closed call");
                return Vec::new();
            }
            _ => {}
        }

        match &event.kind {
            CallEventKind::Incoming => self.on_incoming(event, agent),
            CallEventKind::Outgoing => self.on_outgoing(event, agent),
            CallEventKind::Ringing => self.on_ringing(event.handle),
            CallEventKind::Progress { flags } => self.on_progress(event.handle, *flags),
            CallEventKind::Update { code } => self.on_update(event.handle, *code),
            CallEventKind::Established => self.on_established(event.handle),
            CallEventKind::Closed { tone } => self.on_closed(event.handle, tone.as_deref()),
        }
    }

    /// The busy tone finished: drop the lingering call and release audio
    pub fn on_tone_finished(&mut self) -> Vec<CallAction> {
        let Some(handle) = self.closing.take() else {
            return Vec::new();
        };
        self.registry.remove(handle);
        if self.registry.current_live().is_some() {
            debug!(%handle, "Busy tone done, another call holds audio");
            Vec::new()
        } else {
            vec![CallAction::ReleaseAudio]
        }
    }

    fn on_incoming(&mut self, event: &CallEvent, agent: AgentHandle) -> Vec<CallAction> {
        if self.registry.contains(event.handle) {
            debug!(handle = %event.handle, "Repeated incoming notification");
            return Vec::new();
        }
        let mut actions = self.finish_closing();

        let mut call = Call::inbound(event.handle, agent, event.remote.clone());
        call.state = CallState::Ringing(CallDirection::Inbound);
        if self.admit(call).is_err() {
            return actions;
        }
        info!(handle = %event.handle, remote = %event.remote, "Incoming call");

        actions.push(CallAction::StartRinging);
        actions.push(CallAction::Emit(MobileEvent::Ring {
            remote: event.remote.clone(),
            direction: CallDirection::Inbound,
        }));
        actions
    }

    fn on_outgoing(&mut self, event: &CallEvent, agent: AgentHandle) -> Vec<CallAction> {
        let mut actions = self.finish_closing();

        if !self.registry.contains(event.handle) {
            let call = Call::outbound(event.handle, agent, event.remote.clone());
            if self.admit(call).is_err() {
                return actions;
            }
        } else if self.registry.set_current(event.handle).is_err() {
            return actions;
        }

        let Some(call) = self.registry.find_mut(event.handle) else {
            return actions;
        };
        if call.state == CallState::Idle {
            call.state = CallState::Ringing(CallDirection::Outbound);
        }
        info!(handle = %call.handle, remote = %call.remote, "Outgoing call");
        actions.push(CallAction::Emit(MobileEvent::Ring {
            remote: call.remote.clone(),
            direction: CallDirection::Outbound,
        }));
        actions
    }

    fn on_ringing(&mut self, handle: CallHandle) -> Vec<CallAction> {
        self.enter_early(handle);
        vec![CallAction::PlayRingback]
    }

    fn on_progress(&mut self, handle: CallHandle, flags: u32) -> Vec<CallAction> {
        self.enter_early(handle);
        if flags & SDP_RECV_ONLY != 0 {
            vec![CallAction::StopTone]
        } else {
            vec![CallAction::PlayRingback]
        }
    }

    fn on_update(&mut self, handle: CallHandle, code: u32) -> Vec<CallAction> {
        let (next, event) = match code {
            UPDATE_HELD => (CallState::Held, MobileEvent::Paused),
            UPDATE_RESUMED => (CallState::Established, MobileEvent::Resuming),
            other => {
                debug!(%handle, code = other, "Ignoring call update");
                return Vec::new();
            }
        };
        if let Some(call) = self.registry.find_mut(handle) {
            if call.state.is_answered() {
                call.state = next;
            }
        }
        vec![CallAction::Emit(event)]
    }

    fn on_established(&mut self, handle: CallHandle) -> Vec<CallAction> {
        if let Some(call) = self.registry.find_mut(handle) {
            call.state = CallState::Established;
            call.established_at.get_or_insert_with(Utc::now);
            info!(%handle, "Call established");
        }
        let _ = self.registry.set_current(handle);
        vec![
            CallAction::StopRinging,
            CallAction::StopTone,
            CallAction::Emit(MobileEvent::Up),
        ]
    }

    fn on_closed(&mut self, handle: CallHandle, tone: Option<&str>) -> Vec<CallAction> {
        let other_active = self
            .registry
            .current_live()
            .is_some_and(|current| current.handle != handle);

        let mut actions = vec![CallAction::StopRinging, CallAction::StopTone];
        let mut missed = None;

        if let Some(call) = self.registry.find_mut(handle) {
            if call.direction == CallDirection::Inbound && !call.was_established() {
                missed = Some(MissedCall {
                    remote: call.remote.clone(),
                    at: Utc::now(),
                });
            }
            info!(%handle, tone = tone.unwrap_or(""), "Call closed");

            if tone == Some(BUSY_TONE_HINT) && !other_active {
                call.state = CallState::Closed;
                // Replaces any earlier lingering call
                if let Some(previous) = self.closing.replace(handle) {
                    self.registry.remove(previous);
                }
                actions.push(CallAction::PlayBusy);
            } else {
                if !other_active {
                    actions.push(CallAction::ReleaseAudio);
                }
                self.registry.remove(handle);
            }
        }

        actions.push(CallAction::Emit(MobileEvent::Hangup));
        if let Some(missed) = missed {
            actions.push(CallAction::Emit(MobileEvent::Missed {
                remote: missed.remote.clone(),
                at: missed.at,
            }));
            self.missed.push(missed);
        }
        actions
    }

    fn enter_early(&mut self, handle: CallHandle) {
        if let Some(call) = self.registry.find_mut(handle) {
            if matches!(call.state, CallState::Idle | CallState::Ringing(_)) {
                call.state = CallState::Early;
            }
        }
    }

    fn admit(&mut self, call: Call) -> crate::error::MobileResult<()> {
        let handle = call.handle;
        self.registry.put(call)?;
        self.registry.set_current(handle)
    }

    /// A new call arrives while a busy tone lingers: cut the tone short
    fn finish_closing(&mut self) -> Vec<CallAction> {
        match self.closing.take() {
            Some(handle) => {
                self.registry.remove(handle);
                vec![CallAction::StopTone]
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const AGENT: Option<AgentHandle> = Some(AgentHandle::new(1));

    fn ev(raw: u64, kind: CallEventKind) -> CallEvent {
        CallEvent::new(CallHandle::new(raw), kind, format!("sip:{}@example.com", raw))
    }

    fn emitted(actions: &[CallAction]) -> Vec<&MobileEvent> {
        actions
            .iter()
            .filter_map(|a| match a {
                CallAction::Emit(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_incoming_call_rings() {
        let mut machine = CallMachine::new();
        let actions = machine.handle(&ev(1, CallEventKind::Incoming), AGENT);

        assert_eq!(actions[0], CallAction::StartRinging);
        assert_eq!(
            emitted(&actions),
            vec![&MobileEvent::Ring {
                remote: "sip:1@example.com".into(),
                direction: CallDirection::Inbound
            }]
        );
        let current = machine.registry().current().unwrap();
        assert_eq!(current.handle, CallHandle::new(1));
        assert_eq!(current.state, CallState::Ringing(CallDirection::Inbound));
    }

    #[test]
    fn test_events_without_agent_are_dropped() {
        let mut machine = CallMachine::new();
        assert!(machine.handle(&ev(1, CallEventKind::Incoming), None).is_empty());
        assert!(machine.registry().is_empty());
    }

    #[test]
    fn test_unknown_handle_is_dropped() {
        let mut machine = CallMachine::new();
        for kind in [
            CallEventKind::Ringing,
            CallEventKind::Progress { flags: 0 },
            CallEventKind::Update { code: 1 },
            CallEventKind::Established,
            CallEventKind::Closed { tone: None },
        ] {
            assert!(machine.handle(&ev(9, kind), AGENT).is_empty());
        }
        assert!(machine.registry().is_empty());
    }

    #[test]
    fn test_outbound_progress_and_establish() {
        let mut machine = CallMachine::new();
        machine.handle(&ev(2, CallEventKind::Outgoing), AGENT);
        assert_eq!(
            machine.handle(&ev(2, CallEventKind::Progress { flags: 0 }), AGENT),
            vec![CallAction::PlayRingback]
        );
        assert_eq!(
            machine.registry().find(CallHandle::new(2)).unwrap().state,
            CallState::Early
        );
        assert_eq!(
            machine.handle(&ev(2, CallEventKind::Progress { flags: SDP_RECV_ONLY }), AGENT),
            vec![CallAction::StopTone]
        );

        let actions = machine.handle(&ev(2, CallEventKind::Established), AGENT);
        assert_eq!(emitted(&actions), vec![&MobileEvent::Up]);
        assert!(machine.registry().find(CallHandle::new(2)).unwrap().was_established());
    }

    #[test]
    fn test_dialed_call_keeps_target_on_outgoing() {
        let mut machine = CallMachine::new();
        let call = Call::outbound(CallHandle::new(3), AgentHandle::new(1), "sip:bob@example.com");
        machine.registry_mut().put(call).unwrap();

        let actions = machine.handle(
            &CallEvent::new(CallHandle::new(3), CallEventKind::Outgoing, "sip:bob@example.com;tag=x"),
            AGENT,
        );
        assert_eq!(
            emitted(&actions),
            vec![&MobileEvent::Ring {
                remote: "sip:bob@example.com".into(),
                direction: CallDirection::Outbound
            }]
        );
        assert_eq!(machine.registry().current_handle(), Some(CallHandle::new(3)));
    }

    #[test]
    fn test_hold_and_resume() {
        let mut machine = CallMachine::new();
        machine.handle(&ev(1, CallEventKind::Incoming), AGENT);
        machine.handle(&ev(1, CallEventKind::Established), AGENT);

        let actions = machine.handle(&ev(1, CallEventKind::Update { code: UPDATE_HELD }), AGENT);
        assert_eq!(actions, vec![CallAction::Emit(MobileEvent::Paused)]);
        assert_eq!(machine.registry().current().unwrap().state, CallState::Held);

        let actions = machine.handle(&ev(1, CallEventKind::Update { code: UPDATE_RESUMED }), AGENT);
        assert_eq!(actions, vec![CallAction::Emit(MobileEvent::Resuming)]);
        assert_eq!(machine.registry().current().unwrap().state, CallState::Established);

        assert!(machine.handle(&ev(1, CallEventKind::Update { code: 2 }), AGENT).is_empty());
    }

    #[test]
    fn test_unanswered_inbound_close_is_missed() {
        let mut machine = CallMachine::new();
        machine.handle(&ev(1, CallEventKind::Incoming), AGENT);
        let actions = machine.handle(&ev(1, CallEventKind::Closed { tone: None }), AGENT);

        assert_eq!(
            &actions[..3],
            &[CallAction::StopRinging, CallAction::StopTone, CallAction::ReleaseAudio]
        );
        let events = emitted(&actions);
        assert_eq!(events[0], &MobileEvent::Hangup);
        assert!(matches!(events[1], MobileEvent::Missed { remote, .. } if remote == "sip:1@example.com"));
        assert_eq!(machine.missed_calls().len(), 1);
        assert!(machine.registry().is_empty());
        assert!(machine.registry().current().is_none());
    }

    #[test]
    fn test_busy_close_lingers_until_tone_finishes() {
        let mut machine = CallMachine::new();
        machine.handle(&ev(4, CallEventKind::Outgoing), AGENT);
        let actions = machine.handle(&ev(4, CallEventKind::Closed { tone: Some("busy".into()) }), AGENT);

        assert!(actions.contains(&CallAction::PlayBusy));
        assert!(!actions.contains(&CallAction::ReleaseAudio));
        assert_eq!(emitted(&actions), vec![&MobileEvent::Hangup]);

        // Still current, but nothing may act on it
        assert_eq!(machine.registry().current_handle(), Some(CallHandle::new(4)));
        assert!(machine.registry().current_live().is_none());
        assert!(machine.handle(&ev(4, CallEventKind::Established), AGENT).is_empty());

        assert_eq!(machine.on_tone_finished(), vec![CallAction::ReleaseAudio]);
        assert!(machine.registry().current().is_none());
        assert!(machine.on_tone_finished().is_empty());
    }

    #[test]
    fn test_closing_other_call_keeps_audio() {
        let mut machine = CallMachine::new();
        machine.handle(&ev(1, CallEventKind::Incoming), AGENT);
        machine.handle(&ev(1, CallEventKind::Established), AGENT);
        machine.handle(&ev(2, CallEventKind::Outgoing), AGENT);
        machine.handle(&ev(2, CallEventKind::Established), AGENT);

        let actions = machine.handle(&ev(1, CallEventKind::Closed { tone: Some("busy".into()) }), AGENT);
        assert!(!actions.contains(&CallAction::ReleaseAudio));
        assert!(!actions.contains(&CallAction::PlayBusy));
        assert_eq!(machine.registry().current_handle(), Some(CallHandle::new(2)));
        assert_eq!(machine.registry().len(), 1);
    }

    #[test]
    fn test_new_call_during_busy_tone_cuts_it() {
        let mut machine = CallMachine::new();
        machine.handle(&ev(1, CallEventKind::Outgoing), AGENT);
        machine.handle(&ev(1, CallEventKind::Closed { tone: Some("busy".into()) }), AGENT);

        let actions = machine.handle(&ev(2, CallEventKind::Incoming), AGENT);
        assert_eq!(actions[0], CallAction::StopTone);
        assert_eq!(actions[1], CallAction::StartRinging);
        assert!(!machine.registry().contains(CallHandle::new(1)));
        assert!(machine.on_tone_finished().is_empty());
    }
}
