//! Session, call-control and registration operations

use tracing::{debug, error, info, warn};

use crate::call::Call;
use crate::config::AccountConfig;
use crate::engine::{AgentHandle, CallHandle};
use crate::error::{MobileError, MobileResult};
use crate::events::MobileEvent;
use crate::registration::RefreshDecision;

use super::{SessionCoordinator, HANGUP_CODE, HANGUP_REASON, REJECT_CODE, REJECT_REASON};

/// Add the `sip:` scheme unless the target already has one
pub fn normalize_target(target: &str) -> MobileResult<String> {
    let target = target.trim();
    if target.is_empty() {
        return Err(MobileError::invalid_argument("target", "must not be empty"));
    }
    if target.starts_with("sip:") || target.starts_with("sips:") {
        Ok(target.to_string())
    } else {
        Ok(format!("sip:{}", target))
    }
}

/// Check a DTMF digit string: `0-9`, `*`, `#` and `A-D`
pub fn validate_dtmf(digits: &str) -> MobileResult<()> {
    if digits.is_empty() {
        return Err(MobileError::invalid_argument("digits", "must not be empty"));
    }
    match digits.chars().find(|c| !matches!(c, '0'..='9' | '*' | '#' | 'A'..='D')) {
        Some(bad) => Err(MobileError::invalid_argument(
            "digits",
            format!("'{}' is not a DTMF digit", bad),
        )),
        None => Ok(()),
    }
}

impl SessionCoordinator {
    /// Allocate an agent for the account, start mobility and register
    pub(super) async fn initialize(&mut self, account: AccountConfig) -> MobileResult<()> {
        account.validate()?;

        if let Some(previous) = self.registration.begin_unregister() {
            info!(agent = %previous, "Replacing existing agent");
            if let Err(e) = self.engine.unregister(previous).await {
                warn!(operation = "unregister", agent = %previous, error = %e, "Failed to unregister previous agent");
            }
        }

        debug!(aor = %account.aor(), interval = account.registration_interval(), "Allocating agent");
        let agent = match self.engine.allocate_agent(&account).await {
            Ok(agent) => agent,
            Err(e) => {
                error!(aor = %account.aor(), error = %e, "Agent allocation failed");
                return Err(match e {
                    MobileError::AgentAllocationFailed { .. } => e,
                    other => MobileError::agent_allocation_failed(other.to_string()),
                });
            }
        };
        self.registration.attach(agent);
        info!(%agent, aor = %account.aor(), "Session initialized");

        if !self.network.is_running() {
            self.network.start(self.platform.as_ref(), self.engine.as_ref()).await;
        }
        self.network.request();

        self.register(agent).await;
        Ok(())
    }

    /// Place an outbound call; `false` when the engine could not set it up
    pub(super) async fn dial(&mut self, target: &str) -> MobileResult<bool> {
        let target = normalize_target(target)?;
        let agent = self.agent()?;

        let handle = match self.engine.allocate_call(agent).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(operation = "allocate_call", %target, error = %e, "Failed to allocate call");
                return Ok(false);
            }
        };

        let call = Call::outbound(handle, agent, target.clone());
        let registry = self.calls.registry_mut();
        registry.put(call)?;
        registry.set_current(handle)?;

        if let Err(e) = self.engine.connect(handle, &target).await {
            warn!(operation = "connect", %handle, %target, error = %e, "Failed to connect call");
            self.calls.registry_mut().remove(handle);
            return Ok(false);
        }
        info!(%handle, %target, "Dialing");
        Ok(true)
    }

    pub(super) async fn answer(&mut self) -> MobileResult<()> {
        let (agent, handle) = self.current_call()?;
        self.engine.answer(agent, handle).await?;
        self.tone.apply_call_volume(self.audio.as_ref());
        info!(%handle, "Answered call");
        Ok(())
    }

    pub(super) async fn hangup(&mut self) -> MobileResult<()> {
        let (agent, handle) = self.current_call()?;
        self.engine.hangup(agent, handle, HANGUP_CODE, HANGUP_REASON).await?;
        info!(%handle, "Hung up call");
        Ok(())
    }

    pub(super) async fn reject(&mut self) -> MobileResult<()> {
        let (agent, handle) = self.current_call()?;
        self.engine.hangup(agent, handle, REJECT_CODE, REJECT_REASON).await?;
        info!(%handle, "Rejected call");
        Ok(())
    }

    /// Put the current call on hold or take it off; `false` if the engine refused
    pub(super) async fn hold(&mut self, hold: bool) -> MobileResult<bool> {
        let (_, handle) = self.current_call()?;
        match self.engine.hold(handle, hold).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(operation = "hold", %handle, hold, error = %e, "Hold request failed");
                Ok(false)
            }
        }
    }

    pub(super) async fn transfer(&mut self, target: &str) -> MobileResult<bool> {
        let target = normalize_target(target)?;
        let (_, handle) = self.current_call()?;
        match self.engine.transfer(handle, &target).await {
            Ok(()) => {
                info!(%handle, %target, "Transfer requested");
                Ok(true)
            }
            Err(e) => {
                warn!(operation = "transfer", %handle, %target, error = %e, "Transfer failed");
                Ok(false)
            }
        }
    }

    pub(super) async fn send_dtmf(&mut self, digits: &str) -> MobileResult<bool> {
        validate_dtmf(digits)?;
        let (_, handle) = self.current_call()?;
        for digit in digits.chars() {
            if let Err(e) = self.engine.send_dtmf(handle, digit).await {
                warn!(operation = "send_dtmf", %handle, %digit, error = %e, "DTMF failed");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Mute, unmute or toggle (`None`) the current call's microphone;
    /// returns "mic enabled"
    pub(super) async fn set_mic_muted(&mut self, muted: Option<bool>) -> MobileResult<bool> {
        let (_, handle) = self.current_call()?;
        let muted = match muted {
            Some(muted) => muted,
            None => !self.engine.is_muted(handle).await,
        };
        self.engine.mute_all(muted).await;
        debug!(%handle, muted, "Microphone mute changed");
        Ok(!muted)
    }

    pub(super) async fn mic_enabled(&self) -> bool {
        match self.calls.registry().current_live() {
            Some(call) => !self.engine.is_muted(call.handle).await,
            None => false,
        }
    }

    pub(super) async fn refresh_registration(&mut self) -> MobileResult<()> {
        match self.registration.refresh() {
            RefreshDecision::AlreadyRegistered => {
                debug!("Already registered, refresh skipped");
                Ok(())
            }
            RefreshDecision::NoAgent => Err(MobileError::NoSession),
            RefreshDecision::Register(agent) => {
                self.publish_registration_state();
                self.register(agent).await;
                Ok(())
            }
        }
    }

    /// `false` when there was no agent to unregister
    pub(super) async fn unregister(&mut self) -> MobileResult<bool> {
        let Some(agent) = self.registration.begin_unregister() else {
            debug!("Unregister without agent");
            return Ok(false);
        };
        self.publish_registration_state();
        if let Err(e) = self.engine.unregister(agent).await {
            warn!(operation = "unregister", %agent, error = %e, "Unregister request failed");
        }
        Ok(true)
    }

    async fn register(&mut self, agent: AgentHandle) {
        if let Err(e) = self.engine.register(agent).await {
            error!(operation = "register", %agent, error = %e, "Registration request failed");
            self.events.emit(MobileEvent::Error {
                message: e.to_string(),
            });
        }
    }

    fn publish_registration_state(&self) {
        self.events.emit(MobileEvent::RegistrationStateChanged {
            state: self.registration.state(),
        });
    }

    fn agent(&self) -> MobileResult<AgentHandle> {
        self.registration.agent().ok_or(MobileError::NoSession)
    }

    /// The current call, if user-facing control may act on it
    fn current_call(&self) -> MobileResult<(AgentHandle, CallHandle)> {
        self.calls
            .registry()
            .current_live()
            .map(|call| (call.agent, call.handle))
            .ok_or(MobileError::NoCurrentCall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("bob@example.com").unwrap(), "sip:bob@example.com");
        assert_eq!(normalize_target("sip:bob@example.com").unwrap(), "sip:bob@example.com");
        assert_eq!(normalize_target("sips:bob@example.com").unwrap(), "sips:bob@example.com");
        assert!(matches!(
            normalize_target("  "),
            Err(MobileError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_validate_dtmf() {
        assert!(validate_dtmf("0123456789*#ABCD").is_ok());
        assert!(validate_dtmf("").is_err());
        assert!(validate_dtmf("12e").is_err());
        assert!(validate_dtmf("a").is_err());
    }
}
