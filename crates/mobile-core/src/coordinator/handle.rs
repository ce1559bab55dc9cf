//! Bridge-facing handle to the coordination task

use tokio::sync::{mpsc, oneshot};

use crate::call::{CallId, MissedCall};
use crate::config::AccountConfig;
use crate::error::{MobileError, MobileResult};
use crate::events::{EventEmitter, EventIterator, EventStream};
use crate::network::MobilityStats;
use crate::registration::RegistrationState;

use super::{Command, PlatformNotification};

/// Cheap, cloneable handle used by the application bridge
///
/// Every method is a message to the coordination task. Once the task has
/// stopped, they fail with [`MobileError::CoordinatorStopped`].
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    notifications: mpsc::Sender<PlatformNotification>,
    events: EventEmitter,
}

impl CoordinatorHandle {
    pub(super) fn new(
        commands: mpsc::Sender<Command>,
        notifications: mpsc::Sender<PlatformNotification>,
        events: EventEmitter,
    ) -> Self {
        Self {
            commands,
            notifications,
            events,
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> MobileResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).await?;
        Ok(rx.await?)
    }

    /// Create the user agent for `account`, start network mobility and register
    ///
    /// An existing agent is unregistered first. Fails when the engine cannot
    /// allocate an agent. A failed registration request is reported as an
    /// `Error` event instead.
    pub async fn initialize(&self, account: AccountConfig) -> MobileResult<()> {
        self.request(|reply| Command::Initialize { account, reply }).await?
    }

    /// Call `target`, adding `sip:` when it has no scheme
    ///
    /// Returns `false` when the engine could not allocate or connect the call.
    pub async fn dial(&self, target: impl Into<String>) -> MobileResult<bool> {
        let target = target.into();
        self.request(|reply| Command::Dial { target, reply }).await?
    }

    pub async fn answer(&self) -> MobileResult<()> {
        self.request(|reply| Command::Answer { reply }).await?
    }

    /// End the current call (487 Request Terminated)
    pub async fn hangup(&self) -> MobileResult<()> {
        self.request(|reply| Command::Hangup { reply }).await?
    }

    /// Decline the current call (500 Busy Now)
    pub async fn reject(&self) -> MobileResult<()> {
        self.request(|reply| Command::Reject { reply }).await?
    }

    pub async fn hold(&self) -> MobileResult<bool> {
        self.request(|reply| Command::Hold { hold: true, reply }).await?
    }

    pub async fn resume(&self) -> MobileResult<bool> {
        self.request(|reply| Command::Hold { hold: false, reply }).await?
    }

    /// Blind-transfer the current call
    pub async fn transfer(&self, target: impl Into<String>) -> MobileResult<bool> {
        let target = target.into();
        self.request(|reply| Command::Transfer { target, reply }).await?
    }

    pub async fn send_dtmf(&self, digits: impl Into<String>) -> MobileResult<bool> {
        let digits = digits.into();
        self.request(|reply| Command::SendDtmf { digits, reply }).await?
    }

    /// Flip the microphone mute; returns whether the mic is now enabled
    pub async fn toggle_mic(&self) -> MobileResult<bool> {
        self.request(|reply| Command::SetMicMuted { muted: None, reply }).await?
    }

    pub async fn set_mic_muted(&self, muted: bool) -> MobileResult<bool> {
        self.request(|reply| Command::SetMicMuted { muted: Some(muted), reply }).await?
    }

    /// Flip between speaker and earpiece; returns whether the speaker is on
    ///
    /// On devices that need normal mode first, this resolves only after the
    /// platform reports the mode change.
    pub async fn toggle_speaker(&self) -> MobileResult<bool> {
        self.request(|reply| Command::SetSpeaker { speaker: None, reply }).await
    }

    pub async fn set_speaker(&self, speaker: bool) -> MobileResult<bool> {
        self.request(|reply| Command::SetSpeaker { speaker: Some(speaker), reply }).await
    }

    pub async fn refresh_registration(&self) -> MobileResult<()> {
        self.request(|reply| Command::RefreshRegistration { reply }).await?
    }

    /// Unregister and drop the agent; `false` when there was none
    pub async fn unregister(&self) -> MobileResult<bool> {
        self.request(|reply| Command::Unregister { reply }).await?
    }

    pub async fn registration_state(&self) -> MobileResult<RegistrationState> {
        self.request(|reply| Command::RegistrationState { reply }).await
    }

    /// Whether a call is current and its microphone is not muted
    pub async fn mic_enabled(&self) -> MobileResult<bool> {
        self.request(|reply| Command::MicEnabled { reply }).await
    }

    pub async fn speaker_enabled(&self) -> MobileResult<bool> {
        self.request(|reply| Command::SpeakerEnabled { reply }).await
    }

    pub async fn current_call_id(&self) -> MobileResult<Option<CallId>> {
        self.request(|reply| Command::CurrentCallId { reply }).await
    }

    pub async fn missed_calls(&self) -> MobileResult<Vec<MissedCall>> {
        self.request(|reply| Command::MissedCalls { reply }).await
    }

    pub async fn mobility_stats(&self) -> MobileResult<MobilityStats> {
        self.request(|reply| Command::MobilityStats { reply }).await
    }

    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn subscribe_simple(&self) -> EventIterator {
        self.events.subscribe_simple()
    }

    /// Deliver a platform callback
    pub async fn notify(&self, notification: impl Into<PlatformNotification>) -> MobileResult<()> {
        self.notifications.send(notification.into()).await?;
        Ok(())
    }

    /// Deliver a platform callback from a synchronous context
    pub fn try_notify(&self, notification: impl Into<PlatformNotification>) -> MobileResult<()> {
        self.notifications
            .try_send(notification.into())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    MobileError::internal_error("platform notification channel is full")
                }
                mpsc::error::TrySendError::Closed(_) => MobileError::CoordinatorStopped,
            })
    }

    /// Tear the session down and stop the coordination task
    ///
    /// Calling it again after the task has stopped is a no-op.
    pub async fn shutdown(&self) -> MobileResult<()> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(()) | Err(MobileError::CoordinatorStopped) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }
}
