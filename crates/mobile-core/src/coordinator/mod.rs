//! Session & connectivity coordinator
//!
//! One task owns every piece of session state: the call machine, the
//! registration machine, the network mobility manager, the audio router and
//! the tone controller. Everything reaches it as a message:
//!
//! - bridge commands from a [`CoordinatorHandle`], each with a oneshot reply
//! - engine events through an [`EngineEventSender`]
//! - platform callbacks as [`PlatformNotification`]s
//! - timer firings from [`Timers`]
//!
//! Handlers run to completion one at a time, so no state is ever shared or
//! locked. Engine primitives are only invoked from this task.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_mobile_core::config::{AccountConfig, MobileConfig};
//! use rvoip_mobile_core::coordinator::SessionCoordinator;
//! use rvoip_mobile_core::mock::{MockAudioBackend, MockEngine, MockNetworkPlatform, MockToneBackend};
//!
//! # async fn example() -> rvoip_mobile_core::MobileResult<()> {
//! let (handle, _engine_events, _task) = SessionCoordinator::start(
//!     MobileConfig::default(),
//!     Arc::new(MockEngine::new()),
//!     Arc::new(MockNetworkPlatform::new()),
//!     Arc::new(MockAudioBackend::new()),
//!     Arc::new(MockToneBackend::new()),
//! )?;
//!
//! handle.initialize(AccountConfig::new("alice", "example.com", "secret")).await?;
//! handle.dial("bob@example.com").await?;
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod event_loop;
mod handle;
mod session_ops;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::audio::{AudioBackend, AudioMode, AudioRouter, RouteReply, ToneBackend, ToneController};
use crate::call::{CallId, MissedCall};
use crate::call_machine::CallMachine;
use crate::config::{AccountConfig, MobileConfig};
use crate::engine::{EngineEvent, EngineEventSender, SipEngine};
use crate::error::MobileResult;
use crate::events::EventEmitter;
use crate::network::{MobilityStats, NetworkMobilityManager, NetworkNotification, NetworkPlatform};
use crate::registration::{RegistrationMachine, RegistrationState};
use crate::timer::{TimerFired, Timers};

pub use handle::CoordinatorHandle;

/// Hangup of the current call
pub const HANGUP_CODE: u16 = 487;
pub const HANGUP_REASON: &str = "Request Terminated";

/// Rejection of an incoming call
pub const REJECT_CODE: u16 = 500;
pub const REJECT_REASON: &str = "Busy Now";

/// Callback delivered by the platform bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformNotification {
    Network(NetworkNotification),
    /// The device audio mode changed (confirms a requested mode switch)
    AudioModeChanged(AudioMode),
    /// The one-shot tone player completed
    ToneFinished,
}

impl From<NetworkNotification> for PlatformNotification {
    fn from(notification: NetworkNotification) -> Self {
        PlatformNotification::Network(notification)
    }
}

type Reply<T> = oneshot::Sender<MobileResult<T>>;

/// Bridge request; every variant carries its reply channel
pub(crate) enum Command {
    Initialize { account: AccountConfig, reply: Reply<()> },
    Dial { target: String, reply: Reply<bool> },
    Answer { reply: Reply<()> },
    Hangup { reply: Reply<()> },
    Reject { reply: Reply<()> },
    Hold { hold: bool, reply: Reply<bool> },
    Transfer { target: String, reply: Reply<bool> },
    SendDtmf { digits: String, reply: Reply<bool> },
    /// `None` toggles; replies with "microphone enabled"
    SetMicMuted { muted: Option<bool>, reply: Reply<bool> },
    /// `None` toggles; replies with "speaker on", possibly deferred
    SetSpeaker { speaker: Option<bool>, reply: RouteReply },
    RefreshRegistration { reply: Reply<()> },
    Unregister { reply: Reply<bool> },
    RegistrationState { reply: oneshot::Sender<RegistrationState> },
    MicEnabled { reply: oneshot::Sender<bool> },
    SpeakerEnabled { reply: oneshot::Sender<bool> },
    CurrentCallId { reply: oneshot::Sender<Option<CallId>> },
    MissedCalls { reply: oneshot::Sender<Vec<MissedCall>> },
    MobilityStats { reply: oneshot::Sender<MobilityStats> },
    Shutdown { reply: oneshot::Sender<()> },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Initialize { .. } => "initialize",
            Command::Dial { .. } => "dial",
            Command::Answer { .. } => "answer",
            Command::Hangup { .. } => "hangup",
            Command::Reject { .. } => "reject",
            Command::Hold { .. } => "hold",
            Command::Transfer { .. } => "transfer",
            Command::SendDtmf { .. } => "send_dtmf",
            Command::SetMicMuted { .. } => "set_mic_muted",
            Command::SetSpeaker { .. } => "set_speaker",
            Command::RefreshRegistration { .. } => "refresh_registration",
            Command::Unregister { .. } => "unregister",
            Command::RegistrationState { .. } => "registration_state",
            Command::MicEnabled { .. } => "mic_enabled",
            Command::SpeakerEnabled { .. } => "speaker_enabled",
            Command::CurrentCallId { .. } => "current_call_id",
            Command::MissedCalls { .. } => "missed_calls",
            Command::MobilityStats { .. } => "mobility_stats",
            Command::Shutdown { .. } => "shutdown",
        }
    }
}

/// Receiving ends of the coordinator's inputs
struct Inputs {
    commands: mpsc::Receiver<Command>,
    engine_events: mpsc::Receiver<EngineEvent>,
    notifications: mpsc::Receiver<PlatformNotification>,
    timer_fired: mpsc::UnboundedReceiver<TimerFired>,
}

/// State owned by the coordination task
pub struct SessionCoordinator {
    engine: Arc<dyn SipEngine>,
    platform: Arc<dyn NetworkPlatform>,
    audio: Arc<dyn AudioBackend>,
    tones: Arc<dyn ToneBackend>,

    calls: CallMachine,
    registration: RegistrationMachine,
    network: NetworkMobilityManager,
    router: AudioRouter,
    tone: ToneController,
    timers: Timers,
    events: EventEmitter,
}

impl SessionCoordinator {
    /// Validate the configuration and spawn the coordination task
    ///
    /// Returns the bridge handle, the sender the engine adapter reports
    /// through, and the task's join handle.
    pub fn start(
        config: MobileConfig,
        engine: Arc<dyn SipEngine>,
        platform: Arc<dyn NetworkPlatform>,
        audio: Arc<dyn AudioBackend>,
        tones: Arc<dyn ToneBackend>,
    ) -> MobileResult<(CoordinatorHandle, EngineEventSender, JoinHandle<()>)> {
        config.validate()?;

        let capacity = config.event_capacity;
        let (command_tx, commands) = mpsc::channel(capacity);
        let (engine_tx, engine_events) = mpsc::channel(capacity);
        let (notify_tx, notifications) = mpsc::channel(capacity);
        let (timers, timer_fired) = Timers::new();
        let events = EventEmitter::new(capacity);

        let coordinator = Self {
            engine,
            platform,
            audio,
            tones,
            calls: CallMachine::new(),
            registration: RegistrationMachine::new(),
            network: NetworkMobilityManager::new(config.network.clone()),
            router: AudioRouter::new(),
            tone: ToneController::new(config.audio.clone()),
            timers,
            events: events.clone(),
        };
        let inputs = Inputs {
            commands,
            engine_events,
            notifications,
            timer_fired,
        };

        info!(capacity, "Starting session coordinator");
        let task = tokio::spawn(coordinator.run(inputs));
        let handle = CoordinatorHandle::new(command_tx, notify_tx, events);
        Ok((handle, EngineEventSender::new(engine_tx), task))
    }
}
