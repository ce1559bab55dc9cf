//! Coordination task: input dispatch, action execution and teardown

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::audio::AudioRouter;
use crate::call_machine::CallAction;
use crate::engine::EngineEvent;
use crate::events::MobileEvent;
use crate::network::NetworkNotification;
use crate::timer::{TimerFired, TimerKind};

use super::{Command, Inputs, PlatformNotification, SessionCoordinator};

impl SessionCoordinator {
    /// Main loop; returns after `shutdown` or once every handle is gone
    pub(super) async fn run(mut self, mut inputs: Inputs) {
        info!("Session coordinator event loop started");

        loop {
            // Platform input first so a pass sees everything already queued
            tokio::select! {
                biased;

                Some(notification) = inputs.notifications.recv() => {
                    self.handle_notification(notification).await;
                }
                Some(event) = inputs.engine_events.recv() => {
                    self.handle_engine_event(event);
                }
                Some(fired) = inputs.timer_fired.recv() => {
                    self.handle_timer(fired).await;
                }
                command = inputs.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All coordinator handles dropped");
                        self.teardown().await;
                        break;
                    }
                },
            }

            // Absorb whatever else queued up meanwhile into a single pass
            while let Ok(notification) = inputs.notifications.try_recv() {
                self.handle_notification(notification).await;
            }
            if self.network.take_pending() && self.network.is_running() {
                self.network
                    .reconcile(self.platform.as_ref(), self.engine.as_ref())
                    .await;
            }
        }

        info!("Session coordinator event loop ended");
    }

    async fn handle_command(&mut self, command: Command) {
        debug!(command = command.name(), "Handling command");
        match command {
            Command::Initialize { account, reply } => {
                let _ = reply.send(self.initialize(account).await);
            }
            Command::Dial { target, reply } => {
                let _ = reply.send(self.dial(&target).await);
            }
            Command::Answer { reply } => {
                let _ = reply.send(self.answer().await);
            }
            Command::Hangup { reply } => {
                let _ = reply.send(self.hangup().await);
            }
            Command::Reject { reply } => {
                let _ = reply.send(self.reject().await);
            }
            Command::Hold { hold, reply } => {
                let _ = reply.send(self.hold(hold).await);
            }
            Command::Transfer { target, reply } => {
                let _ = reply.send(self.transfer(&target).await);
            }
            Command::SendDtmf { digits, reply } => {
                let _ = reply.send(self.send_dtmf(&digits).await);
            }
            Command::SetMicMuted { muted, reply } => {
                let _ = reply.send(self.set_mic_muted(muted).await);
            }
            Command::SetSpeaker { speaker, reply } => match speaker {
                Some(speaker) => self.router.set_route(speaker, self.audio.as_ref(), reply),
                None => self.router.toggle(self.audio.as_ref(), reply),
            },
            Command::RefreshRegistration { reply } => {
                let _ = reply.send(self.refresh_registration().await);
            }
            Command::Unregister { reply } => {
                let _ = reply.send(self.unregister().await);
            }
            Command::RegistrationState { reply } => {
                let _ = reply.send(self.registration.state());
            }
            Command::MicEnabled { reply } => {
                let _ = reply.send(self.mic_enabled().await);
            }
            Command::SpeakerEnabled { reply } => {
                let _ = reply.send(AudioRouter::is_speaker_on(self.audio.as_ref()));
            }
            Command::CurrentCallId { reply } => {
                let _ = reply.send(self.calls.registry().current().map(|call| call.id));
            }
            Command::MissedCalls { reply } => {
                let _ = reply.send(self.calls.missed_calls().to_vec());
            }
            Command::MobilityStats { reply } => {
                let _ = reply.send(self.network.stats());
            }
            // Handled by the loop itself
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Registration(signal) => {
                let state = self.registration.on_signal(&signal);
                self.events.emit(MobileEvent::RegistrationStateChanged { state });
            }
            EngineEvent::Call(event) => {
                let actions = self.calls.handle(&event, self.registration.agent());
                self.execute(actions);
            }
        }
    }

    async fn handle_notification(&mut self, notification: PlatformNotification) {
        match notification {
            PlatformNotification::Network(NetworkNotification::HotspotChanged { enabled }) => {
                self.network
                    .on_hotspot_changed(enabled, self.engine.as_ref(), &mut self.timers)
                    .await;
            }
            PlatformNotification::Network(notification) => {
                self.network.observe(&notification);
            }
            PlatformNotification::AudioModeChanged(mode) => {
                debug!(?mode, "Audio mode changed");
                self.router.on_mode_changed(mode, self.audio.as_ref());
            }
            PlatformNotification::ToneFinished => {
                if self.tone.on_tone_finished() {
                    let actions = self.calls.on_tone_finished();
                    self.execute(actions);
                }
            }
        }
    }

    async fn handle_timer(&mut self, fired: TimerFired) {
        if !self.timers.accept(&fired) {
            return;
        }
        match fired.kind {
            TimerKind::HotspotDebounce => {
                self.network
                    .on_hotspot_debounce(self.platform.as_ref(), self.engine.as_ref(), &mut self.timers)
                    .await;
            }
            TimerKind::HotspotFollowUp => {
                if self.network.is_running() {
                    self.network.request();
                }
            }
            TimerKind::RingtoneRestart => self.tone.on_ringtone_tick(self.tones.as_ref()),
            TimerKind::Vibrate => self.tone.on_vibrate_tick(self.tones.as_ref()),
        }
    }

    /// Run call-machine actions in order
    pub(super) fn execute(&mut self, actions: Vec<CallAction>) {
        let mut queue: VecDeque<CallAction> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                CallAction::StartRinging => self.tone.start_ringing(self.tones.as_ref(), &mut self.timers),
                CallAction::StopRinging => self.tone.stop_ringing(self.tones.as_ref(), &mut self.timers),
                CallAction::PlayRingback => self.tone.play_ringback(self.tones.as_ref()),
                CallAction::StopTone => self.tone.stop_tone(self.tones.as_ref()),
                CallAction::PlayBusy => {
                    if !self.tone.play_busy(self.tones.as_ref()) {
                        // No completion will ever arrive; finish the close now
                        queue.extend(self.calls.on_tone_finished());
                    }
                }
                CallAction::ReleaseAudio => {
                    self.router.cancel_pending();
                    self.tone.release_audio(self.audio.as_ref());
                }
                CallAction::Emit(event) => self.events.emit(event),
            }
        }
    }

    /// Stop timers, the performance lock, playback and registration, in that order
    async fn teardown(&mut self) {
        info!("Tearing down session");
        self.timers.cancel_all();
        self.network.stop(self.platform.as_ref());

        self.tone.stop_all(self.tones.as_ref(), &mut self.timers);
        self.tones.cancel_vibration();
        self.router.cancel_pending();
        self.audio.abandon_focus();

        if let Some(agent) = self.registration.begin_unregister() {
            self.events.emit(MobileEvent::RegistrationStateChanged {
                state: self.registration.state(),
            });
            if let Err(e) = self.engine.unregister(agent).await {
                warn!(operation = "unregister", %agent, error = %e, "Unregister on shutdown failed");
            }
        }
    }
}
