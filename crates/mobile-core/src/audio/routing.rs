//! Speaker / earpiece routing
//!
//! The model is `Earpiece + Normal ⇄ Speaker + InCommunication`. On backends
//! that need normal mode before a speaker switch, a request made in another
//! mode forces normal mode and parks the caller's reply. The switch completes
//! when the platform confirms the mode change, and every parked reply
//! receives the result exactly once.

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioMode, AudioRoute};

/// Reply channel for a routing request; receives "speaker is on"
pub type RouteReply = oneshot::Sender<bool>;

#[derive(Debug, Default)]
pub struct AudioRouter {
    /// Speaker switch waiting for normal mode
    pending: bool,
    waiting: Vec<RouteReply>,
}

impl AudioRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_speaker_on(backend: &dyn AudioBackend) -> bool {
        backend.current_route() == AudioRoute::Speaker
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Route to speaker (`true`) or earpiece (`false`)
    ///
    /// The reply receives the resulting speaker state, either immediately or
    /// once the platform confirms normal mode.
    pub fn set_route(&mut self, speaker: bool, backend: &dyn AudioBackend, reply: RouteReply) {
        let target = if speaker { AudioRoute::Speaker } else { AudioRoute::Earpiece };

        if !backend.available_routes().contains(&target) {
            warn!(route = %target, "Audio route not available");
            let _ = reply.send(Self::is_speaker_on(backend));
            return;
        }

        if self.pending {
            if speaker {
                debug!("Joining pending speaker switch");
                self.waiting.push(reply);
                return;
            }
            debug!("Earpiece requested, dropping pending speaker switch");
            self.cancel_pending();
        }

        if backend.current_route() == target {
            let _ = reply.send(Self::is_speaker_on(backend));
            return;
        }

        match target {
            AudioRoute::Earpiece => {
                if backend.speaker_requires_normal_mode() {
                    backend.clear_route();
                    backend.apply_route(AudioRoute::Earpiece);
                    if backend.mode() == AudioMode::InCommunication {
                        backend.set_mode(AudioMode::Normal);
                    }
                } else {
                    backend.apply_route(AudioRoute::Earpiece);
                }
                info!("Audio routed to earpiece");
                let _ = reply.send(false);
            }
            AudioRoute::Speaker => {
                if !backend.speaker_requires_normal_mode() {
                    let on = backend.apply_route(AudioRoute::Speaker);
                    info!(on, "Audio routed to speaker");
                    let _ = reply.send(on);
                } else if backend.mode() == AudioMode::Normal {
                    let _ = reply.send(Self::switch_to_speaker(backend));
                } else {
                    debug!("Waiting for normal mode before switching to speaker");
                    self.pending = true;
                    self.waiting.push(reply);
                    backend.set_mode(AudioMode::Normal);
                }
            }
        }
    }

    /// Flip between speaker and earpiece
    pub fn toggle(&mut self, backend: &dyn AudioBackend, reply: RouteReply) {
        let speaker = !Self::is_speaker_on(backend);
        self.set_route(speaker, backend, reply);
    }

    /// Platform confirmed a mode change
    pub fn on_mode_changed(&mut self, mode: AudioMode, backend: &dyn AudioBackend) {
        if !self.pending || mode != AudioMode::Normal {
            return;
        }
        self.pending = false;
        let on = Self::switch_to_speaker(backend);
        for reply in self.waiting.drain(..) {
            let _ = reply.send(on);
        }
    }

    /// Resolve every parked request with `false`
    pub fn cancel_pending(&mut self) {
        self.pending = false;
        for reply in self.waiting.drain(..) {
            let _ = reply.send(false);
        }
    }

    fn switch_to_speaker(backend: &dyn AudioBackend) -> bool {
        let on = backend.apply_route(AudioRoute::Speaker);
        backend.set_mode(AudioMode::InCommunication);
        info!(on, "Audio routed to speaker");
        on
    }
}
