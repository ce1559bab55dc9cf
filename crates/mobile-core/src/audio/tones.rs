//! Ringtone, call tones, vibration and call volume
//!
//! Only one tone player runs at a time: ringtone, ringback or busy. Starting a
//! tone while another is active does nothing until that one is stopped.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::AudioSettings;
use crate::timer::{TimerKind, Timers};

use super::backend::{AudioBackend, AudioMode, AudioStream, RingerMode, Tone, ToneBackend};

pub const RINGTONE_RESTART_PERIOD: Duration = Duration::from_secs(1);
pub const VIBRATION_INITIAL_DELAY: Duration = Duration::from_millis(500);
pub const VIBRATION_PERIOD: Duration = Duration::from_millis(2000);
pub const VIBRATION_PULSE: Duration = Duration::from_millis(500);

const VOLUME_STREAMS: [AudioStream; 2] = [AudioStream::Music, AudioStream::VoiceCall];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePlayer {
    Ringtone,
    Ringback,
    Busy,
}

/// Whether the ringer policy asks for vibration while ringing
pub fn should_vibrate(tones: &dyn ToneBackend) -> bool {
    match tones.ringer_mode() {
        RingerMode::Silent => false,
        RingerMode::Vibrate => true,
        RingerMode::Normal => tones.ring_volume() != 0 && tones.vibrate_when_ringing(),
    }
}

/// Scaled stream volume for a 0..=10 call volume step
pub fn scaled_volume(step: u8, max: u32) -> u32 {
    (f64::from(step) * 0.1 * f64::from(max)).round() as u32
}

#[derive(Debug)]
pub struct ToneController {
    settings: AudioSettings,
    active: Option<ActivePlayer>,
    saved_volumes: Vec<(AudioStream, u32)>,
}

impl ToneController {
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            settings,
            active: None,
            saved_volumes: Vec::new(),
        }
    }

    pub fn active(&self) -> Option<ActivePlayer> {
        self.active
    }

    pub fn start_ringing(&mut self, tones: &dyn ToneBackend, timers: &mut Timers) {
        if let Some(active) = self.active {
            debug!(?active, "Tone player busy, not starting ringtone");
            return;
        }
        if tones.supports_looping_ringtone() {
            tones.start_ringtone(true);
        } else {
            tones.start_ringtone(false);
            timers.schedule_repeating(
                TimerKind::RingtoneRestart,
                RINGTONE_RESTART_PERIOD,
                RINGTONE_RESTART_PERIOD,
            );
        }
        if should_vibrate(tones) {
            timers.schedule_repeating(TimerKind::Vibrate, VIBRATION_INITIAL_DELAY, VIBRATION_PERIOD);
        }
        self.active = Some(ActivePlayer::Ringtone);
        info!("Ringing started");
    }

    pub fn stop_ringing(&mut self, tones: &dyn ToneBackend, timers: &mut Timers) {
        timers.cancel_kind(TimerKind::RingtoneRestart);
        if timers.cancel_kind(TimerKind::Vibrate) > 0 {
            tones.cancel_vibration();
        }
        if self.active == Some(ActivePlayer::Ringtone) {
            tones.stop_ringtone();
            self.active = None;
            debug!("Ringing stopped");
        }
    }

    /// Restart timer fired: bring a stopped non-looping ringtone back
    pub fn on_ringtone_tick(&self, tones: &dyn ToneBackend) {
        if self.active == Some(ActivePlayer::Ringtone) && !tones.is_ringtone_playing() {
            tones.start_ringtone(false);
        }
    }

    pub fn on_vibrate_tick(&self, tones: &dyn ToneBackend) {
        if self.active == Some(ActivePlayer::Ringtone) {
            tones.vibrate(VIBRATION_PULSE);
        }
    }

    pub fn play_ringback(&mut self, tones: &dyn ToneBackend) {
        self.play(tones, Tone::Ringback, true);
    }

    /// Play the busy tone once; `false` if it could not be started
    pub fn play_busy(&mut self, tones: &dyn ToneBackend) -> bool {
        self.play(tones, Tone::Busy, false) && self.active == Some(ActivePlayer::Busy)
    }

    pub fn stop_tone(&mut self, tones: &dyn ToneBackend) {
        if matches!(self.active, Some(ActivePlayer::Ringback | ActivePlayer::Busy)) {
            tones.stop_tone();
            self.active = None;
        }
    }

    /// The tone player completed; `true` if it was the busy tone
    pub fn on_tone_finished(&mut self) -> bool {
        if self.active == Some(ActivePlayer::Busy) {
            self.active = None;
            true
        } else {
            false
        }
    }

    /// Raise the music and voice-call streams to the configured call volume
    pub fn apply_call_volume(&mut self, audio: &dyn AudioBackend) {
        let step = self.settings.call_volume;
        if step == 0 {
            return;
        }
        for stream in VOLUME_STREAMS {
            if !self.saved_volumes.iter().any(|(s, _)| *s == stream) {
                self.saved_volumes.push((stream, audio.stream_volume(stream)));
            }
            let volume = scaled_volume(step, audio.max_stream_volume(stream));
            audio.set_stream_volume(stream, volume);
        }
        debug!(step, "Applied call volume");
    }

    pub fn reset_call_volume(&mut self, audio: &dyn AudioBackend) {
        for (stream, volume) in self.saved_volumes.drain(..) {
            audio.set_stream_volume(stream, volume);
        }
    }

    /// Hand audio back: restore volumes, abandon focus, normal mode
    pub fn release_audio(&mut self, audio: &dyn AudioBackend) {
        self.reset_call_volume(audio);
        audio.abandon_focus();
        audio.set_mode(AudioMode::Normal);
        debug!("Released audio");
    }

    /// Stop every player regardless of what is active
    pub fn stop_all(&mut self, tones: &dyn ToneBackend, timers: &mut Timers) {
        self.stop_ringing(tones, timers);
        self.stop_tone(tones);
        self.active = None;
    }

    fn play(&mut self, tones: &dyn ToneBackend, tone: Tone, looping: bool) -> bool {
        if let Some(active) = self.active {
            debug!(?active, ?tone, "Tone player busy");
            return true;
        }
        let resource = tone.resource_name(&self.settings.tone_country);
        if tones.play_tone(tone, &resource, looping) {
            self.active = Some(match tone {
                Tone::Ringback => ActivePlayer::Ringback,
                Tone::Busy => ActivePlayer::Busy,
            });
            true
        } else {
            error!(%resource, "Tone resource not found");
            false
        }
    }
}
