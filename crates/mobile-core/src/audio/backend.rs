//! Platform audio primitives
//!
//! Backends describe what they can do instead of the coordinator branching on
//! OS versions. A backend whose speaker switch needs the device in normal mode
//! says so through [`AudioBackend::speaker_requires_normal_mode`]. A backend
//! that cannot loop its ringtone says so through
//! [`ToneBackend::supports_looping_ringtone`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioRoute {
    Earpiece,
    Speaker,
}

impl fmt::Display for AudioRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioRoute::Earpiece => write!(f, "earpiece"),
            AudioRoute::Speaker => write!(f, "speaker"),
        }
    }
}

/// Device audio mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioMode {
    Normal,
    InCommunication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RingerMode {
    Silent,
    Vibrate,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioStream {
    Music,
    VoiceCall,
}

/// Tones played through the call tone player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tone {
    Ringback,
    Busy,
}

impl Tone {
    /// Resource name for a country, e.g. `ringback_us`
    pub fn resource_name(&self, country: &str) -> String {
        match self {
            Tone::Ringback => format!("ringback_{}", country),
            Tone::Busy => format!("busy_{}", country),
        }
    }
}

/// Output routing, audio mode, stream volumes and focus
pub trait AudioBackend: Send + Sync {
    /// Routes that can currently be selected
    fn available_routes(&self) -> Vec<AudioRoute>;

    fn current_route(&self) -> AudioRoute;

    /// Select a route explicitly; `false` if the platform refused
    fn apply_route(&self, route: AudioRoute) -> bool;

    /// Drop any explicit route selection
    fn clear_route(&self);

    fn mode(&self) -> AudioMode;

    /// Request a mode change; may complete asynchronously, confirmed by an
    /// `AudioModeChanged` platform notification
    fn set_mode(&self, mode: AudioMode);

    /// Whether switching to speaker needs normal mode first
    fn speaker_requires_normal_mode(&self) -> bool;

    fn stream_volume(&self, stream: AudioStream) -> u32;

    fn max_stream_volume(&self, stream: AudioStream) -> u32;

    fn set_stream_volume(&self, stream: AudioStream, volume: u32);

    fn abandon_focus(&self);
}

/// Ringtone, call tones, vibration and the ringer policy inputs
pub trait ToneBackend: Send + Sync {
    fn ringer_mode(&self) -> RingerMode;

    fn ring_volume(&self) -> u32;

    /// User setting "vibrate when ringing"
    fn vibrate_when_ringing(&self) -> bool;

    fn supports_looping_ringtone(&self) -> bool;

    fn start_ringtone(&self, looping: bool);

    fn is_ringtone_playing(&self) -> bool;

    fn stop_ringtone(&self);

    /// Start a tone resource; `false` if the resource does not exist
    fn play_tone(&self, tone: Tone, resource: &str, looping: bool) -> bool;

    fn stop_tone(&self);

    fn vibrate(&self, duration: Duration);

    fn cancel_vibration(&self);
}
