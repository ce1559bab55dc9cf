//! Audio routing and call tones
//!
//! - [`backend`] - capability-described platform traits
//! - [`routing`] - speaker / earpiece switching with the normal-mode handshake
//! - [`tones`] - ringtone, ringback, busy tone, vibration and call volume

pub mod backend;
pub mod routing;
pub mod tones;

pub use backend::{AudioBackend, AudioMode, AudioRoute, AudioStream, RingerMode, Tone, ToneBackend};
pub use routing::{AudioRouter, RouteReply};
pub use tones::{ActivePlayer, ToneController};
