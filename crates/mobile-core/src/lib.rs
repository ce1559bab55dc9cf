//! # Mobile Session & Connectivity Coordinator
//!
//! Keeps a SIP session usable on a phone while the device moves between
//! networks, toggles its hotspot and switches audio routes. The crate sits
//! between a platform bridge (the mobile app) and a SIP engine:
//!
//! - **Call control** - dial, answer, hangup, hold, transfer, DTMF, with
//!   one current call tracked in a [`CallRegistry`](registry::CallRegistry)
//! - **Registration** - agent lifecycle and the bridge-visible registration state
//! - **Network mobility** - address diffing, transport resets, DNS and the
//!   Wi-Fi performance lock, driven by connectivity notifications
//! - **Audio** - speaker/earpiece routing, ringtone, ringback and busy tones,
//!   vibration and call volume, driven by call lifecycle events
//!
//! The SIP engine and the platform are consumed through traits
//! ([`SipEngine`], [`NetworkPlatform`], [`AudioBackend`], [`ToneBackend`]).
//! The [`mock`] module provides in-memory implementations.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_mobile_core::{AccountConfig, MobileConfig, MobileEvent, SessionCoordinator};
//! use rvoip_mobile_core::mock::{MockAudioBackend, MockEngine, MockNetworkPlatform, MockToneBackend};
//!
//! #[tokio::main]
//! async fn main() -> rvoip_mobile_core::MobileResult<()> {
//!     let (handle, engine_events, _task) = SessionCoordinator::start(
//!         MobileConfig::default(),
//!         Arc::new(MockEngine::new()),
//!         Arc::new(MockNetworkPlatform::new()),
//!         Arc::new(MockAudioBackend::new()),
//!         Arc::new(MockToneBackend::new()),
//!     )?;
//!
//!     let mut events = handle.subscribe_simple();
//!     handle.initialize(AccountConfig::new("alice", "example.com", "secret")).await?;
//!
//!     // The engine adapter reports through `engine_events`
//!     engine_events.send_raw("registered", None).await?;
//!     while let Some(event) = events.next().await {
//!         if let MobileEvent::RegistrationStateChanged { state } = event {
//!             println!("registration: {}", state);
//!             break;
//!         }
//!     }
//!
//!     handle.shutdown().await
//! }
//! ```

pub mod audio;
pub mod call;
pub mod call_machine;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod mock;
pub mod network;
pub mod registration;
pub mod registry;
pub mod timer;

pub use audio::{AudioBackend, AudioMode, AudioRoute, ToneBackend};
pub use call::{Call, CallDirection, CallId, CallState, MissedCall};
pub use config::{AccountConfig, AddressFamily, DnsMode, MobileConfig};
pub use coordinator::{CoordinatorHandle, PlatformNotification, SessionCoordinator};
pub use engine::{AgentHandle, CallHandle, EngineEvent, EngineEventSender, SipEngine};
pub use error::{MobileError, MobileResult};
pub use events::{EventStream, MobileEvent};
pub use logging::{setup_logging, LoggingConfig};
pub use network::{NetworkNotification, NetworkPlatform};
pub use registration::RegistrationState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
