//! # sonarium-core
//!
//! Proximity-driven generative soundscape engine. Turns a moving listener
//! position into a blend of weighted prompts, streams that blend to a
//! generative-music service and plays the returned audio back without
//! gaps or clicks, reconnecting with backoff when the service drops.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Instant;
//! use sonarium_core::config::Config;
//! use sonarium_core::engine::SoundscapeEngine;
//! use sonarium_audio::AudioGraph;
//! use sonarium_net::TcpConnector;
//!
//! let config = Config::load();
//! let connector = TcpConnector::new(config.endpoint());
//! let sink = AudioGraph::new(48_000, 2);
//! let clock = Instant::now();
//!
//! let mut engine = SoundscapeEngine::new(
//!     config.engine_config(),
//!     config.anchors(),
//!     Box::new(connector),
//!     sink,
//!     Box::new(MyObserver),
//!     camera_position,
//!     clock.elapsed(),
//! );
//! engine.connect()?;
//! engine.play()?;
//! loop {
//!     engine.tick(camera_position, clock.elapsed());
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`sampler`]: `PositionSampler` (time- and distance-gated movement detection)
//! - [`proximity`]: `ProximityWeightEngine` (falloff, smoothing, change detection)
//! - [`reconnect`]: `ReconnectPolicy` (capped exponential backoff)
//! - [`client`]: `GenerativeSessionClient` (session lifecycle, audio scheduling, crossfades)
//! - [`engine`]: `SoundscapeEngine` and `SoundscapeObserver` (the composition root)
//! - [`config`]: TOML configuration (embedded defaults + user override)
//! - [`error`]: `ClientError`, `ConfigError`

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod proximity;
pub mod reconnect;
pub mod sampler;

pub use client::{ClientConfig, ClientEvent, ConnectionState, GenerativeSessionClient};
pub use config::Config;
pub use engine::{EngineConfig, SoundscapeEngine, SoundscapeObserver};
pub use error::{ClientError, ConfigError};
pub use proximity::{DebugEntry, Falloff, ProximityConfig, ProximityResult, ProximityWeightEngine};
pub use reconnect::ReconnectPolicy;
pub use sampler::{PositionSampler, SamplerConfig};
