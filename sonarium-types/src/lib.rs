//! # sonarium-types
//!
//! Shared type definitions for the Sonarium soundscape engine.
//! This crate contains plain data used across sonarium-net, sonarium-audio
//! and sonarium-core.

mod anchor;
mod geometry;
mod playback;
mod prompt;
pub mod timer;

pub use anchor::{Anchor, AnchorId};
pub use geometry::Vec3;
pub use playback::{FadeState, PlaybackState};
pub use prompt::WeightedPrompt;
pub use timer::{TaskId, Timers};

/// Identifier for one audio output path in the routing graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(u32);

impl TrackId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track-{}", self.0)
    }
}
