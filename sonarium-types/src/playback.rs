use serde::{Deserialize, Serialize};

/// Playback state exposed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    /// Waiting for the scheduling cushion to fill.
    Loading,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }

    /// Whether inbound audio should be decoded and scheduled.
    pub fn accepts_audio(self) -> bool {
        matches!(self, Self::Loading | Self::Playing)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fade status of a routed track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FadeState {
    In,
    Out,
    Stable,
    #[default]
    Idle,
}

impl FadeState {
    pub fn is_fading(self) -> bool {
        matches!(self, Self::In | Self::Out)
    }
}
