//! Playback state as seen by observers.
//!
//! Transitions are a pure function of (state, event); the machine wrapper
//! only remembers the current state and reports whether it changed.

use sonarium_types::PlaybackState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Play,
    Pause,
    Stop,
    /// The start-up cushion has been audible for its full duration.
    CushionFilled,
    /// The scheduling queue starved.
    Underrun,
    /// Unrecoverable failure (e.g. reconnection exhausted).
    Fatal,
    /// A fresh track replaced the current one; its cushion must fill again.
    Restart,
}

/// Compute the state following `event`. Events that make no sense in
/// `state` leave it unchanged.
pub fn transition(state: PlaybackState, event: PlaybackEvent) -> PlaybackState {
    use PlaybackEvent as E;
    use PlaybackState as S;

    match (state, event) {
        (_, E::Stop) | (_, E::Fatal) => S::Stopped,
        (_, E::Restart) => S::Loading,

        (S::Stopped, E::Play) => S::Loading,
        (S::Paused, E::Play) => S::Playing,

        (S::Loading, E::CushionFilled) => S::Playing,
        (S::Playing, E::Underrun) => S::Loading,

        (S::Playing, E::Pause) | (S::Loading, E::Pause) => S::Paused,

        (state, _) => state,
    }
}

#[derive(Debug, Default)]
pub struct PlaybackStateMachine {
    state: PlaybackState,
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Apply an event. Returns the new state if it differs from the old one.
    pub fn apply(&mut self, event: PlaybackEvent) -> Option<PlaybackState> {
        let next = transition(self.state, event);
        if next == self.state {
            return None;
        }
        self.state = next;
        Some(next)
    }
}
