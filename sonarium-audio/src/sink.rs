//! Output seam: the operations the scheduler and router need from an
//! audio output, independent of whether it renders in-process or on a
//! realtime device thread.

use sonarium_types::TrackId;

use crate::pcm::PlanarBuffer;

/// Each track passes through two gain stages in series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GainStage {
    /// Owned by the crossfade router.
    Crossfade,
    /// Owned by the decode scheduler (cushion fade-in) and pause/resume.
    Envelope,
}

pub trait AudioSink {
    /// Current position of the output clock, in seconds.
    fn current_time(&self) -> f64;

    /// Create a track connected to the destination with both stages at `initial_gain`.
    fn add_track(&mut self, track: TrackId, initial_gain: f32);

    /// Disconnect a track from the destination and release its buffers.
    fn remove_track(&mut self, track: TrackId);

    /// Jump a gain stage to `value` at output time `at`.
    fn set_gain(&mut self, track: TrackId, stage: GainStage, value: f32, at: f64);

    /// Freeze a gain stage at whatever value it has at `at`, dropping later automation.
    fn hold_gain(&mut self, track: TrackId, stage: GainStage, at: f64);

    /// Ramp linearly from the previous automation point to `value`, arriving at `end`.
    fn ramp_gain(&mut self, track: TrackId, stage: GainStage, value: f32, end: f64);

    /// Queue a buffer to start playing at output time `start`.
    fn schedule_buffer(&mut self, track: TrackId, buffer: PlanarBuffer, start: f64);

    /// Drop every buffer queued on a track, including the one playing.
    fn clear_track(&mut self, track: TrackId);
}
