//! Gapless scheduling of decoded chunks on the output clock.
//!
//! Two layers keep playback smooth:
//! - a start-up cushion: the first buffer after a (re)start is placed
//!   `buffer_time` ahead of the clock and the track envelope fades in
//!   from there, absorbing network jitter;
//! - per-chunk edge fades, masking the splice between chunks produced by
//!   independent generation calls.
//!
//! If the queue ever runs dry the chunk is dropped and the cushion re-arms
//! on the next one.

use log::{debug, warn};

use sonarium_types::TrackId;

use crate::pcm::PlanarBuffer;
use crate::sink::{AudioSink, GainStage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Lead time before the first buffer becomes audible, in seconds.
    pub buffer_time: f64,
    /// Envelope fade-in applied when the cushion starts playing, in seconds.
    pub fade_in: f64,
    /// Linear fade at each chunk boundary, in seconds.
    pub edge_fade: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            buffer_time: 2.0,
            fade_in: 0.75,
            edge_fade: 0.005,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleOutcome {
    /// First buffer since a (re)start; audible from `start`.
    Cushioned { start: f64 },
    Scheduled { start: f64 },
    /// The queue starved; the buffer was dropped.
    Underrun { late_by: f64 },
}

#[derive(Debug)]
pub struct AudioDecodeScheduler {
    config: SchedulerConfig,
    /// Output time where the next buffer starts. Zero means "not armed".
    next_start_time: f64,
}

impl AudioDecodeScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            next_start_time: 0.0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn is_armed(&self) -> bool {
        self.next_start_time > 0.0
    }

    /// Forget the timeline; the next buffer builds a fresh cushion.
    pub fn restart(&mut self) {
        self.next_start_time = 0.0;
    }

    /// Place `buffer` on `track` so it follows the previous one without a gap.
    pub fn schedule<S: AudioSink + ?Sized>(
        &mut self,
        sink: &mut S,
        track: TrackId,
        mut buffer: PlanarBuffer,
    ) -> ScheduleOutcome {
        let now = sink.current_time();

        if self.next_start_time > 0.0 && self.next_start_time < now {
            let late_by = now - self.next_start_time;
            warn!(target: "audio::scheduler", "underrun on {}: queue ran dry {:.3}s ago", track, late_by);
            self.next_start_time = 0.0;
            return ScheduleOutcome::Underrun { late_by };
        }

        buffer.apply_edge_fades(self.config.edge_fade);
        let duration = buffer.duration();

        if self.next_start_time == 0.0 {
            let start = now + self.config.buffer_time;
            sink.hold_gain(track, GainStage::Envelope, now);
            sink.set_gain(track, GainStage::Envelope, 0.0, now);
            sink.set_gain(track, GainStage::Envelope, 0.0, start);
            sink.ramp_gain(track, GainStage::Envelope, 1.0, start + self.config.fade_in);
            sink.schedule_buffer(track, buffer, start);
            self.next_start_time = start + duration;
            debug!(target: "audio::scheduler", "cushion armed on {}: audible at {:.3}s", track, start);
            return ScheduleOutcome::Cushioned { start };
        }

        let start = self.next_start_time;
        sink.schedule_buffer(track, buffer, start);
        self.next_start_time += duration;
        ScheduleOutcome::Scheduled { start }
    }
}
