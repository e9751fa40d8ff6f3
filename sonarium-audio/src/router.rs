//! Crossfade routing between successive session outputs.
//!
//! Every (re)started session gets its own track. `crossfade_to` fades the
//! previous track out while the new one fades in over the same window;
//! `switch_to` snaps instantly. Tracks that have faded out are disconnected
//! from the sink once their window elapses.

use log::{debug, info};

use sonarium_types::{FadeState, Timers, TrackId};

use crate::sink::{AudioSink, GainStage};

/// Router-side view of one output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Track {
    pub id: TrackId,
    pub is_playing: bool,
    pub fade_state: FadeState,
}

#[derive(Debug)]
struct FadeComplete {
    incoming: TrackId,
    outgoing: Vec<TrackId>,
}

pub struct CrossfadeRouter {
    crossfade_duration: f64,
    tracks: Vec<Track>,
    next_id: u32,
    completions: Timers<FadeComplete, f64>,
}

impl CrossfadeRouter {
    pub fn new(crossfade_duration: f64) -> Self {
        Self {
            crossfade_duration: crossfade_duration.max(0.0),
            tracks: Vec::new(),
            next_id: 1,
            completions: Timers::new(),
        }
    }

    pub fn crossfade_duration(&self) -> f64 {
        self.crossfade_duration
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn is_crossfading(&self) -> bool {
        self.tracks.iter().any(|t| t.fade_state.is_fading())
    }

    /// Create a silent, idle track connected to the sink.
    pub fn create_track<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> TrackId {
        let id = TrackId::new(self.next_id);
        self.next_id += 1;
        sink.add_track(id, 0.0);
        self.tracks.push(Track {
            id,
            is_playing: false,
            fade_state: FadeState::Idle,
        });
        id
    }

    /// Create a track and bring it in: crossfaded if something is playing, snapped otherwise.
    pub fn start_track<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> TrackId {
        let anything_playing = self.tracks.iter().any(|t| t.is_playing);
        let id = self.create_track(sink);
        if anything_playing {
            self.crossfade_to(sink, id);
        } else {
            self.switch_to(sink, id);
        }
        id
    }

    /// Fade every playing track out and `incoming` in over the crossfade window.
    pub fn crossfade_to<S: AudioSink + ?Sized>(&mut self, sink: &mut S, incoming: TrackId) {
        self.ensure_known(sink, incoming);
        let now = sink.current_time();
        let end = now + self.crossfade_duration;

        // A crossfade interrupting another absorbs its pending completion.
        self.completions.clear();

        let mut outgoing = Vec::new();
        for track in self.tracks.iter_mut() {
            if track.id == incoming || !track.is_playing {
                continue;
            }
            sink.hold_gain(track.id, GainStage::Crossfade, now);
            sink.ramp_gain(track.id, GainStage::Crossfade, 0.0, end);
            track.fade_state = FadeState::Out;
            outgoing.push(track.id);
        }

        sink.hold_gain(incoming, GainStage::Crossfade, now);
        sink.set_gain(incoming, GainStage::Crossfade, 0.0, now);
        sink.ramp_gain(incoming, GainStage::Crossfade, 1.0, end);
        if let Some(track) = self.tracks.iter_mut().find(|t| t.id == incoming) {
            track.is_playing = true;
            track.fade_state = FadeState::In;
        }

        info!(
            target: "audio::router",
            "crossfading {:?} -> {} over {:.2}s",
            outgoing, incoming, self.crossfade_duration
        );
        self.completions.schedule(end, FadeComplete { incoming, outgoing });
    }

    /// Snap every other track to silence and `incoming` to full gain, immediately.
    pub fn switch_to<S: AudioSink + ?Sized>(&mut self, sink: &mut S, incoming: TrackId) {
        self.ensure_known(sink, incoming);
        let now = sink.current_time();
        self.completions.clear();

        let outgoing: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|t| t.id != incoming)
            .map(|t| t.id)
            .collect();
        for id in &outgoing {
            sink.hold_gain(*id, GainStage::Crossfade, now);
            sink.set_gain(*id, GainStage::Crossfade, 0.0, now);
        }
        self.dispose_tracks(sink, &outgoing);

        sink.hold_gain(incoming, GainStage::Crossfade, now);
        sink.set_gain(incoming, GainStage::Crossfade, 1.0, now);
        if let Some(track) = self.tracks.iter_mut().find(|t| t.id == incoming) {
            track.is_playing = true;
            track.fade_state = FadeState::Stable;
        }
        debug!(target: "audio::router", "switched to {}", incoming);
    }

    /// Finish any crossfade whose window has elapsed. Returns true if one completed.
    pub fn update<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> bool {
        let due = self.completions.take_due(sink.current_time());
        let completed = !due.is_empty();
        for done in due {
            self.dispose_tracks(sink, &done.outgoing);
            if let Some(track) = self.tracks.iter_mut().find(|t| t.id == done.incoming) {
                track.fade_state = FadeState::Stable;
            }
            debug!(target: "audio::router", "crossfade to {} complete", done.incoming);
        }
        completed
    }

    /// Disconnect every track and forget pending completions.
    pub fn dispose<S: AudioSink + ?Sized>(&mut self, sink: &mut S) {
        self.completions.clear();
        for track in self.tracks.drain(..) {
            sink.remove_track(track.id);
        }
    }

    fn dispose_tracks<S: AudioSink + ?Sized>(&mut self, sink: &mut S, ids: &[TrackId]) {
        for id in ids {
            sink.remove_track(*id);
        }
        self.tracks.retain(|t| !ids.contains(&t.id));
    }

    fn ensure_known<S: AudioSink + ?Sized>(&mut self, sink: &mut S, id: TrackId) {
        if self.track(id).is_none() {
            sink.add_track(id, 0.0);
            self.tracks.push(Track {
                id,
                is_playing: false,
                fade_state: FadeState::Idle,
            });
            self.next_id = self.next_id.max(id.get() + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioGraph;

    fn crossfade_gain(graph: &AudioGraph, id: TrackId, t: f64) -> f32 {
        graph.gain_at(id, GainStage::Crossfade, t).unwrap_or(0.0)
    }

    #[test]
    fn first_track_snaps_in() {
        let mut graph = AudioGraph::new(1000, 2);
        let mut router = CrossfadeRouter::new(2.0);
        let a = router.start_track(&mut graph);

        assert!(router.track(a).unwrap().is_playing);
        assert_eq!(router.track(a).unwrap().fade_state, FadeState::Stable);
        assert!(!router.is_crossfading());
        assert_eq!(crossfade_gain(&graph, a, 0.0), 1.0);
    }

    #[test]
    fn crossfade_gains_sum_to_unity() {
        let mut graph = AudioGraph::new(1000, 2);
        let mut router = CrossfadeRouter::new(2.0);
        let a = router.start_track(&mut graph);
        graph.advance(1.0);
        let b = router.start_track(&mut graph);

        assert!(router.is_crossfading());
        assert_eq!(router.track(a).unwrap().fade_state, FadeState::Out);
        assert_eq!(router.track(b).unwrap().fade_state, FadeState::In);

        for i in 0..=20 {
            let t = 1.0 + i as f64 * 0.1;
            let sum = crossfade_gain(&graph, a, t) + crossfade_gain(&graph, b, t);
            assert!((sum - 1.0).abs() < 1e-4, "sum {} at t={}", sum, t);
        }
    }

    #[test]
    fn completed_crossfade_disposes_old_track() {
        let mut graph = AudioGraph::new(1000, 2);
        let mut router = CrossfadeRouter::new(2.0);
        let a = router.start_track(&mut graph);
        let b = router.start_track(&mut graph);

        graph.advance(1.0);
        assert!(!router.update(&mut graph));
        assert!(graph.has_track(a));

        graph.advance(1.0);
        assert!(router.update(&mut graph));
        assert!(!graph.has_track(a));
        assert!(router.track(a).is_none());
        assert_eq!(router.track(b).unwrap().fade_state, FadeState::Stable);
        assert!(!router.is_crossfading());
        assert_eq!(crossfade_gain(&graph, b, 2.0), 1.0);
    }

    #[test]
    fn switch_snaps_and_disposes_immediately() {
        let mut graph = AudioGraph::new(1000, 2);
        let mut router = CrossfadeRouter::new(2.0);
        let a = router.start_track(&mut graph);
        let b = router.create_track(&mut graph);
        router.switch_to(&mut graph, b);

        assert!(!graph.has_track(a));
        assert_eq!(router.tracks().len(), 1);
        assert_eq!(crossfade_gain(&graph, b, 0.0), 1.0);
        assert!(!router.is_crossfading());
    }

    #[test]
    fn interrupted_crossfade_fades_out_both_predecessors() {
        let mut graph = AudioGraph::new(1000, 2);
        let mut router = CrossfadeRouter::new(2.0);
        let a = router.start_track(&mut graph);
        let b = router.start_track(&mut graph);
        graph.advance(1.0);
        let c = router.start_track(&mut graph);

        // Mid-way values are held, then ramp to zero by t = 3.0.
        assert!((crossfade_gain(&graph, a, 1.0) - 0.5).abs() < 1e-4);
        assert!((crossfade_gain(&graph, b, 1.0) - 0.5).abs() < 1e-4);

        graph.advance(2.0);
        assert!(router.update(&mut graph));
        assert_eq!(router.tracks().len(), 1);
        assert_eq!(router.track(c).unwrap().fade_state, FadeState::Stable);
        assert!(!graph.has_track(a) && !graph.has_track(b));
    }

    #[test]
    fn dispose_disconnects_everything() {
        let mut graph = AudioGraph::new(1000, 2);
        let mut router = CrossfadeRouter::new(2.0);
        router.start_track(&mut graph);
        router.start_track(&mut graph);
        router.dispose(&mut graph);

        assert_eq!(graph.track_count(), 0);
        assert!(router.tracks().is_empty());
        graph.advance(5.0);
        assert!(!router.update(&mut graph));
    }
}
