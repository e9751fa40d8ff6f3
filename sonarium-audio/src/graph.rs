//! In-process routing graph and renderer.
//!
//! Tracks mix into a single destination. Each track carries a queue of
//! buffers scheduled at absolute output times and two gain stages in
//! series. The clock only advances as frames are rendered, which makes the
//! graph deterministic under test.

use std::collections::BTreeMap;

use log::debug;

use sonarium_types::TrackId;

use crate::gain::GainParam;
use crate::pcm::PlanarBuffer;
use crate::sink::{AudioSink, GainStage};

/// A buffer placed on the output timeline, in output frames.
#[derive(Debug)]
struct ScheduledBuffer {
    start_frame: u64,
    end_frame: u64,
    /// Source frames advanced per output frame.
    step: f64,
    buffer: PlanarBuffer,
}

#[derive(Debug)]
struct TrackNode {
    crossfade: GainParam,
    envelope: GainParam,
    queue: Vec<ScheduledBuffer>,
}

impl TrackNode {
    fn stage_mut(&mut self, stage: GainStage) -> &mut GainParam {
        match stage {
            GainStage::Crossfade => &mut self.crossfade,
            GainStage::Envelope => &mut self.envelope,
        }
    }

    fn stage(&self, stage: GainStage) -> &GainParam {
        match stage {
            GainStage::Crossfade => &self.crossfade,
            GainStage::Envelope => &self.envelope,
        }
    }
}

pub struct AudioGraph {
    sample_rate: u32,
    channels: usize,
    frames_rendered: u64,
    master_gain: f32,
    tracks: BTreeMap<TrackId, TrackNode>,
    scratch: Vec<f32>,
}

impl AudioGraph {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1) as usize,
            frames_rendered: 0,
            master_gain: 1.0,
            tracks: BTreeMap::new(),
            scratch: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain.max(0.0);
    }

    pub fn has_track(&self, track: TrackId) -> bool {
        self.tracks.contains_key(&track)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Effective gain of one stage at output time `t`.
    pub fn gain_at(&self, track: TrackId, stage: GainStage, t: f64) -> Option<f32> {
        self.tracks.get(&track).map(|node| node.stage(stage).value_at(t))
    }

    pub fn queued_buffers(&self, track: TrackId) -> usize {
        self.tracks.get(&track).map_or(0, |node| node.queue.len())
    }

    /// Output time at which the last queued buffer on `track` ends.
    pub fn queued_until(&self, track: TrackId) -> Option<f64> {
        let sr = self.sample_rate as f64;
        self.tracks
            .get(&track)
            .and_then(|node| node.queue.iter().map(|s| s.end_frame).max())
            .map(|end| end as f64 / sr)
    }

    /// Mix all tracks into `out` (interleaved, `channels()` wide) and advance the clock.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let frames = out.len() / self.channels;
        let sr = self.sample_rate as f64;

        for node in self.tracks.values() {
            if node.queue.is_empty() {
                continue;
            }
            for frame in 0..frames {
                let global = self.frames_rendered + frame as u64;
                let t = global as f64 / sr;
                let gain = node.crossfade.value_at(t) * node.envelope.value_at(t);
                if gain == 0.0 {
                    continue;
                }
                for scheduled in &node.queue {
                    if global < scheduled.start_frame || global >= scheduled.end_frame {
                        continue;
                    }
                    let buf = &scheduled.buffer;
                    let idx = ((global - scheduled.start_frame) as f64 * scheduled.step) as usize;
                    if idx >= buf.frames() {
                        continue;
                    }
                    let base = frame * self.channels;
                    for c in 0..self.channels {
                        out[base + c] += buf.channel(c % buf.channel_count())[idx] * gain;
                    }
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = (*sample * self.master_gain).clamp(-1.0, 1.0);
        }

        self.frames_rendered += frames as u64;
        let rendered = self.frames_rendered;
        let now = self.current_time();
        for node in self.tracks.values_mut() {
            node.queue.retain(|s| s.end_frame > rendered);
            node.crossfade.prune(now);
            node.envelope.prune(now);
        }
    }

    /// Render and discard `secs` of output, moving the clock forward.
    pub fn advance(&mut self, secs: f64) {
        let frames = (secs * self.sample_rate as f64).round() as usize;
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(frames * self.channels, 0.0);
        self.render(&mut scratch);
        self.scratch = scratch;
    }

    fn node_mut(&mut self, track: TrackId) -> Option<&mut TrackNode> {
        let node = self.tracks.get_mut(&track);
        if node.is_none() {
            debug!(target: "audio::graph", "ignoring command for disconnected {}", track);
        }
        node
    }
}

impl AudioSink for AudioGraph {
    fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    fn add_track(&mut self, track: TrackId, initial_gain: f32) {
        self.tracks.insert(
            track,
            TrackNode {
                crossfade: GainParam::new(initial_gain),
                envelope: GainParam::new(initial_gain),
                queue: Vec::new(),
            },
        );
    }

    fn remove_track(&mut self, track: TrackId) {
        self.tracks.remove(&track);
    }

    fn set_gain(&mut self, track: TrackId, stage: GainStage, value: f32, at: f64) {
        if let Some(node) = self.node_mut(track) {
            node.stage_mut(stage).set_value_at(value, at);
        }
    }

    fn hold_gain(&mut self, track: TrackId, stage: GainStage, at: f64) {
        if let Some(node) = self.node_mut(track) {
            node.stage_mut(stage).cancel_and_hold(at);
        }
    }

    fn ramp_gain(&mut self, track: TrackId, stage: GainStage, value: f32, end: f64) {
        if let Some(node) = self.node_mut(track) {
            node.stage_mut(stage).linear_ramp_to(value, end);
        }
    }

    fn schedule_buffer(&mut self, track: TrackId, buffer: PlanarBuffer, start: f64) {
        let sr = self.sample_rate as f64;
        if let Some(node) = self.node_mut(track) {
            let start_frame = (start.max(0.0) * sr).round() as u64;
            let step = buffer.sample_rate() as f64 / sr;
            let end_frame = start_frame + (buffer.frames() as f64 / step).ceil() as u64;
            let idx = node.queue.partition_point(|s| s.start_frame <= start_frame);
            node.queue.insert(
                idx,
                ScheduledBuffer {
                    start_frame,
                    end_frame,
                    step,
                    buffer,
                },
            );
        }
    }

    fn clear_track(&mut self, track: TrackId) {
        if let Some(node) = self.node_mut(track) {
            node.queue.clear();
        }
    }
}
