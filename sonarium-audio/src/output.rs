//! Realtime device output using cpal.
//!
//! The cpal callback owns an [`AudioGraph`]. Sink calls made on the host
//! thread are turned into [`GraphCmd`]s and sent over a channel; the
//! callback drains them before rendering each block. The device clock is
//! published back through an atomic frame counter.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};

use sonarium_types::TrackId;

use crate::graph::AudioGraph;
use crate::pcm::PlanarBuffer;
use crate::sink::{AudioSink, GainStage};

#[derive(Debug)]
pub enum OutputError {
    NoDevice,
    Config(String),
    Build(String),
    Play(String),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::NoDevice => write!(f, "no audio output device available"),
            OutputError::Config(msg) => write!(f, "failed to get output config: {}", msg),
            OutputError::Build(msg) => write!(f, "failed to build output stream: {}", msg),
            OutputError::Play(msg) => write!(f, "failed to start output stream: {}", msg),
        }
    }
}

impl std::error::Error for OutputError {}

/// Commands sent from the host thread to the audio callback
#[derive(Debug)]
pub enum GraphCmd {
    AddTrack { track: TrackId, gain: f32 },
    RemoveTrack { track: TrackId },
    SetGain { track: TrackId, stage: GainStage, value: f32, at: f64 },
    HoldGain { track: TrackId, stage: GainStage, at: f64 },
    RampGain { track: TrackId, stage: GainStage, value: f32, end: f64 },
    Schedule { track: TrackId, buffer: PlanarBuffer, start: f64 },
    Clear { track: TrackId },
    MasterGain(f32),
}

/// Apply one command to the graph. Runs inside the audio callback.
pub fn apply_command(graph: &mut AudioGraph, cmd: GraphCmd) {
    match cmd {
        GraphCmd::AddTrack { track, gain } => graph.add_track(track, gain),
        GraphCmd::RemoveTrack { track } => graph.remove_track(track),
        GraphCmd::SetGain { track, stage, value, at } => graph.set_gain(track, stage, value, at),
        GraphCmd::HoldGain { track, stage, at } => graph.hold_gain(track, stage, at),
        GraphCmd::RampGain { track, stage, value, end } => graph.ramp_gain(track, stage, value, end),
        GraphCmd::Schedule { track, buffer, start } => graph.schedule_buffer(track, buffer, start),
        GraphCmd::Clear { track } => graph.clear_track(track),
        GraphCmd::MasterGain(gain) => graph.set_master_gain(gain),
    }
}

/// Drain pending commands, then render one block.
fn render_block(graph: &mut AudioGraph, rx: &Receiver<GraphCmd>, frames: &AtomicU64, out: &mut [f32]) {
    for cmd in rx.try_iter() {
        apply_command(graph, cmd);
    }
    graph.render(out);
    frames.store(graph.frames_rendered(), Ordering::Release);
}

/// [`AudioSink`] backed by the default cpal output device.
pub struct RealtimeOutput {
    stream: Option<Stream>,
    cmd_tx: Sender<GraphCmd>,
    frames: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
    device_name: String,
}

impl RealtimeOutput {
    /// Open the default output device and start streaming silence.
    pub fn open() -> Result<Self, OutputError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let config = device
            .default_output_config()
            .map_err(|e| OutputError::Config(e.to_string()))?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        let stream_config: StreamConfig = config.into();

        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<GraphCmd>();
        let frames = Arc::new(AtomicU64::new(0));
        let callback_frames = Arc::clone(&frames);
        let mut graph = AudioGraph::new(sample_rate, channels);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render_block(&mut graph, &cmd_rx, &callback_frames, data);
                },
                |err| {
                    error!(target: "audio::output", "Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| OutputError::Build(e.to_string()))?;
        stream.play().map_err(|e| OutputError::Play(e.to_string()))?;

        info!(
            target: "audio::output",
            "Output started on '{}' ({} Hz, {} ch)",
            device_name, sample_rate, channels
        );

        Ok(Self {
            stream: Some(stream),
            cmd_tx,
            frames,
            sample_rate,
            channels,
            device_name,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.send(GraphCmd::MasterGain(gain));
    }

    /// Stop the device stream. Further sink calls are dropped.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!(target: "audio::output", "Failed to pause output stream: {}", e);
            }
            info!(target: "audio::output", "Output on '{}' closed", self.device_name);
        }
    }

    fn send(&self, cmd: GraphCmd) {
        if self.stream.is_none() {
            return;
        }
        if self.cmd_tx.send(cmd).is_err() {
            warn!(target: "audio::output", "Audio callback gone; dropping command");
        }
    }
}

impl Drop for RealtimeOutput {
    fn drop(&mut self) {
        self.close();
    }
}

impl AudioSink for RealtimeOutput {
    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn add_track(&mut self, track: TrackId, initial_gain: f32) {
        self.send(GraphCmd::AddTrack { track, gain: initial_gain });
    }

    fn remove_track(&mut self, track: TrackId) {
        self.send(GraphCmd::RemoveTrack { track });
    }

    fn set_gain(&mut self, track: TrackId, stage: GainStage, value: f32, at: f64) {
        self.send(GraphCmd::SetGain { track, stage, value, at });
    }

    fn hold_gain(&mut self, track: TrackId, stage: GainStage, at: f64) {
        self.send(GraphCmd::HoldGain { track, stage, at });
    }

    fn ramp_gain(&mut self, track: TrackId, stage: GainStage, value: f32, end: f64) {
        self.send(GraphCmd::RampGain { track, stage, value, end });
    }

    fn schedule_buffer(&mut self, track: TrackId, buffer: PlanarBuffer, start: f64) {
        self.send(GraphCmd::Schedule { track, buffer, start });
    }

    fn clear_track(&mut self, track: TrackId) {
        self.send(GraphCmd::Clear { track });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_applied_before_render() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let frames = AtomicU64::new(0);
        let mut graph = AudioGraph::new(1000, 1);
        let track = TrackId::new(1);

        tx.send(GraphCmd::AddTrack { track, gain: 1.0 }).unwrap();
        tx.send(GraphCmd::Schedule {
            track,
            buffer: PlanarBuffer::new(1000, vec![vec![0.5; 8]]),
            start: 0.0,
        })
        .unwrap();

        let mut out = vec![0.0; 8];
        render_block(&mut graph, &rx, &frames, &mut out);
        assert!(out.iter().all(|&s| s == 0.5));
        assert_eq!(frames.load(Ordering::Acquire), 8);
    }

    #[test]
    fn gain_commands_reach_the_graph() {
        let mut graph = AudioGraph::new(1000, 1);
        let track = TrackId::new(3);
        apply_command(&mut graph, GraphCmd::AddTrack { track, gain: 1.0 });
        apply_command(
            &mut graph,
            GraphCmd::SetGain { track, stage: GainStage::Envelope, value: 0.0, at: 0.0 },
        );
        apply_command(
            &mut graph,
            GraphCmd::RampGain { track, stage: GainStage::Envelope, value: 1.0, end: 1.0 },
        );
        let mid = graph.gain_at(track, GainStage::Envelope, 0.5).unwrap();
        assert!((mid - 0.5).abs() < 1e-6);

        apply_command(&mut graph, GraphCmd::RemoveTrack { track });
        assert!(!graph.has_track(track));
    }
}
