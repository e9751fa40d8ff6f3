//! Composition root: listener position in, generative soundscape out.
//!
//! The host owns a `SoundscapeEngine` and calls `tick` once per rendered
//! frame with the listener's world position and a monotonic host time.
//! The sampler gates which positions count as movement, the proximity
//! engine smooths toward the blend for the last accepted position on every
//! tick, and the blend is pushed to the session only when it has drifted
//! past the change threshold.

use std::time::Duration;

use log::{debug, info, warn};

use sonarium_audio::AudioSink;
use sonarium_net::{MusicGenerationConfig, SessionConnector};
use sonarium_types::{Anchor, AnchorId, PlaybackState, Vec3};

use crate::client::{ClientConfig, ClientEvent, ConnectionState, GenerativeSessionClient};
use crate::error::ClientError;
use crate::proximity::{DebugEntry, ProximityConfig, ProximityResult, ProximityWeightEngine};
use crate::sampler::{PositionSampler, SamplerConfig};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub sampler: SamplerConfig,
    pub proximity: ProximityConfig,
    pub client: ClientConfig,
}

/// Callbacks for the UI layer. Every method defaults to a no-op.
pub trait SoundscapeObserver {
    fn on_playback_state_change(&mut self, _state: PlaybackState) {}
    fn on_status_update(&mut self, _status: &str) {}
    fn on_error(&mut self, _error: &ClientError) {}
    fn on_filtered_prompt(&mut self, _text: &str, _reason: &str) {}
    fn on_position_changed(&mut self, _new: Vec3, _old: Vec3) {}
    /// Only called when `wants_debug` returns true.
    fn on_debug_update(&mut self, _entries: &[DebugEntry]) {}
    fn wants_debug(&self) -> bool {
        false
    }
}

/// Observer that ignores everything.
pub struct NullObserver;

impl SoundscapeObserver for NullObserver {}

pub struct SoundscapeEngine<S: AudioSink> {
    sampler: PositionSampler,
    proximity: ProximityWeightEngine,
    client: GenerativeSessionClient<S>,
    anchors: Vec<Anchor>,
    observer: Box<dyn SoundscapeObserver>,
    last_result: ProximityResult,
}

impl<S: AudioSink> SoundscapeEngine<S> {
    pub fn new(
        config: EngineConfig,
        anchors: Vec<Anchor>,
        connector: Box<dyn SessionConnector>,
        sink: S,
        observer: Box<dyn SoundscapeObserver>,
        start: Vec3,
        now: Duration,
    ) -> Self {
        info!(
            target: "core::engine",
            "soundscape with {} anchors, {} falloff",
            anchors.len(),
            config.proximity.falloff.name()
        );
        Self {
            sampler: PositionSampler::new(config.sampler, start, now),
            proximity: ProximityWeightEngine::new(config.proximity),
            client: GenerativeSessionClient::new(config.client, connector, sink),
            anchors,
            observer,
            last_result: ProximityResult::default(),
        }
    }

    pub fn client(&self) -> &GenerativeSessionClient<S> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut GenerativeSessionClient<S> {
        &mut self.client
    }

    pub fn sampler(&self) -> &PositionSampler {
        &self.sampler
    }

    pub fn proximity(&self) -> &ProximityWeightEngine {
        &self.proximity
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Result of the most recent tick.
    pub fn last_result(&self) -> &ProximityResult {
        &self.last_result
    }

    pub fn connect(&mut self) -> Result<(), ClientError> {
        let result = self.client.connect();
        self.dispatch_events();
        result
    }

    pub fn play(&mut self) -> Result<(), ClientError> {
        let result = self.client.play();
        self.dispatch_events();
        result
    }

    pub fn pause(&mut self) -> Result<(), ClientError> {
        let result = self.client.pause();
        self.dispatch_events();
        result
    }

    pub fn stop(&mut self) -> Result<(), ClientError> {
        let result = self.client.stop();
        self.dispatch_events();
        result
    }

    pub fn reset(&mut self) -> Result<(), ClientError> {
        let result = self.client.reset();
        self.dispatch_events();
        result
    }

    pub fn set_generation_config(&mut self, config: MusicGenerationConfig) -> Result<(), ClientError> {
        let result = self.client.set_generation_config(config);
        self.dispatch_events();
        result
    }

    pub fn dispose(&mut self) {
        self.client.dispose();
    }

    /// Advance one host frame.
    pub fn tick(&mut self, position: Vec3, now: Duration) {
        if self.client.is_disposed() {
            return;
        }
        self.client.poll(now);
        self.dispatch_events();

        let old = self.sampler.last_accepted();
        if self.sampler.check_position(position, now) {
            debug!(target: "core::engine", "listener moved to ({:.1}, {:.1}, {:.1})", position.x, position.y, position.z);
            self.observer.on_position_changed(position, old);
        }
        self.evaluate();
    }

    /// Accept `position` immediately and push the resulting blend on this tick.
    pub fn force_update(&mut self, position: Vec3, now: Duration) {
        let old = self.sampler.last_accepted();
        self.sampler.force_update(position, now);
        self.observer.on_position_changed(position, old);
        self.proximity.mark_unsent();
        self.evaluate();
    }

    /// Refresh one anchor's position (for anchors attached to moving objects).
    pub fn update_anchor_position(&mut self, id: &AnchorId, position: Vec3) -> bool {
        match self.anchors.iter_mut().find(|a| &a.id == id) {
            Some(anchor) if position.is_finite() => {
                anchor.position = position;
                true
            }
            _ => false,
        }
    }

    pub fn replace_anchors(&mut self, anchors: Vec<Anchor>) {
        info!(target: "core::engine", "anchor set replaced ({} anchors)", anchors.len());
        self.proximity.retain_anchors(&anchors);
        self.anchors = anchors;
        self.proximity.mark_unsent();
    }

    fn evaluate(&mut self) {
        let result = self
            .proximity
            .update(self.sampler.last_accepted(), &self.anchors);
        if self.observer.wants_debug() {
            self.observer.on_debug_update(&result.debug);
        }
        self.push_if_needed(&result);
        self.last_result = result;
        self.dispatch_events();
    }

    fn push_if_needed(&mut self, result: &ProximityResult) {
        let accepting = matches!(
            self.client.state(),
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        );
        if !accepting || result.weighted_prompts.is_empty() || !self.proximity.should_push() {
            return;
        }

        match self.client.set_weighted_prompts(&result.weighted_prompts) {
            Ok(()) => self.proximity.mark_sent(),
            // Everything in range is filtered; retrying each frame would not help.
            Err(ClientError::NoValidPrompts) => self.proximity.mark_sent(),
            Err(e) => warn!(target: "core::engine", "prompt push failed: {}", e),
        }
    }

    fn dispatch_events(&mut self) {
        for event in self.client.drain_events() {
            match event {
                ClientEvent::PlaybackStateChanged(state) => self.observer.on_playback_state_change(state),
                ClientEvent::Status(status) => self.observer.on_status_update(&status),
                ClientEvent::FilteredPrompt { text, reason } => {
                    self.observer.on_filtered_prompt(&text, &reason);
                    // Re-evaluate without the filtered prompt on the next tick.
                    self.proximity.mark_unsent();
                }
                ClientEvent::Error(error) => self.observer.on_error(&error),
                ClientEvent::ConnectionStateChanged(state) => {
                    debug!(target: "core::engine", "connection is {}", state)
                }
                ClientEvent::SetupComplete | ClientEvent::Reconnected => {}
                ClientEvent::Reconnecting { attempt, delay } => {
                    debug!(target: "core::engine", "reconnect {} scheduled in {:?}", attempt, delay)
                }
            }
        }
    }
}
