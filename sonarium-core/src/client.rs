//! Session client: owns the connection to the music service and the audio
//! path its output flows through.
//!
//! Everything is driven from `poll(now)` on the host's thread. Inbound
//! session events, reconnect backoff (host clock), crossfade completion
//! and cushion fill (audio clock) are all handled there; nothing fires on
//! its own. `dispose()` clears every pending task and guard flag, so a
//! disposed client never emits another event.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use log::{debug, error, info, warn};

use sonarium_audio::{
    decode_base64_chunk, AudioDecodeScheduler, AudioSink, CrossfadeRouter, GainStage,
    PlaybackEvent, PlaybackStateMachine, ScheduleOutcome, UnderrunMonitor,
};
use sonarium_net::{
    MusicGenerationConfig, MusicSession, ServerMessage, SessionConnector, SessionError, SessionEvent,
    SessionResult,
};
use sonarium_types::{PlaybackState, TaskId, Timers, TrackId, WeightedPrompt};

use crate::config::AudioConfig;
use crate::error::ClientError;
use crate::reconnect::ReconnectPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub model_id: String,
    pub reconnect: ReconnectPolicy,
    pub generation: MusicGenerationConfig,
    pub audio: AudioConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            model_id: "models/lyria-realtime-exp".to_string(),
            reconnect: ReconnectPolicy::default(),
            generation: MusicGenerationConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or the initial connection failed.
    Idle,
    /// Session opened; waiting for setup to complete.
    Connecting,
    Connected,
    /// Connection lost; a reconnect is scheduled or in its handshake.
    Reconnecting,
    /// Reconnection exhausted, or the client was disposed.
    Closed,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Things the host may want to react to, drained with `drain_events()`.
#[derive(Debug)]
pub enum ClientEvent {
    ConnectionStateChanged(ConnectionState),
    SetupComplete,
    PlaybackStateChanged(PlaybackState),
    Status(String),
    FilteredPrompt { text: String, reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    Reconnected,
    Error(ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostTask {
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioTask {
    CushionFilled(TrackId),
}

pub struct GenerativeSessionClient<S: AudioSink> {
    config: ClientConfig,
    connector: Box<dyn SessionConnector>,
    session: Option<Box<dyn MusicSession>>,
    sink: S,
    state: ConnectionState,
    /// Guards against overlapping `connect()` calls.
    connecting: bool,
    /// Set from connection loss until a reconnect completes setup or gives up.
    reconnecting: bool,
    disposed: bool,
    attempt: u32,
    reconnect_task: Option<TaskId>,
    filtered: HashSet<String>,
    /// Single-slot, last-write-wins queue for prompts arriving mid-crossfade.
    queued_prompts: Option<Vec<WeightedPrompt>>,
    /// Latest prompt set requested; resubmitted after every (re)connect.
    snapshot: Option<Vec<WeightedPrompt>>,
    /// Whether playback should run once a session is ready.
    wants_playback: bool,
    host_timers: Timers<HostTask>,
    audio_timers: Timers<AudioTask, f64>,
    scheduler: AudioDecodeScheduler,
    router: CrossfadeRouter,
    playback: PlaybackStateMachine,
    underruns: UnderrunMonitor,
    track: Option<TrackId>,
    /// Host time of the most recent `poll`; backoff for send failures starts here.
    host_now: Duration,
    events: Vec<ClientEvent>,
}

impl<S: AudioSink> GenerativeSessionClient<S> {
    pub fn new(config: ClientConfig, connector: Box<dyn SessionConnector>, sink: S) -> Self {
        let audio = config.audio;
        Self {
            connector,
            session: None,
            sink,
            state: ConnectionState::Idle,
            connecting: false,
            reconnecting: false,
            disposed: false,
            attempt: 0,
            reconnect_task: None,
            filtered: HashSet::new(),
            queued_prompts: None,
            snapshot: None,
            wants_playback: false,
            host_timers: Timers::new(),
            audio_timers: Timers::new(),
            scheduler: AudioDecodeScheduler::new(audio.scheduler),
            router: CrossfadeRouter::new(audio.crossfade_secs),
            playback: PlaybackStateMachine::new(),
            underruns: UnderrunMonitor::new(audio.underrun_tolerance, audio.underrun_window_secs),
            track: None,
            host_now: Duration::ZERO,
            events: Vec::new(),
            config,
        }
    }

    // --- accessors ---

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Reconnect attempts made since the last successful setup.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Host time at which the next reconnect attempt is due.
    pub fn next_reconnect_at(&self) -> Option<Duration> {
        self.host_timers.next_deadline()
    }

    pub fn filtered_prompts(&self) -> &HashSet<String> {
        &self.filtered
    }

    pub fn queued_prompts(&self) -> Option<&[WeightedPrompt]> {
        self.queued_prompts.as_deref()
    }

    pub fn last_prompts(&self) -> Option<&[WeightedPrompt]> {
        self.snapshot.as_deref()
    }

    /// Underruns since the client was created.
    pub fn underrun_count(&self) -> u64 {
        self.underruns.total()
    }

    pub fn current_track(&self) -> Option<TrackId> {
        self.track
    }

    pub fn router(&self) -> &CrossfadeRouter {
        &self.router
    }

    pub fn scheduler(&self) -> &AudioDecodeScheduler {
        &self.scheduler
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the output, for hosts that render it in-process.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    // --- operations ---

    /// Open a session. Completion is signalled by `ClientEvent::SetupComplete`.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        self.ensure_live()?;
        if self.connecting {
            return Err(ClientError::AlreadyConnecting);
        }
        if self.state == ConnectionState::Connected {
            debug!(target: "core::client", "connect() while connected; ignoring");
            return Ok(());
        }

        // An explicit connect supersedes any backoff in progress.
        if let Some(id) = self.reconnect_task.take() {
            self.host_timers.cancel(id);
        }
        self.reconnecting = false;
        self.attempt = 0;

        self.status("Connecting to music service");
        match self.open_session() {
            Ok(()) => {
                self.set_state(ConnectionState::Connecting);
                Ok(())
            }
            Err(e) => {
                warn!(target: "core::client", "connect to '{}' failed: {}", self.config.model_id, e);
                self.set_state(ConnectionState::Idle);
                self.status("Could not reach music service");
                Err(ClientError::Connect(e))
            }
        }
    }

    /// Submit a prompt blend. Filtered and non-positive prompts are dropped.
    pub fn set_weighted_prompts(&mut self, prompts: &[WeightedPrompt]) -> Result<(), ClientError> {
        self.ensure_live()?;
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Closed) {
            return Err(ClientError::NotConnected);
        }

        let valid: Vec<WeightedPrompt> = prompts
            .iter()
            .filter(|p| p.weight > 0.0 && !self.filtered.contains(&p.text))
            .cloned()
            .collect();
        if valid.is_empty() {
            warn!(target: "core::client", "no valid prompts among {} submitted", prompts.len());
            return Err(ClientError::NoValidPrompts);
        }

        if self.state != ConnectionState::Connected {
            debug!(target: "core::client", "{}: holding {} prompts for setup", self.state, valid.len());
            self.snapshot = Some(valid);
            return Ok(());
        }

        self.service_router();
        if self.router.is_crossfading() {
            if self.queued_prompts.replace(valid.clone()).is_some() {
                debug!(target: "core::client", "coalesced queued prompts during crossfade");
            }
            self.snapshot = Some(valid);
            return Ok(());
        }

        self.snapshot = Some(valid.clone());
        self.send_prompts(&valid)
    }

    pub fn set_generation_config(&mut self, config: MusicGenerationConfig) -> Result<(), ClientError> {
        self.ensure_live()?;
        self.config.generation = config;
        if self.state != ConnectionState::Connected {
            return Ok(());
        }
        let result = match self.session.as_mut() {
            Some(session) => session.set_music_generation_config(&self.config.generation),
            None => return Err(ClientError::NotConnected),
        };
        result.map_err(|e| self.session_failed(e))
    }

    pub fn play(&mut self) -> Result<(), ClientError> {
        self.ensure_live()?;
        match self.state {
            ConnectionState::Idle | ConnectionState::Closed => return Err(ClientError::NotConnected),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.wants_playback = true;
                return Ok(());
            }
            ConnectionState::Connected => {}
        }
        self.wants_playback = true;
        match self.playback.state() {
            PlaybackState::Stopped => self.begin_playback(),
            PlaybackState::Paused => self.resume(),
            PlaybackState::Loading | PlaybackState::Playing => Ok(()),
        }
    }

    pub fn pause(&mut self) -> Result<(), ClientError> {
        self.ensure_live()?;
        if !matches!(self.playback.state(), PlaybackState::Playing | PlaybackState::Loading) {
            return Ok(());
        }
        self.wants_playback = false;

        let now = self.sink.current_time();
        if let Some(track) = self.track {
            let fade = self.config.audio.pause_fade_secs;
            self.sink.hold_gain(track, GainStage::Envelope, now);
            self.sink.ramp_gain(track, GainStage::Envelope, 0.0, now + fade);
        }
        self.audio_timers.clear();
        self.apply_playback(PlaybackEvent::Pause);

        self.remote(|s| s.pause())
    }

    pub fn stop(&mut self) -> Result<(), ClientError> {
        self.ensure_live()?;
        self.wants_playback = false;
        self.release_audio();
        // A deliberate stop starts a fresh tolerance window.
        self.underruns.reset();
        self.apply_playback(PlaybackEvent::Stop);
        // Nothing is crossfading any more; flush a queued blend.
        self.service_router();

        self.remote(|s| s.stop())
    }

    /// Clear the service's generation context and restart playback on a fresh track.
    pub fn reset(&mut self) -> Result<(), ClientError> {
        self.ensure_live()?;
        if self.state != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        self.remote(|s| s.reset_context())?;
        info!(target: "core::client", "generation context reset");
        if self.playback.state() == PlaybackState::Stopped && !self.wants_playback {
            return Ok(());
        }
        self.wants_playback = true;
        self.begin_playback()
    }

    /// Tear everything down. Pending reconnects, crossfade completions and
    /// cushion timers are dropped and no further events are produced.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.host_timers.clear();
        self.audio_timers.clear();
        self.reconnect_task = None;
        self.connecting = false;
        self.reconnecting = false;
        self.wants_playback = false;
        self.queued_prompts = None;
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.release_audio();
        self.state = ConnectionState::Closed;
        self.events.clear();
        info!(target: "core::client", "session client disposed");
    }

    /// Pump timers, session events and the router. Call once per host frame.
    pub fn poll(&mut self, now: Duration) {
        if self.disposed {
            return;
        }
        self.host_now = now;

        for task in self.host_timers.take_due(now) {
            match task {
                HostTask::Reconnect => {
                    self.reconnect_task = None;
                    self.attempt_reconnect(now);
                }
            }
        }

        self.pump_session(now);
        self.service_router();

        let audio_now = self.sink.current_time();
        for task in self.audio_timers.take_due(audio_now) {
            match task {
                AudioTask::CushionFilled(track) if self.track == Some(track) => {
                    self.apply_playback(PlaybackEvent::CushionFilled);
                }
                AudioTask::CushionFilled(_) => {}
            }
        }
    }

    // --- internals ---

    fn ensure_live(&self) -> Result<(), ClientError> {
        if self.disposed {
            Err(ClientError::Disposed)
        } else {
            Ok(())
        }
    }

    fn open_session(&mut self) -> SessionResult {
        self.connecting = true;
        let mut session = match self.connector.connect(&self.config.model_id) {
            Ok(session) => session,
            Err(e) => {
                self.connecting = false;
                return Err(e);
            }
        };
        if let Err(e) = session.set_music_generation_config(&self.config.generation) {
            warn!(target: "core::client", "failed to send generation config: {}", e);
        }
        self.session = Some(session);
        Ok(())
    }

    /// Run a control call against the open session, if any.
    fn remote<F>(&mut self, f: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut dyn MusicSession) -> SessionResult,
    {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }
        let result = match self.session.as_mut() {
            Some(session) => f(session.as_mut()),
            None => return Ok(()),
        };
        result.map_err(|e| self.session_failed(e))
    }

    fn send_prompts(&mut self, prompts: &[WeightedPrompt]) -> Result<(), ClientError> {
        let result = match self.session.as_mut() {
            Some(session) => session.set_weighted_prompts(prompts),
            None => return Err(ClientError::NotConnected),
        };
        result.map_err(|e| self.session_failed(e))?;
        debug!(target: "core::client", "sent {} weighted prompts", prompts.len());
        Ok(())
    }

    /// A transport-level send failure means the connection is gone.
    fn session_failed(&mut self, e: SessionError) -> ClientError {
        if matches!(e, SessionError::Io(_) | SessionError::Closed) {
            let now = self.host_now;
            self.connection_lost(&e.to_string(), now);
        }
        ClientError::Session(e)
    }

    fn pump_session(&mut self, now: Duration) {
        let events = match self.session.as_mut() {
            Some(session) => session.poll_events(),
            None => return,
        };
        for event in events {
            if self.session.is_none() {
                break;
            }
            match event {
                SessionEvent::Message(msg) => self.handle_message(msg, now),
                SessionEvent::Error(reason) | SessionEvent::Closed(reason) => {
                    self.connection_lost(&reason, now)
                }
            }
        }
    }

    fn handle_message(&mut self, msg: ServerMessage, now: Duration) {
        match msg {
            ServerMessage::SetupComplete => self.on_setup_complete(),
            ServerMessage::FilteredPrompt { text, reason } => self.on_filtered_prompt(text, reason),
            ServerMessage::AudioChunk { data, sample_rate } => self.on_audio_chunk(&data, sample_rate),
            ServerMessage::Error { message } => self.connection_lost(&message, now),
        }
    }

    fn on_setup_complete(&mut self) {
        if !self.connecting {
            debug!(target: "core::client", "duplicate setup-complete ignored");
            return;
        }
        self.connecting = false;
        self.set_state(ConnectionState::Connected);

        if self.reconnecting {
            info!(target: "core::client", "reconnected after {} attempt(s)", self.attempt);
            self.reconnecting = false;
            self.attempt = 0;
            self.events.push(ClientEvent::Reconnected);
            self.status("Reconnected");
        } else {
            info!(target: "core::client", "session ready ({})", self.config.model_id);
            self.events.push(ClientEvent::SetupComplete);
            self.status("Connected");
        }

        // The snapshot already holds any queued blend.
        self.queued_prompts = None;
        if let Some(prompts) = self.snapshot.clone() {
            if let Err(e) = self.send_prompts(&prompts) {
                warn!(target: "core::client", "failed to restore prompts: {}", e);
            }
        }

        if self.wants_playback {
            if let Err(e) = self.begin_playback() {
                warn!(target: "core::client", "failed to resume playback: {}", e);
            }
        }
    }

    fn on_filtered_prompt(&mut self, text: String, reason: String) {
        info!(target: "core::client", "prompt filtered ({}): {}", reason, text);
        for set in [&mut self.snapshot, &mut self.queued_prompts] {
            if let Some(prompts) = set.as_mut() {
                prompts.retain(|p| p.text != text);
            }
        }
        self.filtered.insert(text.clone());
        self.events.push(ClientEvent::FilteredPrompt { text, reason });
    }

    fn on_audio_chunk(&mut self, data: &str, sample_rate: Option<u32>) {
        if !self.playback.state().accepts_audio() {
            return;
        }
        let track = match self.track {
            Some(track) => track,
            None => return,
        };

        let rate = sample_rate.unwrap_or(self.config.audio.sample_rate);
        let buffer = match decode_base64_chunk(data, rate, self.config.audio.channels) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(target: "core::client", "dropping undecodable audio chunk: {}", e);
                return;
            }
        };

        match self.scheduler.schedule(&mut self.sink, track, buffer) {
            ScheduleOutcome::Cushioned { start } => {
                self.audio_timers.clear();
                self.audio_timers.schedule(start, AudioTask::CushionFilled(track));
            }
            ScheduleOutcome::Scheduled { .. } => {}
            ScheduleOutcome::Underrun { .. } => {
                self.audio_timers.clear();
                self.apply_playback(PlaybackEvent::Underrun);
                self.status("Buffering");
                let at = self.sink.current_time();
                if let Some(count) = self.underruns.record(at) {
                    self.events.push(ClientEvent::Error(ClientError::RepeatedUnderruns {
                        count,
                        window_secs: self.config.audio.underrun_window_secs,
                    }));
                }
            }
        }
    }

    fn connection_lost(&mut self, reason: &str, now: Duration) {
        if self.disposed {
            return;
        }
        warn!(target: "core::client", "connection lost: {}", reason);
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.connecting = false;
        if let Some(queued) = self.queued_prompts.take() {
            self.snapshot = Some(queued);
        }
        if self.reconnect_task.is_some() {
            return;
        }
        self.reconnecting = true;
        self.set_state(ConnectionState::Reconnecting);
        self.schedule_reconnect(now);
    }

    fn schedule_reconnect(&mut self, now: Duration) {
        let policy = self.config.reconnect;
        if !policy.allows(self.attempt) {
            let attempts = self.attempt;
            error!(target: "core::client", "giving up after {} reconnect attempts", attempts);
            self.reconnecting = false;
            self.wants_playback = false;
            self.set_state(ConnectionState::Closed);
            self.release_audio();
            self.apply_playback(PlaybackEvent::Fatal);
            self.status("Disconnected from music service");
            self.events
                .push(ClientEvent::Error(ClientError::ReconnectExhausted { attempts }));
            return;
        }

        let delay = policy.delay_for(self.attempt);
        self.attempt += 1;
        self.reconnect_task = Some(self.host_timers.schedule(now + delay, HostTask::Reconnect));
        info!(
            target: "core::client",
            "reconnect attempt {}/{} in {:?}",
            self.attempt, policy.max_attempts, delay
        );
        self.status(format!(
            "Connection lost; reconnecting in {:.0}s (attempt {}/{})",
            delay.as_secs_f64(),
            self.attempt,
            policy.max_attempts
        ));
        self.events.push(ClientEvent::Reconnecting {
            attempt: self.attempt,
            delay,
        });
    }

    fn attempt_reconnect(&mut self, now: Duration) {
        if self.disposed || !self.reconnecting {
            return;
        }
        match self.open_session() {
            Ok(()) => debug!(target: "core::client", "reconnect attempt {} opened; awaiting setup", self.attempt),
            Err(e) => {
                warn!(target: "core::client", "reconnect attempt {} failed: {}", self.attempt, e);
                self.schedule_reconnect(now);
            }
        }
    }

    /// Retire finished crossfades and flush a blend that waited for one.
    fn service_router(&mut self) {
        self.router.update(&mut self.sink);
        if self.router.is_crossfading() || self.state != ConnectionState::Connected {
            return;
        }
        if let Some(prompts) = self.queued_prompts.take() {
            info!(target: "core::client", "submitting {} prompts queued during crossfade", prompts.len());
            if let Err(e) = self.send_prompts(&prompts) {
                warn!(target: "core::client", "failed to submit queued prompts: {}", e);
            }
        }
    }

    /// Ask the service to play and bring in a fresh track.
    fn begin_playback(&mut self) -> Result<(), ClientError> {
        self.remote(|s| s.play())?;
        self.track = Some(self.router.start_track(&mut self.sink));
        self.scheduler.restart();
        self.audio_timers.clear();
        let event = if self.playback.state() == PlaybackState::Stopped {
            PlaybackEvent::Play
        } else {
            PlaybackEvent::Restart
        };
        self.apply_playback(event);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), ClientError> {
        self.remote(|s| s.play())?;
        // Whatever was queued played out silently during the pause.
        if let Some(track) = self.track {
            self.sink.clear_track(track);
        }
        self.scheduler.restart();
        self.apply_playback(PlaybackEvent::Play);
        Ok(())
    }

    fn release_audio(&mut self) {
        self.router.dispose(&mut self.sink);
        self.track = None;
        self.scheduler.restart();
        self.audio_timers.clear();
    }

    fn apply_playback(&mut self, event: PlaybackEvent) {
        if let Some(state) = self.playback.apply(event) {
            info!(target: "core::client", "playback -> {}", state);
            self.events.push(ClientEvent::PlaybackStateChanged(state));
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(target: "core::client", "connection {} -> {}", self.state, state);
            self.state = state;
            self.events.push(ClientEvent::ConnectionStateChanged(state));
        }
    }

    fn status(&mut self, message: impl Into<String>) {
        self.events.push(ClientEvent::Status(message.into()));
    }
}

impl<S: AudioSink> Drop for GenerativeSessionClient<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
