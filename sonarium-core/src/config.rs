use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use sonarium_audio::SchedulerConfig;
use sonarium_net::{MusicGenerationConfig, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};
use sonarium_types::{Anchor, Vec3};

use crate::client::ClientConfig;
use crate::engine::EngineConfig;
use crate::error::ConfigError;
use crate::proximity::{Falloff, ProximityConfig};
use crate::reconnect::ReconnectPolicy;
use crate::sampler::SamplerConfig;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    sampler: SamplerSection,
    #[serde(default)]
    proximity: ProximitySection,
    #[serde(default)]
    session: SessionSection,
    #[serde(default)]
    generation: GenerationSection,
    #[serde(default)]
    audio: AudioSection,
    #[serde(default)]
    anchors: Option<Vec<AnchorEntry>>,
}

#[derive(Deserialize, Default)]
struct SamplerSection {
    update_interval_ms: Option<u64>,
    min_distance: Option<f32>,
}

#[derive(Deserialize, Default)]
struct ProximitySection {
    falloff: Option<String>,
    radius: Option<f32>,
    min_weight: Option<f32>,
    max_prompts: Option<usize>,
    smoothing_factor: Option<f32>,
    change_threshold: Option<f32>,
    fallback_weight: Option<f32>,
    fallback_count: Option<usize>,
}

#[derive(Deserialize, Default)]
struct SessionSection {
    model_id: Option<String>,
    endpoint: Option<String>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
}

#[derive(Deserialize, Default)]
struct GenerationSection {
    bpm: Option<u16>,
    density: Option<f32>,
    brightness: Option<f32>,
    temperature: Option<f32>,
    guidance: Option<f32>,
}

#[derive(Deserialize, Default)]
struct AudioSection {
    sample_rate: Option<u32>,
    channels: Option<u16>,
    buffer_time_secs: Option<f64>,
    fade_in_secs: Option<f64>,
    edge_fade_ms: Option<f64>,
    crossfade_secs: Option<f64>,
    pause_fade_secs: Option<f64>,
    underrun_tolerance: Option<u32>,
    underrun_window_secs: Option<f64>,
}

#[derive(Deserialize, Clone)]
struct AnchorEntry {
    id: String,
    name: Option<String>,
    position: [f32; 3],
    prompt: String,
    radius: Option<f32>,
}

/// Audio pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioConfig {
    /// Sample rate assumed for chunks that do not declare one.
    pub sample_rate: u32,
    pub channels: u16,
    pub scheduler: SchedulerConfig,
    pub crossfade_secs: f64,
    pub pause_fade_secs: f64,
    pub underrun_tolerance: u32,
    pub underrun_window_secs: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            scheduler: SchedulerConfig::default(),
            crossfade_secs: 2.5,
            pause_fade_secs: 0.3,
            underrun_tolerance: 3,
            underrun_window_secs: 30.0,
        }
    }
}

pub struct Config {
    file: ConfigFile,
}

impl Config {
    /// Embedded defaults, overridden by `~/.config/sonarium/config.toml` when present.
    pub fn load() -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config { file: base }
    }

    /// Embedded defaults overridden by an explicit file. Unlike `load`,
    /// a missing or malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_over_defaults(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_toml_over_defaults(contents: &str) -> Result<Self, toml::de::Error> {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");
        let user: ConfigFile = toml::from_str(contents)?;
        merge(&mut base, user);
        log::info!(target: "config", "loaded {} anchors", base.anchors.as_ref().map_or(0, Vec::len));
        Ok(Config { file: base })
    }

    pub fn sampler(&self) -> SamplerConfig {
        let fallback = SamplerConfig::default();
        let s = &self.file.sampler;
        SamplerConfig {
            update_interval: s
                .update_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(fallback.update_interval),
            min_distance: s.min_distance.unwrap_or(fallback.min_distance).max(0.0),
        }
    }

    pub fn proximity(&self) -> ProximityConfig {
        let fallback = ProximityConfig::default();
        let p = &self.file.proximity;
        ProximityConfig {
            falloff: p
                .falloff
                .as_deref()
                .and_then(|name| {
                    let parsed = Falloff::parse(name);
                    if parsed.is_none() {
                        log::warn!(target: "config", "unknown falloff '{}', using {}", name, fallback.falloff.name());
                    }
                    parsed
                })
                .unwrap_or(fallback.falloff),
            radius: p.radius.filter(|r| *r > 0.0).unwrap_or(fallback.radius),
            min_weight: p.min_weight.unwrap_or(fallback.min_weight).clamp(0.0, 1.0),
            max_prompts: p.max_prompts.unwrap_or(fallback.max_prompts).max(1),
            smoothing_factor: p
                .smoothing_factor
                .unwrap_or(fallback.smoothing_factor)
                .clamp(0.0, 1.0),
            change_threshold: p.change_threshold.unwrap_or(fallback.change_threshold).max(0.0),
            fallback_weight: p
                .fallback_weight
                .unwrap_or(fallback.fallback_weight)
                .clamp(0.0, 1.0),
            fallback_count: p.fallback_count.unwrap_or(fallback.fallback_count),
        }
    }

    pub fn reconnect(&self) -> ReconnectPolicy {
        let fallback = ReconnectPolicy::default();
        let s = &self.file.session;
        let base_delay = s
            .base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(fallback.base_delay);
        ReconnectPolicy {
            base_delay,
            max_delay: s
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(fallback.max_delay)
                .max(base_delay),
            max_attempts: s.max_attempts.unwrap_or(fallback.max_attempts),
        }
    }

    pub fn generation(&self) -> MusicGenerationConfig {
        let g = &self.file.generation;
        MusicGenerationConfig {
            bpm: g.bpm.map(|b| b.clamp(60, 200)),
            density: g.density.map(|v| v.clamp(0.0, 1.0)),
            brightness: g.brightness.map(|v| v.clamp(0.0, 1.0)),
            temperature: g.temperature.map(|v| v.clamp(0.0, 3.0)),
            guidance: g.guidance.map(|v| v.clamp(0.0, 6.0)),
        }
    }

    pub fn audio(&self) -> AudioConfig {
        let fallback = AudioConfig::default();
        let a = &self.file.audio;
        AudioConfig {
            sample_rate: a.sample_rate.filter(|r| *r > 0).unwrap_or(fallback.sample_rate),
            channels: a.channels.filter(|c| *c > 0).unwrap_or(fallback.channels),
            scheduler: SchedulerConfig {
                buffer_time: a
                    .buffer_time_secs
                    .unwrap_or(fallback.scheduler.buffer_time)
                    .clamp(0.1, 30.0),
                fade_in: a.fade_in_secs.unwrap_or(fallback.scheduler.fade_in).max(0.0),
                edge_fade: a
                    .edge_fade_ms
                    .map(|ms| ms / 1000.0)
                    .unwrap_or(fallback.scheduler.edge_fade)
                    .max(0.0),
            },
            crossfade_secs: a.crossfade_secs.unwrap_or(fallback.crossfade_secs).max(0.0),
            pause_fade_secs: a.pause_fade_secs.unwrap_or(fallback.pause_fade_secs).max(0.0),
            underrun_tolerance: a.underrun_tolerance.unwrap_or(fallback.underrun_tolerance),
            underrun_window_secs: a
                .underrun_window_secs
                .unwrap_or(fallback.underrun_window_secs)
                .max(0.0),
        }
    }

    pub fn model_id(&self) -> String {
        self.file
            .session
            .model_id
            .clone()
            .unwrap_or_else(|| "models/lyria-realtime-exp".to_string())
    }

    /// Address of the music service, `host:port`.
    pub fn endpoint(&self) -> String {
        self.file
            .session
            .endpoint
            .clone()
            .unwrap_or_else(|| "127.0.0.1:7878".to_string())
    }

    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            model_id: self.model_id(),
            reconnect: self.reconnect(),
            generation: self.generation(),
            audio: self.audio(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sampler: self.sampler(),
            proximity: self.proximity(),
            client: self.client(),
        }
    }

    /// Configured anchors. Entries with non-finite positions are skipped.
    pub fn anchors(&self) -> Vec<Anchor> {
        let entries = self.file.anchors.as_deref().unwrap_or(&[]);
        entries
            .iter()
            .filter_map(|e| {
                let position = Vec3::from(e.position);
                if !position.is_finite() {
                    log::warn!(target: "config", "skipping anchor '{}': position is not finite", e.id);
                    return None;
                }
                let mut anchor = Anchor::new(
                    e.id.clone(),
                    e.name.clone().unwrap_or_else(|| e.id.clone()),
                    position,
                    e.prompt.clone(),
                );
                anchor.radius = e.radius.filter(|r| *r > 0.0);
                Some(anchor)
            })
            .collect()
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sonarium").join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    merge_sampler(&mut base.sampler, user.sampler);
    merge_proximity(&mut base.proximity, user.proximity);
    merge_session(&mut base.session, user.session);
    merge_generation(&mut base.generation, user.generation);
    merge_audio(&mut base.audio, user.audio);
    // A user anchor list replaces the defaults wholesale.
    if user.anchors.is_some() {
        base.anchors = user.anchors;
    }
}

fn merge_sampler(base: &mut SamplerSection, user: SamplerSection) {
    if user.update_interval_ms.is_some() {
        base.update_interval_ms = user.update_interval_ms;
    }
    if user.min_distance.is_some() {
        base.min_distance = user.min_distance;
    }
}

fn merge_proximity(base: &mut ProximitySection, user: ProximitySection) {
    if user.falloff.is_some() {
        base.falloff = user.falloff;
    }
    if user.radius.is_some() {
        base.radius = user.radius;
    }
    if user.min_weight.is_some() {
        base.min_weight = user.min_weight;
    }
    if user.max_prompts.is_some() {
        base.max_prompts = user.max_prompts;
    }
    if user.smoothing_factor.is_some() {
        base.smoothing_factor = user.smoothing_factor;
    }
    if user.change_threshold.is_some() {
        base.change_threshold = user.change_threshold;
    }
    if user.fallback_weight.is_some() {
        base.fallback_weight = user.fallback_weight;
    }
    if user.fallback_count.is_some() {
        base.fallback_count = user.fallback_count;
    }
}

fn merge_session(base: &mut SessionSection, user: SessionSection) {
    if user.model_id.is_some() {
        base.model_id = user.model_id;
    }
    if user.endpoint.is_some() {
        base.endpoint = user.endpoint;
    }
    if user.base_delay_ms.is_some() {
        base.base_delay_ms = user.base_delay_ms;
    }
    if user.max_delay_ms.is_some() {
        base.max_delay_ms = user.max_delay_ms;
    }
    if user.max_attempts.is_some() {
        base.max_attempts = user.max_attempts;
    }
}

fn merge_generation(base: &mut GenerationSection, user: GenerationSection) {
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.density.is_some() {
        base.density = user.density;
    }
    if user.brightness.is_some() {
        base.brightness = user.brightness;
    }
    if user.temperature.is_some() {
        base.temperature = user.temperature;
    }
    if user.guidance.is_some() {
        base.guidance = user.guidance;
    }
}

fn merge_audio(base: &mut AudioSection, user: AudioSection) {
    if user.sample_rate.is_some() {
        base.sample_rate = user.sample_rate;
    }
    if user.channels.is_some() {
        base.channels = user.channels;
    }
    if user.buffer_time_secs.is_some() {
        base.buffer_time_secs = user.buffer_time_secs;
    }
    if user.fade_in_secs.is_some() {
        base.fade_in_secs = user.fade_in_secs;
    }
    if user.edge_fade_ms.is_some() {
        base.edge_fade_ms = user.edge_fade_ms;
    }
    if user.crossfade_secs.is_some() {
        base.crossfade_secs = user.crossfade_secs;
    }
    if user.pause_fade_secs.is_some() {
        base.pause_fade_secs = user.pause_fade_secs;
    }
    if user.underrun_tolerance.is_some() {
        base.underrun_tolerance = user.underrun_tolerance;
    }
    if user.underrun_window_secs.is_some() {
        base.underrun_window_secs = user.underrun_window_secs;
    }
}
