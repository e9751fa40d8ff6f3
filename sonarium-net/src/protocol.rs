//! Message types exchanged with the generative-music service.

use serde::{Deserialize, Serialize};

use sonarium_types::WeightedPrompt;

/// Sample rate assumed when an audio chunk does not declare one.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Channel count of streamed audio (interleaved PCM16).
pub const DEFAULT_CHANNELS: u16 = 2;

/// Generation parameters sent once per session and on explicit updates.
///
/// Unset fields are left to the service's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MusicGenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<f32>,
}

/// Messages sent from the client to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Opens a generation context for the given model.
    Setup { model: String },
    /// Replaces the whole prompt blend.
    SetWeightedPrompts { weighted_prompts: Vec<WeightedPrompt> },
    SetMusicGenerationConfig { config: MusicGenerationConfig },
    Play,
    Pause,
    Stop,
    /// Drops accumulated musical context; generation restarts from the current prompts.
    ResetContext,
}

/// Messages sent from the service to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    SetupComplete,
    /// A prompt was rejected (e.g. content policy) and must not be sent again.
    FilteredPrompt { text: String, reason: String },
    /// Base64-encoded interleaved PCM16.
    AudioChunk {
        data: String,
        #[serde(default)]
        sample_rate: Option<u32>,
    },
    Error { message: String },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetupComplete => "setup_complete",
            Self::FilteredPrompt { .. } => "filtered_prompt",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::Error { .. } => "error",
        }
    }
}
