//! Session seam: what the session client needs from a streaming connection.
//!
//! `MusicSession` captures what the client *means* to do (submit prompts,
//! start playback) independently of the transport. This keeps the client's
//! reconnection and queueing logic testable without a live service.

use std::fmt;
use std::io;

use sonarium_types::WeightedPrompt;

use crate::framing::FrameError;
use crate::protocol::{ClientMessage, MusicGenerationConfig, ServerMessage};

pub type SessionResult<T = ()> = Result<T, SessionError>;

#[derive(Debug)]
pub enum SessionError {
    Io(io::Error),
    Frame(FrameError),
    /// The session was closed locally or by the peer.
    Closed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "session I/O error: {}", e),
            Self::Frame(e) => write!(f, "session protocol error: {}", e),
            Self::Closed => write!(f, "session is closed"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Frame(e) => Some(e),
            Self::Closed => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Io(e)
    }
}

impl From<FrameError> for SessionError {
    fn from(e: FrameError) -> Self {
        SessionError::Frame(e)
    }
}

/// Something that happened on a session since the last poll.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Message(ServerMessage),
    Error(String),
    Closed(String),
}

/// One streaming connection to the generative-music service.
pub trait MusicSession {
    /// Send a raw protocol message.
    fn send(&mut self, msg: ClientMessage) -> SessionResult;

    /// Drain everything received since the last call. Never blocks.
    fn poll_events(&mut self) -> Vec<SessionEvent>;

    /// Tear the connection down. Idempotent.
    fn close(&mut self);

    fn set_weighted_prompts(&mut self, prompts: &[WeightedPrompt]) -> SessionResult {
        self.send(ClientMessage::SetWeightedPrompts {
            weighted_prompts: prompts.to_vec(),
        })
    }

    fn set_music_generation_config(&mut self, config: &MusicGenerationConfig) -> SessionResult {
        self.send(ClientMessage::SetMusicGenerationConfig {
            config: config.clone(),
        })
    }

    fn play(&mut self) -> SessionResult {
        self.send(ClientMessage::Play)
    }

    fn pause(&mut self) -> SessionResult {
        self.send(ClientMessage::Pause)
    }

    fn stop(&mut self) -> SessionResult {
        self.send(ClientMessage::Stop)
    }

    fn reset_context(&mut self) -> SessionResult {
        self.send(ClientMessage::ResetContext)
    }
}

/// Opens sessions. Implementations must send the `Setup` message for `model_id`.
pub trait SessionConnector {
    fn connect(&mut self, model_id: &str) -> SessionResult<Box<dyn MusicSession>>;
}
