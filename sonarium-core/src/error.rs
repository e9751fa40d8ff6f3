use std::fmt;
use std::io;
use std::path::PathBuf;

use sonarium_net::SessionError;

/// Failures surfaced by the session client.
#[derive(Debug)]
pub enum ClientError {
    /// `connect()` called while a connection attempt is in flight.
    AlreadyConnecting,
    /// Operation needs an open (or opening) session.
    NotConnected,
    /// Every prompt was filtered or had a non-positive weight.
    NoValidPrompts,
    /// The client has been disposed.
    Disposed,
    /// The initial connection could not be opened.
    Connect(SessionError),
    /// A send on the open session failed.
    Session(SessionError),
    /// Reconnection gave up after this many attempts.
    ReconnectExhausted { attempts: u32 },
    /// Underruns exceeded the tolerated count within the monitoring window.
    RepeatedUnderruns { count: u32, window_secs: f64 },
}

impl ClientError {
    /// Whether the host must intervene (the engine will not recover on its own).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ReconnectExhausted { .. } | Self::Disposed)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConnecting => write!(f, "a connection attempt is already in progress"),
            Self::NotConnected => write!(f, "not connected to the music service"),
            Self::NoValidPrompts => write!(f, "no valid prompts to send (all filtered or zero weight)"),
            Self::Disposed => write!(f, "session client has been disposed"),
            Self::Connect(e) => write!(f, "failed to connect: {}", e),
            Self::Session(e) => write!(f, "session error: {}", e),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "connection lost; gave up after {} reconnect attempts", attempts)
            }
            Self::RepeatedUnderruns { count, window_secs } => write!(
                f,
                "audio stream starved {} times in {:.0}s; the connection may be too slow",
                count, window_secs
            ),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect(e) | Self::Session(e) => Some(e),
            _ => None,
        }
    }
}

/// Failure to load an explicitly requested configuration file.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "could not read config {}: {}", path.display(), source),
            Self::Parse { path, source } => write!(f, "malformed config {}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}
