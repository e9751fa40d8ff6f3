//! Network layer for Sonarium.
//!
//! Speaks to the remote generative-music service: protocol types, frame
//! encoding, the `MusicSession` seam used by the session client, and a
//! non-blocking TCP transport.

pub mod framing;
pub mod protocol;
pub mod session;
pub mod tcp;
pub mod testing;

pub use framing::{FrameDecoder, FrameError};
pub use protocol::{
    ClientMessage, MusicGenerationConfig, ServerMessage, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE,
};
pub use session::{MusicSession, SessionConnector, SessionError, SessionEvent, SessionResult};
pub use tcp::{TcpConnector, TcpSession};
pub use testing::{TestConnector, TestSessionHandle};
