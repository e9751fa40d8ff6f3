//! Length-prefixed framing for session messages.
//!
//! Wire format: `[u32 length (big-endian)][JSON payload]`
//!
//! `write_message`/`read_message` work on blocking streams. `FrameDecoder`
//! accumulates bytes from a non-blocking socket and yields whole messages.

use std::fmt;
use std::io::{self, Read, Write};

use serde::{de::DeserializeOwned, Serialize};

/// Frames larger than this are rejected as corrupt.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;

#[derive(Debug)]
pub enum FrameError {
    TooLarge(usize),
    Json(serde_json::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge(len) => write!(f, "frame too large: {} bytes", len),
            Self::Json(e) => write!(f, "malformed frame payload: {}", e),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::TooLarge(_) => None,
        }
    }
}

impl From<FrameError> for io::Error {
    fn from(e: FrameError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

/// Serialize `msg` into a complete frame (header + payload).
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, FrameError> {
    let payload = serde_json::to_vec(msg).map_err(FrameError::Json)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Write one framed message to a blocking stream.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> io::Result<()> {
    let frame = encode_frame(msg)?;
    writer.write_all(&frame)?;
    writer.flush()
}

/// Read one framed message from a blocking stream.
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let mut len_buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len).into());
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    serde_json::from_slice(&payload).map_err(|e| FrameError::Json(e).into())
}

/// Incremental decoder for frames arriving in arbitrary fragments.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed as a whole frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete message, or `Ok(None)` if more bytes are needed.
    ///
    /// A malformed payload is consumed before the error is returned, so the
    /// stream stays aligned on frame boundaries. An oversize header leaves the
    /// buffer untouched; the connection should be dropped.
    pub fn next_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut len_buf = [0u8; HEADER_LEN];
        len_buf.copy_from_slice(&self.buf[..HEADER_LEN]);
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(len));
        }
        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buf.drain(..HEADER_LEN + len).collect();
        serde_json::from_slice(&frame[HEADER_LEN..])
            .map(Some)
            .map_err(FrameError::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;
    use std::io::Cursor;

    #[test]
    fn blocking_roundtrip() {
        let mut buf = Vec::new();
        write_message(&mut buf, &ServerMessage::SetupComplete).unwrap();

        let mut cursor = Cursor::new(buf);
        let msg: ServerMessage = read_message(&mut cursor).unwrap();
        assert_eq!(msg, ServerMessage::SetupComplete);
    }

    #[test]
    fn decoder_waits_for_complete_frame() {
        let frame = encode_frame(&ServerMessage::Error {
            message: "quota".into(),
        })
        .unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.push(&frame[..3]);
        assert!(decoder.next_message::<ServerMessage>().unwrap().is_none());
        decoder.push(&frame[3..frame.len() - 1]);
        assert!(decoder.next_message::<ServerMessage>().unwrap().is_none());
        decoder.push(&frame[frame.len() - 1..]);

        let msg: ServerMessage = decoder.next_message().unwrap().unwrap();
        assert_eq!(msg, ServerMessage::Error { message: "quota".into() });
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn decoder_yields_back_to_back_frames() {
        let mut bytes = encode_frame(&ServerMessage::SetupComplete).unwrap();
        bytes.extend(
            encode_frame(&ServerMessage::FilteredPrompt {
                text: "x".into(),
                reason: "policy".into(),
            })
            .unwrap(),
        );

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        let first: ServerMessage = decoder.next_message().unwrap().unwrap();
        let second: ServerMessage = decoder.next_message().unwrap().unwrap();
        assert_eq!(first.kind(), "setup_complete");
        assert_eq!(second.kind(), "filtered_prompt");
        assert!(decoder.next_message::<ServerMessage>().unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_consumed() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(b"{{{");
        bytes.extend(encode_frame(&ServerMessage::SetupComplete).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        assert!(matches!(
            decoder.next_message::<ServerMessage>(),
            Err(FrameError::Json(_))
        ));
        let next: ServerMessage = decoder.next_message().unwrap().unwrap();
        assert_eq!(next, ServerMessage::SetupComplete);
    }

    #[test]
    fn oversize_header_is_rejected() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
        assert!(matches!(
            decoder.next_message::<ServerMessage>(),
            Err(FrameError::TooLarge(_))
        ));
    }
}
