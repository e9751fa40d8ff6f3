//! PCM16 decoding into planar float buffers.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Scale between int16 samples and the `[-1, 1]` float range.
const PCM16_SCALE: f32 = 32768.0;

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    Base64(String),
    Empty,
    /// Byte length is not a whole number of 16-bit samples.
    OddLength(usize),
    /// Sample count is not a whole number of frames for the channel count.
    PartialFrame { samples: usize, channels: u16 },
    ZeroChannels,
    ZeroSampleRate,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64(e) => write!(f, "invalid base64 audio payload: {}", e),
            Self::Empty => write!(f, "empty audio chunk"),
            Self::OddLength(len) => write!(f, "PCM16 chunk has odd byte length {}", len),
            Self::PartialFrame { samples, channels } => write!(
                f,
                "{} samples do not divide into {}-channel frames",
                samples, channels
            ),
            Self::ZeroChannels => write!(f, "channel count must be non-zero"),
            Self::ZeroSampleRate => write!(f, "sample rate must be non-zero"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// De-interleaved audio: one `Vec<f32>` per channel, all the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PlanarBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        debug_assert!(channels.windows(2).all(|w| w[0].len() == w[1].len()));
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Apply a linear fade-in over the first `fade_secs` and a fade-out over
    /// the last `fade_secs`. Masks discontinuities where independently
    /// generated chunks are spliced together. Clamped to half the buffer.
    pub fn apply_edge_fades(&mut self, fade_secs: f64) {
        let frames = self.frames();
        let fade = ((fade_secs * self.sample_rate as f64) as usize).min(frames / 2);
        if fade == 0 {
            return;
        }
        for channel in &mut self.channels {
            for i in 0..fade {
                let g = i as f32 / fade as f32;
                channel[i] *= g;
                channel[frames - 1 - i] *= g;
            }
        }
    }
}

/// Decode interleaved little-endian PCM16 into a planar float buffer.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<PlanarBuffer, DecodeError> {
    if channels == 0 {
        return Err(DecodeError::ZeroChannels);
    }
    if sample_rate == 0 {
        return Err(DecodeError::ZeroSampleRate);
    }
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    let samples = bytes.len() / 2;
    let channel_count = channels as usize;
    if samples % channel_count != 0 {
        return Err(DecodeError::PartialFrame { samples, channels });
    }

    let frames = samples / channel_count;
    let mut planar = vec![Vec::with_capacity(frames); channel_count];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        planar[i % channel_count].push(sample as f32 / PCM16_SCALE);
    }
    Ok(PlanarBuffer::new(sample_rate, planar))
}

/// Decode a base64 payload as delivered by the service, then the PCM inside it.
pub fn decode_base64_chunk(
    data: &str,
    sample_rate: u32,
    channels: u16,
) -> Result<PlanarBuffer, DecodeError> {
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    decode_pcm16(&bytes, sample_rate, channels)
}

/// Encode interleaved int16 samples as little-endian bytes.
pub fn encode_pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_waveform_survives_roundtrip() {
        // Stereo: left ramps through the full range, right is inverted.
        let left: Vec<i16> = vec![i16::MIN, -16384, -1, 0, 1, 16384, i16::MAX];
        let mut interleaved = Vec::new();
        for &s in &left {
            interleaved.push(s);
            interleaved.push(s.saturating_neg());
        }

        let buffer = decode_pcm16(&encode_pcm16(&interleaved), 48_000, 2).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), left.len());
        for (i, &s) in left.iter().enumerate() {
            assert!((buffer.channel(0)[i] - s as f32 / 32768.0).abs() < 1e-4);
            assert!((buffer.channel(1)[i] - s.saturating_neg() as f32 / 32768.0).abs() < 1e-4);
        }
    }

    #[test]
    fn decoded_range_is_bounded() {
        let buffer = decode_pcm16(&encode_pcm16(&[i16::MIN, i16::MAX]), 8000, 1).unwrap();
        assert_eq!(buffer.channel(0)[0], -1.0);
        assert!(buffer.channel(0)[1] < 1.0);
    }

    #[test]
    fn malformed_chunks_are_rejected() {
        assert_eq!(decode_pcm16(&[], 48_000, 2), Err(DecodeError::Empty));
        assert_eq!(decode_pcm16(&[0, 0, 0], 48_000, 1), Err(DecodeError::OddLength(3)));
        assert_eq!(
            decode_pcm16(&[0, 0, 0, 0, 0, 0], 48_000, 2),
            Err(DecodeError::PartialFrame { samples: 3, channels: 2 })
        );
        assert_eq!(decode_pcm16(&[0, 0], 48_000, 0), Err(DecodeError::ZeroChannels));
        assert_eq!(decode_pcm16(&[0, 0], 0, 1), Err(DecodeError::ZeroSampleRate));
        assert!(matches!(
            decode_base64_chunk("not base64!!", 48_000, 2),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn base64_payload_decodes() {
        let bytes = encode_pcm16(&[16384, -16384]);
        let data = BASE64.encode(&bytes);
        let buffer = decode_base64_chunk(&data, 48_000, 2).unwrap();
        assert_eq!(buffer.frames(), 1);
        assert!((buffer.channel(0)[0] - 0.5).abs() < 1e-6);
        assert!((buffer.channel(1)[0] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn duration_follows_sample_rate() {
        let buffer = PlanarBuffer::new(48_000, vec![vec![0.0; 24_000]; 2]);
        assert!((buffer.duration() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn edge_fades_zero_the_boundaries() {
        let mut buffer = PlanarBuffer::new(1000, vec![vec![1.0; 100]]);
        buffer.apply_edge_fades(0.005);
        let ch = buffer.channel(0);
        assert_eq!(ch[0], 0.0);
        assert_eq!(ch[99], 0.0);
        assert!(ch[2] > ch[1]);
        assert_eq!(ch[50], 1.0);
    }

    #[test]
    fn edge_fades_clamp_to_short_buffers() {
        let mut buffer = PlanarBuffer::new(48_000, vec![vec![1.0; 4]]);
        buffer.apply_edge_fades(1.0);
        let ch = buffer.channel(0);
        assert_eq!(ch[0], 0.0);
        assert_eq!(ch[3], 0.0);
        assert!(ch.iter().all(|s| (0.0..=1.0).contains(s)));
    }
}
