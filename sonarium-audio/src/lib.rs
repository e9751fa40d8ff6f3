//! Audio side of Sonarium: decoding streamed PCM, scheduling it on the
//! output clock, and routing successive sessions through crossfades.
//!
//! Everything here talks to the output through the [`AudioSink`] trait.
//! [`AudioGraph`] renders in-process (and is what tests drive);
//! [`RealtimeOutput`] feeds an `AudioGraph` living inside a cpal callback.

pub mod gain;
pub mod graph;
pub mod output;
pub mod pcm;
pub mod playback;
pub mod router;
pub mod scheduler;
pub mod sink;
pub mod telemetry;

pub use graph::AudioGraph;
pub use output::{OutputError, RealtimeOutput};
pub use pcm::{decode_base64_chunk, decode_pcm16, encode_pcm16, DecodeError, PlanarBuffer};
pub use playback::{transition, PlaybackEvent, PlaybackStateMachine};
pub use router::{CrossfadeRouter, Track};
pub use scheduler::{AudioDecodeScheduler, ScheduleOutcome, SchedulerConfig};
pub use sink::{AudioSink, GainStage};
pub use telemetry::UnderrunMonitor;
