#![allow(dead_code)]
//! Test harness utilities for sonarium-core integration tests.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use sonarium_audio::{encode_pcm16, AudioGraph};
use sonarium_core::client::{ClientConfig, ClientEvent, GenerativeSessionClient};
use sonarium_net::{ServerMessage, TestConnector, TestSessionHandle};
use sonarium_types::WeightedPrompt;

/// Output rate for in-process rendering; low to keep tests fast.
pub const SR: u32 = 1000;

pub type Client = GenerativeSessionClient<AudioGraph>;

pub fn client_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.audio.sample_rate = SR;
    config
}

pub fn new_client(config: ClientConfig) -> (Client, TestConnector) {
    let connector = TestConnector::new();
    let client = GenerativeSessionClient::new(config, Box::new(connector.clone()), AudioGraph::new(SR, 2));
    (client, connector)
}

/// Connect and complete setup on the first session.
pub fn connected_client(config: ClientConfig) -> (Client, TestConnector, TestSessionHandle) {
    let (mut client, connector) = new_client(config);
    client.connect().unwrap();
    let session = connector.latest().unwrap();
    session.push_message(ServerMessage::SetupComplete);
    client.poll(Duration::ZERO);
    client.drain_events();
    (client, connector, session)
}

/// A constant stereo PCM16 chunk of `secs` at `SR`.
pub fn chunk(secs: f64) -> ServerMessage {
    let frames = (secs * SR as f64) as usize;
    let samples = vec![4_000i16; frames * 2];
    ServerMessage::AudioChunk {
        data: BASE64.encode(encode_pcm16(&samples)),
        sample_rate: Some(SR),
    }
}

pub fn prompts(entries: &[(&str, f32)]) -> Vec<WeightedPrompt> {
    entries.iter().map(|(t, w)| WeightedPrompt::new(*t, *w)).collect()
}

/// Render `secs` of audio and poll the client at the matching host time.
pub fn advance(client: &mut Client, host: &mut Duration, secs: f64) {
    client.sink_mut().advance(secs);
    *host += Duration::from_secs_f64(secs);
    client.poll(*host);
}

pub fn count_events<F: Fn(&ClientEvent) -> bool>(events: &[ClientEvent], pred: F) -> usize {
    events.iter().filter(|e| pred(e)).count()
}
