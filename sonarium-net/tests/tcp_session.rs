mod common;

use std::time::Duration;

use sonarium_net::protocol::{ClientMessage, ServerMessage};
use sonarium_net::session::{MusicSession, SessionConnector, SessionEvent};
use sonarium_net::{TcpConnector, TcpSession};
use sonarium_types::WeightedPrompt;

#[test]
fn test_connect_sends_setup_first() {
    let service = common::FakeService::bind().unwrap();
    let mut connector = TcpConnector::new(service.addr());

    let _session = connector.connect("models/lyria").unwrap();
    let mut peer = service.accept().unwrap();

    match peer.recv().unwrap() {
        ClientMessage::Setup { model } => assert_eq!(model, "models/lyria"),
        other => panic!("Expected Setup, got {:?}", other),
    }
}

#[test]
fn test_server_messages_arrive_in_order() {
    let service = common::FakeService::bind().unwrap();
    let mut connector = TcpConnector::new(service.addr());
    let mut session = connector.connect("m").unwrap();
    let mut peer = service.accept().unwrap();
    let _setup = peer.recv().unwrap();

    peer.send(&ServerMessage::SetupComplete).unwrap();
    peer.send(&ServerMessage::FilteredPrompt {
        text: "forbidden".into(),
        reason: "policy".into(),
    })
    .unwrap();
    peer.send(&ServerMessage::AudioChunk {
        data: "AAAAAA==".into(),
        sample_rate: Some(48_000),
    })
    .unwrap();

    let events = common::poll_until(session.as_mut(), Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Message(ServerMessage::AudioChunk { .. }))
    });

    let kinds: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Message(m) => Some(m.kind()),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec!["setup_complete", "filtered_prompt", "audio_chunk"]);
}

#[test]
fn test_prompts_and_transport_controls_reach_service() {
    let service = common::FakeService::bind().unwrap();
    let mut connector = TcpConnector::new(service.addr());
    let mut session = connector.connect("m").unwrap();
    let mut peer = service.accept().unwrap();
    let _setup = peer.recv().unwrap();

    let prompts = vec![
        WeightedPrompt::new("misty harbor", 0.7),
        WeightedPrompt::new("distant bells", 0.3),
    ];
    session.set_weighted_prompts(&prompts).unwrap();
    session.play().unwrap();
    common::pump(session.as_mut(), Duration::from_millis(200));

    match peer.recv().unwrap() {
        ClientMessage::SetWeightedPrompts { weighted_prompts } => {
            assert_eq!(weighted_prompts, prompts);
        }
        other => panic!("Expected SetWeightedPrompts, got {:?}", other),
    }
    assert_eq!(peer.recv().unwrap(), ClientMessage::Play);
}

#[test]
fn test_peer_close_is_reported() {
    let service = common::FakeService::bind().unwrap();
    let mut connector = TcpConnector::new(service.addr());
    let mut session = connector.connect("m").unwrap();
    let peer = service.accept().unwrap();
    drop(peer);

    let events = common::poll_until(session.as_mut(), Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Closed(_) | SessionEvent::Error(_))
    });
    assert!(!events.is_empty());

    // Once closed, the session stays quiet and rejects sends.
    assert!(session.poll_events().is_empty());
    assert!(session.play().is_err());
}

#[test]
fn test_connect_refused_is_an_error() {
    // Bind then drop to get a port with nothing listening.
    let addr = {
        let service = common::FakeService::bind().unwrap();
        service.addr()
    };
    let mut connector = TcpConnector::new(addr).with_connect_timeout(Duration::from_millis(500));
    let mut session = connector.connect("m").unwrap();

    let events = common::poll_until(session.as_mut(), Duration::from_secs(2), |e| {
        matches!(e, SessionEvent::Error(_))
    });
    assert_eq!(events.len(), 1);
    assert!(session.play().is_err());
}

#[test]
fn test_connect_returns_before_handshake() {
    let service = common::FakeService::bind().unwrap();
    let mut session = TcpSession::connect(&service.addr(), "m", Duration::from_secs(5)).unwrap();

    // Sends made before the stream is ready queue up behind Setup.
    session.play().unwrap();
    let mut peer = service.accept().unwrap();
    common::pump(&mut session, Duration::from_millis(200));
    assert!(session.is_open());

    assert!(matches!(peer.recv().unwrap(), ClientMessage::Setup { .. }));
    assert_eq!(peer.recv().unwrap(), ClientMessage::Play);
}

#[test]
fn test_failed_write_is_reported_once_by_poll() {
    let service = common::FakeService::bind().unwrap();
    let mut session = TcpSession::connect(&service.addr(), "m", Duration::from_secs(5)).unwrap();
    let mut peer = service.accept().unwrap();
    let _setup = peer.recv().unwrap();
    common::pump(&mut session, Duration::from_millis(100));
    assert!(session.is_open());
    drop(peer);

    // The first write after the peer goes away may still succeed; the reset
    // it provokes fails a later one.
    let mut failed = false;
    for _ in 0..200 {
        if session.play().is_err() {
            failed = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(failed);

    let events = session.poll_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SessionEvent::Error(_)));
    assert!(session.poll_events().is_empty());
}
