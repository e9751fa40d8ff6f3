mod common;

use std::time::Duration;

use sonarium_core::client::{ClientEvent, ConnectionState};
use sonarium_core::error::ClientError;
use sonarium_core::reconnect::ReconnectPolicy;
use sonarium_net::{ClientMessage, ServerMessage, SessionEvent};
use sonarium_types::PlaybackState;

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[test]
fn test_attempt_counter_resets_only_after_setup_complete() {
    let (mut client, connector, first) = common::connected_client(common::client_config());
    client.play().unwrap();

    first.push_event(SessionEvent::Closed("socket reset".into()));
    client.poll(secs(1.0));
    assert_eq!(client.state(), ConnectionState::Reconnecting);
    assert_eq!(client.attempt(), 1);
    assert_eq!(client.next_reconnect_at(), Some(secs(3.0)));
    assert!(first.is_closed());

    client.poll(secs(2.9));
    assert_eq!(connector.session_count(), 1);

    client.poll(secs(3.0));
    assert_eq!(connector.session_count(), 2);
    // Transport is up but setup has not completed yet.
    assert_eq!(client.attempt(), 1);
    assert_eq!(client.state(), ConnectionState::Reconnecting);

    let second = connector.latest().unwrap();
    second.push_message(ServerMessage::SetupComplete);
    client.poll(secs(3.1));
    assert_eq!(client.attempt(), 0);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(!client.is_reconnecting());

    let events = client.drain_events();
    assert_eq!(common::count_events(&events, |e| matches!(e, ClientEvent::Reconnected)), 1);
    // Playback resumes on a fresh track.
    assert_eq!(second.count(|m| *m == ClientMessage::Play), 1);
    assert_eq!(client.playback_state(), PlaybackState::Loading);
}

#[test]
fn test_backoff_delays_double_between_failed_attempts() {
    let (mut client, connector, first) = common::connected_client(common::client_config());
    connector.fail_next_connects(3);

    first.push_event(SessionEvent::Error("timeout".into()));
    client.poll(secs(0.0));

    let mut deadlines = Vec::new();
    while let Some(at) = client.next_reconnect_at() {
        deadlines.push(at);
        client.poll(at);
    }
    assert_eq!(deadlines, vec![secs(2.0), secs(6.0), secs(14.0), secs(30.0)]);
    assert_eq!(connector.attempts(), 5);
    assert_eq!(connector.session_count(), 2);

    let delays: Vec<Duration> = client
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            ClientEvent::Reconnecting { delay, .. } => Some(delay),
            _ => None,
        })
        .collect();
    assert_eq!(delays, vec![secs(2.0), secs(4.0), secs(8.0), secs(16.0)]);
}

#[test]
fn test_exhausted_reconnection_is_terminal() {
    let mut config = common::client_config();
    config.reconnect = ReconnectPolicy {
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(1_000),
        max_attempts: 3,
    };
    let (mut client, connector, first) = common::connected_client(config);
    client.play().unwrap();
    connector.fail_next_connects(u32::MAX);

    first.push_event(SessionEvent::Closed("gone".into()));
    let mut now = Duration::ZERO;
    for _ in 0..100 {
        now += Duration::from_millis(50);
        client.poll(now);
    }

    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.playback_state(), PlaybackState::Stopped);
    assert_eq!(connector.attempts(), 4);
    assert!(client.next_reconnect_at().is_none());

    let events = client.drain_events();
    let exhausted = common::count_events(&events, |e| {
        matches!(e, ClientEvent::Error(ClientError::ReconnectExhausted { attempts: 3 }))
    });
    assert_eq!(exhausted, 1);

    // The host may start over explicitly.
    connector.fail_next_connects(0);
    client.connect().unwrap();
    assert_eq!(connector.session_count(), 2);
}

#[test]
fn test_snapshot_is_resubmitted_after_reconnect() {
    let (mut client, connector, first) = common::connected_client(common::client_config());
    let blend = common::prompts(&[("harbor", 0.8), ("gulls", 0.2)]);
    client.set_weighted_prompts(&blend).unwrap();

    first.push_event(SessionEvent::Closed("lost".into()));
    client.poll(secs(0.0));

    // Updates while reconnecting replace the snapshot instead of failing.
    let newer = common::prompts(&[("harbor", 0.5), ("market", 0.5)]);
    client.set_weighted_prompts(&newer).unwrap();
    assert_eq!(first.prompt_submissions(), vec![blend]);

    client.poll(secs(2.0));
    let second = connector.latest().unwrap();
    assert!(second.prompt_submissions().is_empty());
    second.push_message(ServerMessage::SetupComplete);
    client.poll(secs(2.1));
    assert_eq!(second.prompt_submissions(), vec![newer]);
}

#[test]
fn test_queued_prompts_survive_connection_loss() {
    let (mut client, connector, first) = common::connected_client(common::client_config());
    client.play().unwrap();
    client.reset().unwrap();
    let queued = common::prompts(&[("storm", 1.0)]);
    client.set_weighted_prompts(&queued).unwrap();
    assert!(first.prompt_submissions().is_empty());

    first.push_event(SessionEvent::Closed("lost".into()));
    client.poll(secs(0.5));
    assert!(client.queued_prompts().is_none());

    client.poll(secs(2.5));
    let second = connector.latest().unwrap();
    second.push_message(ServerMessage::SetupComplete);
    client.poll(secs(2.6));
    assert_eq!(second.prompt_submissions(), vec![queued]);
}

#[test]
fn test_service_error_message_triggers_reconnect() {
    let (mut client, connector, first) = common::connected_client(common::client_config());
    first.push_message(ServerMessage::Error {
        message: "internal".into(),
    });
    // Anything after the error in the same batch is not processed.
    first.push_message(ServerMessage::FilteredPrompt {
        text: "late".into(),
        reason: "policy".into(),
    });
    client.poll(secs(0.0));
    assert_eq!(client.state(), ConnectionState::Reconnecting);
    assert!(!client.filtered_prompts().contains("late"));
    assert_eq!(connector.session_count(), 1);
}

#[test]
fn test_explicit_connect_supersedes_backoff() {
    let (mut client, connector, first) = common::connected_client(common::client_config());
    first.push_event(SessionEvent::Closed("lost".into()));
    client.poll(secs(0.0));
    assert!(client.next_reconnect_at().is_some());

    client.connect().unwrap();
    assert!(client.next_reconnect_at().is_none());
    assert_eq!(client.attempt(), 0);
    assert_eq!(connector.session_count(), 2);
    assert_eq!(client.state(), ConnectionState::Connecting);
}

#[test]
fn test_repeated_loss_does_not_stack_reconnects() {
    let (mut client, connector, first) = common::connected_client(common::client_config());
    first.push_event(SessionEvent::Error("a".into()));
    first.push_event(SessionEvent::Closed("b".into()));
    client.poll(secs(0.0));
    assert_eq!(client.attempt(), 1);

    client.poll(secs(2.0));
    assert_eq!(connector.attempts(), 2);
    client.poll(secs(10.0));
    assert_eq!(connector.attempts(), 2);
}
