#![allow(dead_code)]
//! Test harness utilities for sonarium-net integration tests.

use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use sonarium_net::framing::{read_message, write_message};
use sonarium_net::protocol::{ClientMessage, ServerMessage};
use sonarium_net::session::{MusicSession, SessionEvent};

/// A loopback stand-in for the generative-music service.
pub struct FakeService {
    listener: TcpListener,
}

impl FakeService {
    pub fn bind() -> std::io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind("127.0.0.1:0")?,
        })
    }

    pub fn addr(&self) -> String {
        self.listener.local_addr().unwrap().to_string()
    }

    /// Accept one client (blocking).
    pub fn accept(&self) -> std::io::Result<FakePeer> {
        let (stream, _) = self.listener.accept()?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        let read_stream = stream.try_clone()?;
        Ok(FakePeer {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }
}

/// The service side of one accepted connection.
pub struct FakePeer {
    pub reader: BufReader<TcpStream>,
    pub writer: BufWriter<TcpStream>,
}

impl FakePeer {
    pub fn send(&mut self, msg: &ServerMessage) -> std::io::Result<()> {
        write_message(&mut self.writer, msg)
    }

    pub fn recv(&mut self) -> std::io::Result<ClientMessage> {
        read_message(&mut self.reader)
    }
}

/// Poll `session` until `pred` matches an event, collecting everything seen.
pub fn poll_until<F: Fn(&SessionEvent) -> bool>(
    session: &mut dyn MusicSession,
    timeout: Duration,
    pred: F,
) -> Vec<SessionEvent> {
    let start = Instant::now();
    let mut seen = Vec::new();
    while start.elapsed() < timeout {
        let events = session.poll_events();
        let done = events.iter().any(&pred);
        seen.extend(events);
        if done {
            return seen;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for session event; saw {:?}", seen);
}

/// Keep polling `session` for `duration` so queued writes reach the socket.
pub fn pump(session: &mut dyn MusicSession, duration: Duration) -> Vec<SessionEvent> {
    let start = Instant::now();
    let mut seen = Vec::new();
    while start.elapsed() < duration {
        seen.extend(session.poll_events());
        std::thread::sleep(Duration::from_millis(5));
    }
    seen
}
