//! In-memory sessions for exercising the client without a service.
//!
//! `TestConnector` hands out sessions that record every outbound message and
//! replay events pushed through a `TestSessionHandle`. All sends succeed
//! unless a handle asks otherwise. Uses `Arc<Mutex>` so handles can be
//! cloned freely into test code.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use sonarium_types::WeightedPrompt;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{MusicSession, SessionConnector, SessionError, SessionEvent, SessionResult};

#[derive(Debug, Default)]
struct SessionLog {
    sent: Vec<ClientMessage>,
    inbound: VecDeque<SessionEvent>,
    closed: bool,
    fail_sends: bool,
}

#[derive(Debug, Default)]
struct ConnectorLog {
    sessions: Vec<Arc<Mutex<SessionLog>>>,
    attempts: u32,
    fail_next: u32,
}

/// Connector that records every session it opens.
#[derive(Debug, Clone, Default)]
pub struct TestConnector {
    log: Arc<Mutex<ConnectorLog>>,
}

impl TestConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connection attempts fail with `ConnectionRefused`.
    pub fn fail_next_connects(&self, n: u32) {
        self.log.lock().unwrap().fail_next = n;
    }

    /// Number of connection attempts, including failed ones.
    pub fn attempts(&self) -> u32 {
        self.log.lock().unwrap().attempts
    }

    /// Number of sessions successfully opened.
    pub fn session_count(&self) -> usize {
        self.log.lock().unwrap().sessions.len()
    }

    pub fn session(&self, index: usize) -> Option<TestSessionHandle> {
        self.log
            .lock()
            .unwrap()
            .sessions
            .get(index)
            .map(|log| TestSessionHandle { log: Arc::clone(log) })
    }

    pub fn latest(&self) -> Option<TestSessionHandle> {
        self.log
            .lock()
            .unwrap()
            .sessions
            .last()
            .map(|log| TestSessionHandle { log: Arc::clone(log) })
    }
}

impl SessionConnector for TestConnector {
    fn connect(&mut self, model_id: &str) -> SessionResult<Box<dyn MusicSession>> {
        let mut log = self.log.lock().unwrap();
        log.attempts += 1;
        if log.fail_next > 0 {
            log.fail_next -= 1;
            return Err(SessionError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "test connector refused",
            )));
        }

        let session_log = Arc::new(Mutex::new(SessionLog::default()));
        session_log.lock().unwrap().sent.push(ClientMessage::Setup {
            model: model_id.to_string(),
        });
        log.sessions.push(Arc::clone(&session_log));
        Ok(Box::new(TestSession { log: session_log }))
    }
}

struct TestSession {
    log: Arc<Mutex<SessionLog>>,
}

impl MusicSession for TestSession {
    fn send(&mut self, msg: ClientMessage) -> SessionResult {
        let mut log = self.log.lock().unwrap();
        if log.closed {
            return Err(SessionError::Closed);
        }
        if log.fail_sends {
            return Err(SessionError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "test session send failure",
            )));
        }
        log.sent.push(msg);
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<SessionEvent> {
        let mut log = self.log.lock().unwrap();
        if log.closed {
            log.inbound.clear();
            return Vec::new();
        }
        log.inbound.drain(..).collect()
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closed = true;
    }
}

/// Test-side view of one opened session.
#[derive(Debug, Clone)]
pub struct TestSessionHandle {
    log: Arc<Mutex<SessionLog>>,
}

impl TestSessionHandle {
    pub fn push_event(&self, event: SessionEvent) {
        self.log.lock().unwrap().inbound.push_back(event);
    }

    pub fn push_message(&self, msg: ServerMessage) {
        self.push_event(SessionEvent::Message(msg));
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.log.lock().unwrap().sent.clone()
    }

    /// Every prompt set submitted on this session, oldest first.
    pub fn prompt_submissions(&self) -> Vec<Vec<WeightedPrompt>> {
        self.log
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter_map(|msg| match msg {
                ClientMessage::SetWeightedPrompts { weighted_prompts } => {
                    Some(weighted_prompts.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Count sent messages matching a predicate.
    pub fn count<F: Fn(&ClientMessage) -> bool>(&self, f: F) -> usize {
        self.log.lock().unwrap().sent.iter().filter(|m| f(m)).count()
    }

    pub fn is_closed(&self) -> bool {
        self.log.lock().unwrap().closed
    }

    pub fn fail_sends(&self, fail: bool) {
        self.log.lock().unwrap().fail_sends = fail;
    }
}
