//! TCP transport for the session protocol.
//!
//! `connect` returns at once. The socket is opened and the `Setup` frame
//! written on a short-lived thread, and the ready stream is handed back
//! over a channel that `poll_events` checks. From then on the socket is
//! non-blocking: `send` queues bytes and flushes what the kernel accepts,
//! `poll_events` drains whatever has arrived. Both are driven from the host
//! tick, so a slow or unreachable endpoint never stalls the caller.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, info, warn};

use crate::framing::{encode_frame, write_message, FrameDecoder, FrameError};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{MusicSession, SessionConnector, SessionError, SessionEvent, SessionResult};

const READ_CHUNK: usize = 16 * 1024;

/// Opens `TcpSession`s to a fixed address.
pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl SessionConnector for TcpConnector {
    fn connect(&mut self, model_id: &str) -> SessionResult<Box<dyn MusicSession>> {
        let session = TcpSession::connect(&self.addr, model_id, self.connect_timeout)?;
        Ok(Box::new(session))
    }
}

enum Link {
    /// Handshake still running on the connect thread.
    Pending(Receiver<io::Result<TcpStream>>),
    Open(TcpStream),
    Closed,
}

pub struct TcpSession {
    addr: String,
    link: Link,
    decoder: FrameDecoder,
    outbound: Vec<u8>,
    /// Failure seen by `send`, reported once by the next `poll_events`.
    unreported: Option<String>,
}

impl TcpSession {
    /// Start connecting to `addr` and sending `Setup` for `model_id`.
    ///
    /// Only thread creation can fail here; resolution, connect and
    /// handshake failures arrive later as a `SessionEvent::Error`.
    pub fn connect(addr: &str, model_id: &str, timeout: Duration) -> SessionResult<Self> {
        info!(target: "net::tcp", "connecting to {} (model {})", addr, model_id);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let target = addr.to_string();
        let setup = ClientMessage::Setup {
            model: model_id.to_string(),
        };
        thread::Builder::new()
            .name("sonarium-connect".into())
            .spawn(move || {
                let _ = tx.send(open_stream(&target, &setup, timeout));
            })?;

        Ok(Self {
            addr: addr.to_string(),
            link: Link::Pending(rx),
            decoder: FrameDecoder::new(),
            outbound: Vec::new(),
            unreported: None,
        })
    }

    pub fn is_open(&self) -> bool {
        matches!(self.link, Link::Open(_))
    }

    /// Adopt the stream if the connect thread has finished.
    fn check_pending(&mut self) -> io::Result<()> {
        let rx = match &self.link {
            Link::Pending(rx) => rx,
            _ => return Ok(()),
        };
        match rx.try_recv() {
            Ok(Ok(stream)) => {
                info!(target: "net::tcp", "connected to {}", self.addr);
                self.link = Link::Open(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(TryRecvError::Empty) => Ok(()),
            Err(TryRecvError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::Other,
                "connect thread exited without a result",
            )),
        }
    }

    fn flush_outbound(&mut self) -> io::Result<()> {
        let stream = match &mut self.link {
            Link::Open(stream) => stream,
            _ => return Ok(()),
        };
        while !self.outbound.is_empty() {
            match stream.write(&self.outbound) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        matches!(self.link, Link::Closed)
    }

    fn mark_closed(&mut self) {
        if let Link::Open(stream) = &self.link {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.link = Link::Closed;
    }
}

/// Runs on the connect thread.
fn open_stream(addr: &str, setup: &ClientMessage, timeout: Duration) -> io::Result<TcpStream> {
    let sock_addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, format!("no address for {}", addr))
    })?;
    let mut stream = TcpStream::connect_timeout(&sock_addr, timeout)?;
    stream.set_nodelay(true)?;
    write_message(&mut stream, setup)?;
    stream.set_nonblocking(true)?;
    Ok(stream)
}

impl MusicSession for TcpSession {
    fn send(&mut self, msg: ClientMessage) -> SessionResult {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let frame = encode_frame(&msg)?;
        // Frames sent before the handshake finishes wait behind `Setup`.
        self.outbound.extend_from_slice(&frame);
        if let Err(e) = self.check_pending().and_then(|()| self.flush_outbound()) {
            warn!(target: "net::tcp", "write failed: {}", e);
            self.unreported = Some(e.to_string());
            self.mark_closed();
            return Err(e.into());
        }
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.is_closed() {
            if let Some(reason) = self.unreported.take() {
                events.push(SessionEvent::Error(reason));
            }
            return events;
        }

        if let Err(e) = self.check_pending() {
            warn!(target: "net::tcp", "connect to {} failed: {}", self.addr, e);
            self.mark_closed();
            events.push(SessionEvent::Error(e.to_string()));
            return events;
        }
        let stream = match &mut self.link {
            Link::Open(stream) => stream,
            _ => return events,
        };

        let mut buf = [0u8; READ_CHUNK];
        let mut terminal = None;
        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    terminal = Some(SessionEvent::Closed("peer closed the connection".into()));
                    break;
                }
                Ok(n) => self.decoder.push(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    terminal = Some(SessionEvent::Error(e.to_string()));
                    break;
                }
            }
        }

        if terminal.is_none() {
            if let Err(e) = self.flush_outbound() {
                warn!(target: "net::tcp", "write failed: {}", e);
                terminal = Some(SessionEvent::Error(e.to_string()));
            }
        }

        // Frames that arrived before a close are still delivered first.
        loop {
            match self.decoder.next_message::<ServerMessage>() {
                Ok(Some(msg)) => {
                    debug!(target: "net::tcp", "received {}", msg.kind());
                    events.push(SessionEvent::Message(msg));
                }
                Ok(None) => break,
                Err(e @ FrameError::Json(_)) => {
                    warn!(target: "net::tcp", "dropping frame: {}", e);
                }
                Err(e) => {
                    terminal = Some(SessionEvent::Error(e.to_string()));
                    break;
                }
            }
        }

        if let Some(event) = terminal {
            self.mark_closed();
            events.push(event);
        }
        events
    }

    fn close(&mut self) {
        if !self.is_closed() {
            info!(target: "net::tcp", "closing session");
        }
        self.unreported = None;
        self.mark_closed();
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.mark_closed();
    }
}
