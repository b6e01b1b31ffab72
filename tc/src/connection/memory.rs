//! In-process transport for driving the connection without a network
//!
//! Every `open` records a link. Tests (or demos) then play the server side:
//! accept the link, push frames, close it with a code, and read back what the
//! client wrote.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use super::transport::{LinkHandle, Transport};
use super::{ABNORMAL_CLOSURE, ConnectionEvent, LinkEvent, Outgoing};

#[derive(Debug)]
struct MemoryLink {
    endpoint: String,
    generation: u64,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    outbound: mpsc::UnboundedReceiver<Outgoing>,
    sent: Vec<String>,
    closed_with: Option<u16>,
}

impl MemoryLink {
    fn drain(&mut self) {
        while let Ok(outgoing) = self.outbound.try_recv() {
            match outgoing {
                Outgoing::Text(text) => self.sent.push(text),
                Outgoing::Close(code) => self.closed_with = Some(code),
            }
        }
    }

    fn emit(&self, event: LinkEvent) -> bool {
        self.events
            .send(ConnectionEvent::Link {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    links: Vec<MemoryLink>,
    auto_accept: bool,
}

/// Transport whose server side is scripted in-process
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that accepts every link as soon as it is opened
    pub fn auto_accepting() -> Self {
        let transport = Self::default();
        transport.lock().auto_accept = true;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of links opened so far
    pub fn open_count(&self) -> usize {
        self.lock().links.len()
    }

    /// Endpoint of the most recent link
    pub fn latest_endpoint(&self) -> Option<String> {
        self.lock().links.last().map(|l| l.endpoint.clone())
    }

    fn with_latest<T>(&self, f: impl FnOnce(&mut MemoryLink) -> T) -> Option<T> {
        let mut state = self.lock();
        state.links.last_mut().map(f)
    }

    /// Complete the handshake on the latest link
    pub fn accept(&self) -> bool {
        self.with_latest(|link| link.emit(LinkEvent::Opened)).unwrap_or(false)
    }

    /// Deliver a text frame from the server on the latest link
    pub fn push_frame(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        self.with_latest(|link| link.emit(LinkEvent::Frame(text))).unwrap_or(false)
    }

    /// Server closes the latest link; None means no close frame
    pub fn close_latest(&self, code: Option<u16>) -> bool {
        self.with_latest(|link| link.emit(LinkEvent::Closed { code })).unwrap_or(false)
    }

    /// The latest link errors out and drops
    pub fn fail_latest(&self, message: &str) -> bool {
        self.with_latest(|link| {
            link.emit(LinkEvent::Error(message.to_string()))
                && link.emit(LinkEvent::Closed {
                    code: Some(ABNORMAL_CLOSURE),
                })
        })
        .unwrap_or(false)
    }

    /// Text frames written by the client, across all links, oldest first
    pub fn sent_frames(&self) -> Vec<String> {
        let mut state = self.lock();
        state
            .links
            .iter_mut()
            .flat_map(|link| {
                link.drain();
                link.sent.clone()
            })
            .collect()
    }

    /// Close code the client sent on the latest link, if it closed it
    pub fn client_close_code(&self) -> Option<u16> {
        self.with_latest(|link| {
            link.drain();
            link.closed_with
        })
        .flatten()
    }
}

impl Transport for MemoryTransport {
    fn open(&self, endpoint: &str, generation: u64, events: mpsc::UnboundedSender<ConnectionEvent>) -> LinkHandle {
        debug!(%endpoint, generation, "MemoryTransport::open: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let link = MemoryLink {
            endpoint: endpoint.to_string(),
            generation,
            events,
            outbound: rx,
            sent: Vec::new(),
            closed_with: None,
        };

        let mut state = self.lock();
        if state.auto_accept {
            link.emit(LinkEvent::Opened);
        }
        state.links.push(link);
        LinkHandle::new(tx, None)
    }
}
