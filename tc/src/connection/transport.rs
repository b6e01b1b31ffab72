//! Link transports

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};
use tracing::{debug, info, warn};

use super::{ABNORMAL_CLOSURE, ConnectionEvent, LinkEvent, Outgoing};

/// Opens links to the planning service
///
/// `open` must not block: it starts the link and reports progress through
/// `events`, tagging every event with `generation`. A link that fails to
/// connect reports `Error` and/or `Closed` like any other failed link.
pub trait Transport: Send + Sync {
    fn open(&self, endpoint: &str, generation: u64, events: mpsc::UnboundedSender<ConnectionEvent>) -> LinkHandle;
}

/// Write side of an open link
#[derive(Debug)]
pub struct LinkHandle {
    outbound: mpsc::UnboundedSender<Outgoing>,
    task: Option<JoinHandle<()>>,
}

impl LinkHandle {
    pub fn new(outbound: mpsc::UnboundedSender<Outgoing>, task: Option<JoinHandle<()>>) -> Self {
        Self { outbound, task }
    }

    /// Queue an instruction; false if the link's writer is gone
    pub fn send(&self, outgoing: Outgoing) -> bool {
        self.outbound.send(outgoing).is_ok()
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Outgoing> {
        self.outbound.clone()
    }

    /// Ask the link to close with `code`
    pub fn close(&self, code: u16) {
        debug!(code, "LinkHandle::close: called");
        if !self.send(Outgoing::Close(code)) {
            debug!("LinkHandle::close: link already gone");
        }
    }

    /// Kill the link task outright
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Transport for WsTransport {
    fn open(&self, endpoint: &str, generation: u64, events: mpsc::UnboundedSender<ConnectionEvent>) -> LinkHandle {
        debug!(%endpoint, generation, "WsTransport::open: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_link(
            endpoint.to_string(),
            generation,
            rx,
            events,
            self.connect_timeout,
        ));
        LinkHandle::new(tx, Some(task))
    }
}

async fn run_link(
    endpoint: String,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    connect_timeout: Duration,
) {
    let emit = |event: LinkEvent| {
        if events.send(ConnectionEvent::Link { generation, event }).is_err() {
            debug!(generation, "run_link: event receiver dropped");
        }
    };

    let ws = match tokio::time::timeout(connect_timeout, connect_async(endpoint.as_str())).await {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => {
            warn!(%endpoint, error = %e, "WebSocket connect failed");
            emit(LinkEvent::Error(e.to_string()));
            emit(LinkEvent::Closed { code: None });
            return;
        }
        Err(_) => {
            warn!(%endpoint, ?connect_timeout, "WebSocket connect timed out");
            emit(LinkEvent::Error(format!("Connect timed out after {:?}", connect_timeout)));
            emit(LinkEvent::Closed { code: None });
            return;
        }
    };

    info!(%endpoint, generation, "WebSocket connected");
    emit(LinkEvent::Opened);
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        warn!(error = %e, "WebSocket send failed");
                        emit(LinkEvent::Error(e.to_string()));
                        emit(LinkEvent::Closed { code: Some(ABNORMAL_CLOSURE) });
                        return;
                    }
                }
                Some(Outgoing::Close(code)) => {
                    debug!(code, "run_link: closing");
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    };
                    if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
                        debug!(error = %e, "run_link: close frame not sent");
                    }
                    emit(LinkEvent::Closed { code: Some(code) });
                    return;
                }
                None => {
                    debug!("run_link: handle dropped");
                    if let Err(e) = sink.close().await {
                        debug!(error = %e, "run_link: close failed");
                    }
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => emit(LinkEvent::Frame(text)),
                Some(Ok(WsMessage::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    info!(?code, "WebSocket closed by server");
                    emit(LinkEvent::Closed { code });
                    return;
                }
                // Transport pings are answered by tungstenite itself
                Some(Ok(other)) => {
                    debug!(len = other.len(), "run_link: ignoring non-text frame");
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket read failed");
                    emit(LinkEvent::Error(e.to_string()));
                    emit(LinkEvent::Closed { code: Some(ABNORMAL_CLOSURE) });
                    return;
                }
                None => {
                    emit(LinkEvent::Closed { code: Some(ABNORMAL_CLOSURE) });
                    return;
                }
            },
        }
    }
}
