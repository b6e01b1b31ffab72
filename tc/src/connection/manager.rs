//! ConnectionManager: single link lifecycle, keepalive and reconnect

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use super::transport::{LinkHandle, Transport};
use super::{ConnectionEvent, ConnectionStatus, LinkEvent, NORMAL_CLOSURE, Outgoing};
use crate::config::Config;
use crate::protocol::OutboundMessage;

/// Where to connect and how often to keep alive and retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub endpoint: String,
    pub keepalive_interval: Duration,
    pub reconnect_delay: Duration,
}

impl ConnectionSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            keepalive_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
        }
    }

    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        Ok(Self {
            endpoint: config.session_endpoint()?,
            keepalive_interval: config.connection.keepalive_interval(),
            reconnect_delay: config.connection.reconnect_delay(),
        })
    }
}

/// What a connection event meant for the owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The link opened
    Opened,
    /// A text frame arrived
    Frame(String),
    /// The link went down; `reconnecting` if a retry was scheduled
    Disconnected { reconnecting: bool },
    /// A scheduled reconnect started a new attempt
    Reconnecting,
    /// Event from a stale link or timer
    Ignored,
}

/// Owns the single live connection to the planning service
pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    settings: ConnectionSettings,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    status: ConnectionStatus,
    /// Bumped for every link opened and on teardown
    generation: u64,
    link: Option<LinkHandle>,
    keepalive: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Create a manager; the receiver yields its events and must be fed back
    /// through `handle_event`
    pub fn new(
        transport: Box<dyn Transport>,
        settings: ConnectionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        debug!(endpoint = %settings.endpoint, "ConnectionManager::new: called");
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            transport,
            settings,
            events_tx,
            status: ConnectionStatus::Disconnected,
            generation: 0,
            link: None,
            keepalive: None,
            reconnect: None,
        };
        (manager, events_rx)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }

    /// Open a link unless one is already open or opening
    pub fn connect(&mut self) {
        debug!(status = ?self.status, "ConnectionManager::connect: called");
        if self.status != ConnectionStatus::Disconnected {
            debug!("ConnectionManager::connect: already connected or connecting");
            return;
        }

        self.cancel_reconnect();
        self.stop_keepalive();
        if let Some(old) = self.link.take() {
            old.abort();
        }

        self.generation += 1;
        self.status = ConnectionStatus::Connecting;
        info!(endpoint = %self.settings.endpoint, generation = self.generation, "Connecting");
        self.link = Some(
            self.transport
                .open(&self.settings.endpoint, self.generation, self.events_tx.clone()),
        );
    }

    /// Serialize and transmit a message if the link is open
    ///
    /// Returns false (and sends nothing) otherwise.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        debug!(kind = message.kind(), "ConnectionManager::send: called");
        if self.status != ConnectionStatus::Connected {
            debug!(kind = message.kind(), status = ?self.status, "ConnectionManager::send: not connected, dropping");
            return false;
        }
        let Some(link) = &self.link else {
            return false;
        };
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "Failed to serialize outbound message");
                return false;
            }
        };
        link.send(Outgoing::Text(frame))
    }

    /// Apply one event from the transport or a timer
    pub fn handle_event(&mut self, event: ConnectionEvent) -> LinkOutcome {
        match event {
            ConnectionEvent::ReconnectDue { generation } => {
                if generation != self.generation || self.reconnect.is_none() {
                    debug!(generation, current = self.generation, "ConnectionManager::handle_event: stale reconnect");
                    return LinkOutcome::Ignored;
                }
                self.reconnect = None;
                info!("Reconnecting");
                self.connect();
                LinkOutcome::Reconnecting
            }
            ConnectionEvent::Link { generation, event } => {
                if generation != self.generation {
                    debug!(generation, current = self.generation, ?event, "ConnectionManager::handle_event: stale link event");
                    return LinkOutcome::Ignored;
                }
                self.handle_link_event(event)
            }
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) -> LinkOutcome {
        match event {
            LinkEvent::Opened => {
                info!(generation = self.generation, "Connected");
                self.status = ConnectionStatus::Connected;
                self.start_keepalive();
                LinkOutcome::Opened
            }
            LinkEvent::Frame(text) => LinkOutcome::Frame(text),
            LinkEvent::Error(error) => {
                warn!(%error, "Connection error");
                self.status = ConnectionStatus::Disconnected;
                self.stop_keepalive();
                LinkOutcome::Disconnected {
                    reconnecting: self.reconnect_pending(),
                }
            }
            LinkEvent::Closed { code } => {
                self.status = ConnectionStatus::Disconnected;
                self.stop_keepalive();
                self.link = None;
                if code == Some(NORMAL_CLOSURE) {
                    info!("Connection closed normally");
                    return LinkOutcome::Disconnected { reconnecting: false };
                }
                warn!(?code, delay = ?self.settings.reconnect_delay, "Connection lost, scheduling reconnect");
                self.schedule_reconnect();
                LinkOutcome::Disconnected { reconnecting: true }
            }
        }
    }

    fn start_keepalive(&mut self) {
        self.stop_keepalive();
        let Some(link) = &self.link else {
            return;
        };
        let frame = match OutboundMessage::Ping.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Keepalive disabled: cannot serialize ping");
                return;
            }
        };

        let outbound = link.sender();
        let period = self.settings.keepalive_interval;
        debug!(?period, "ConnectionManager::start_keepalive: called");
        self.keepalive = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if outbound.send(Outgoing::Text(frame.clone())).is_err() {
                    debug!("keepalive: link gone");
                    break;
                }
                debug!("keepalive: ping sent");
            }
        }));
    }

    fn stop_keepalive(&mut self) {
        if let Some(task) = self.keepalive.take() {
            debug!("ConnectionManager::stop_keepalive: stopping");
            task.abort();
        }
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();
        let generation = self.generation;
        let delay = self.settings.reconnect_delay;
        let tx = self.events_tx.clone();
        self.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ConnectionEvent::ReconnectDue { generation });
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(task) = self.reconnect.take() {
            debug!("ConnectionManager::cancel_reconnect: cancelling");
            task.abort();
        }
    }

    /// Cancel timers and close the link normally
    ///
    /// Safe to call more than once; events from the closed link are ignored.
    pub fn teardown(&mut self) {
        debug!(generation = self.generation, "ConnectionManager::teardown: called");
        self.cancel_reconnect();
        self.stop_keepalive();
        if let Some(link) = self.link.take() {
            info!("Closing connection");
            link.close(NORMAL_CLOSURE);
        }
        self.generation += 1;
        self.status = ConnectionStatus::Disconnected;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel_reconnect();
        self.stop_keepalive();
    }
}
