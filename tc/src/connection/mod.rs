//! Backend connection lifecycle
//!
//! `ConnectionManager` owns the single live link to the planning service and
//! its timers (keepalive, reconnect). Links are opened through a `Transport`,
//! which reports everything that happens on a link as `ConnectionEvent`s on
//! one channel. Each link carries a generation number so events from a link
//! that was replaced or torn down are recognized and dropped.

mod manager;
mod memory;
mod transport;

use serde::Serialize;

pub use manager::{ConnectionManager, ConnectionSettings, LinkOutcome};
pub use memory::MemoryTransport;
pub use transport::{LinkHandle, Transport, WsTransport};

/// Close code for an intentional shutdown; the only one that suppresses reconnect
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when a link drops without a close handshake
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Connection state as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Something that happened on one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    Frame(String),
    Error(String),
    /// The link is gone; `code` is None when no close frame was seen
    Closed { code: Option<u16> },
}

/// Events delivered to the connection owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Link { generation: u64, event: LinkEvent },
    /// The reconnect delay scheduled for `generation` elapsed
    ReconnectDue { generation: u64 },
}

/// Instructions to a link's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Close(u16),
}
