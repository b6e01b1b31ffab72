//! Session data types

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::protocol::OutboundMessage;

/// Top-level stage of the client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for a trip query
    #[default]
    Input,
    /// A planning run is in flight
    Progress,
    /// The backend asked clarification questions
    Questions,
    /// An itinerary was delivered
    Result,
}

/// User-visible session state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    pub phase: Phase,
    pub query: String,
    /// Dismissible overlay; orthogonal to phase
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
}

/// Why a user action was refused locally
///
/// The Display text is what ends up in `Session::error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Please describe your trip in more detail (at least {min} characters, got {actual})")]
    QueryTooShort { min: usize, actual: usize },

    #[error("Not connected to the planning service. Reconnecting, please try again.")]
    NotConnected,

    #[error("Please answer at least one question")]
    NoAnswers,
}

/// Side effect requested by the state machine, executed by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Transmit a message over the live connection
    Send(OutboundMessage),
    /// Open the connection now
    Connect,
}
