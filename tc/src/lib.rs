//! Trip client - realtime session client for the multi-agent trip planner
//!
//! Drives one planning session against the backend over a persistent
//! connection: submits a trip query, follows backend agents as they work,
//! relays clarification questions and answers, and delivers the final
//! itinerary.
//!
//! # Modules
//!
//! - [`connection`] - Link lifecycle, keepalive and reconnect
//! - [`dispatcher`] - Inbound frame decoding and routing
//! - [`agents`] - Static agent roster and progress tracking
//! - [`session`] - Session phase state machine and view model
//! - [`controller`] - Actor task tying the above together
//! - [`protocol`] - Wire message types
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod agents;
pub mod cli;
pub mod config;
pub mod connection;
pub mod controller;
pub mod dispatcher;
pub mod protocol;
pub mod render;
pub mod session;

pub use agents::{AgentProgressTracker, AgentStatus, ROSTER};
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionStatus, MemoryTransport, Transport, WsTransport};
pub use controller::{ControllerHandle, ControllerSettings, SessionController};
pub use dispatcher::MessageDispatcher;
pub use protocol::{Answers, InboundMessage, OutboundMessage};
pub use session::{Phase, SessionStateMachine, SessionView};
