//! Session controller
//!
//! A single task owns the state machine, the dispatcher and the connection.
//! User actions arrive as requests over a channel, connection events and the
//! elapsed-time tick arrive on their own channels, and every state change is
//! published as a `SessionView`.

mod core;
mod handle;
mod messages;

pub use core::{ControllerSettings, SessionController};
pub use handle::ControllerHandle;
pub use messages::ControllerRequest;
