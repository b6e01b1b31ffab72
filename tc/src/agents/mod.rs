//! Backend agents: the static roster and runtime progress tracking

mod roster;
mod tracker;

pub use roster::{AgentDescriptor, ROSTER, descriptor, position};
pub use tracker::{AgentPayload, AgentProgressTracker, AgentRow, AgentStatus};
