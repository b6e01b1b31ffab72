//! Session phase state machine and its view model

mod machine;
mod state;
mod view;

pub use machine::{SessionStateMachine, Transition};
pub use state::{Command, Phase, Rejection, Session};
pub use view::SessionView;
