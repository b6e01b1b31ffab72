//! Request types for the SessionController

use tokio::sync::oneshot;

use crate::dispatcher::DispatchStats;
use crate::protocol::Answers;
use crate::session::{SessionView, Transition};

/// Requests to the controller task
#[derive(Debug)]
pub enum ControllerRequest {
    /// Begin a planning run for `query`
    StartPlanning {
        query: String,
        reply_tx: oneshot::Sender<Transition>,
    },

    /// Answer the pending clarification questions
    SubmitAnswers {
        answers: Answers,
        reply_tx: oneshot::Sender<Transition>,
    },

    /// Back to the input phase
    Reset,

    /// Hide the error overlay
    DismissError,

    /// Open the connection if it is down
    Connect,

    /// Current view model
    Snapshot { reply_tx: oneshot::Sender<SessionView> },

    /// Inbound frame totals
    Stats { reply_tx: oneshot::Sender<DispatchStats> },

    /// Tear down the connection and stop
    Shutdown,
}
