//! ControllerHandle - client interface to a running session

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::messages::ControllerRequest;
use crate::dispatcher::DispatchStats;
use crate::protocol::Answers;
use crate::session::{SessionView, Transition};

/// Handle to a running `SessionController`
///
/// Cloneable; every clone talks to the same session. State changes are
/// published as `SessionView`s through `subscribe`.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerRequest>,
    view_rx: watch::Receiver<SessionView>,
}

impl ControllerHandle {
    pub(crate) fn new(tx: mpsc::Sender<ControllerRequest>, view_rx: watch::Receiver<SessionView>) -> Self {
        debug!("ControllerHandle::new: called");
        Self { tx, view_rx }
    }

    async fn request(&self, req: ControllerRequest) -> Result<()> {
        self.tx
            .send(req)
            .await
            .map_err(|_| eyre!("Session controller channel closed"))
    }

    /// Begin a planning run
    pub async fn start_planning(&self, query: &str) -> Result<Transition> {
        debug!(query_len = query.len(), "ControllerHandle::start_planning: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(ControllerRequest::StartPlanning {
            query: query.to_string(),
            reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| eyre!("Session controller shut down"))
    }

    /// Answer the pending clarification questions
    pub async fn submit_answers(&self, answers: Answers) -> Result<Transition> {
        debug!(count = answers.len(), "ControllerHandle::submit_answers: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(ControllerRequest::SubmitAnswers { answers, reply_tx })
            .await?;
        reply_rx.await.map_err(|_| eyre!("Session controller shut down"))
    }

    pub async fn reset(&self) -> Result<()> {
        debug!("ControllerHandle::reset: called");
        self.request(ControllerRequest::Reset).await
    }

    pub async fn dismiss_error(&self) -> Result<()> {
        debug!("ControllerHandle::dismiss_error: called");
        self.request(ControllerRequest::DismissError).await
    }

    pub async fn connect(&self) -> Result<()> {
        debug!("ControllerHandle::connect: called");
        self.request(ControllerRequest::Connect).await
    }

    /// View as of after every earlier request was handled
    pub async fn snapshot(&self) -> Result<SessionView> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(ControllerRequest::Snapshot { reply_tx }).await?;
        reply_rx.await.map_err(|_| eyre!("Session controller shut down"))
    }

    pub async fn stats(&self) -> Result<DispatchStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(ControllerRequest::Stats { reply_tx }).await?;
        reply_rx.await.map_err(|_| eyre!("Session controller shut down"))
    }

    /// Latest published view, without a round trip
    pub fn current(&self) -> SessionView {
        self.view_rx.borrow().clone()
    }

    /// Receiver notified on every published view
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view_rx.clone()
    }

    /// Wait until a published view satisfies `predicate`
    pub async fn wait_for(&self, mut predicate: impl FnMut(&SessionView) -> bool) -> Result<SessionView> {
        let mut rx = self.subscribe();
        let view = rx
            .wait_for(|view| predicate(view))
            .await
            .map_err(|_| eyre!("Session controller shut down"))?;
        Ok(view.clone())
    }

    /// Tear down the connection and stop the controller
    pub async fn shutdown(&self) -> Result<()> {
        debug!("ControllerHandle::shutdown: called");
        self.request(ControllerRequest::Shutdown).await
    }
}
