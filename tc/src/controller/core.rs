//! Main SessionController task implementation

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::handle::ControllerHandle;
use super::messages::ControllerRequest;
use crate::config::Config;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionSettings, LinkOutcome, Transport};
use crate::dispatcher::{MessageDispatcher, Routing};
use crate::session::{Command, SessionStateMachine, SessionView};

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub connection: ConnectionSettings,
    pub min_query_chars: usize,
    pub tick_interval: Duration,
    pub channel_buffer: usize,
}

impl ControllerSettings {
    pub fn new(connection: ConnectionSettings) -> Self {
        Self {
            connection,
            min_query_chars: 10,
            tick_interval: Duration::from_secs(1),
            channel_buffer: 32,
        }
    }

    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        Ok(Self {
            connection: ConnectionSettings::from_config(config)?,
            min_query_chars: config.session.min_query_chars,
            tick_interval: config.session.tick_interval(),
            channel_buffer: 32,
        })
    }
}

/// Owns one client session: the state machine, the dispatcher and the
/// connection, driven from a single task
pub struct SessionController {
    client_id: String,
    machine: SessionStateMachine,
    dispatcher: MessageDispatcher,
    connection: ConnectionManager,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    tx: mpsc::Sender<ControllerRequest>,
    rx: mpsc::Receiver<ControllerRequest>,
    view_tx: watch::Sender<SessionView>,
    tick_interval: Duration,
}

impl SessionController {
    pub fn new(transport: Box<dyn Transport>, settings: ControllerSettings) -> Self {
        let client_id = Uuid::now_v7().to_string();
        debug!(%client_id, "SessionController::new: called");
        let (tx, rx) = mpsc::channel(settings.channel_buffer);
        let (connection, events_rx) = ConnectionManager::new(transport, settings.connection);
        let machine = SessionStateMachine::new(settings.min_query_chars);
        let (view_tx, _) = watch::channel(machine.view(connection.status()));

        Self {
            client_id,
            machine,
            dispatcher: MessageDispatcher::new(),
            connection,
            events_rx,
            tx,
            rx,
            view_tx,
            tick_interval: settings.tick_interval,
        }
    }

    /// Handle for issuing requests and observing views
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle::new(self.tx.clone(), self.view_tx.subscribe())
    }

    /// Run the controller task
    ///
    /// Connects immediately and runs until shutdown is requested, then tears
    /// the connection down.
    pub async fn run(mut self) {
        info!(client_id = %self.client_id, endpoint = %self.connection.endpoint(), "Session controller started");
        self.connection.connect();
        self.publish();

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                req = self.rx.recv() => {
                    let Some(req) = req else {
                        debug!("SessionController::run: request channel closed");
                        break;
                    };
                    if !self.handle_request(req) {
                        break;
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_connection_event(event);
                }
                _ = ticker.tick() => {
                    if self.machine.tick(Instant::now()) {
                        self.publish();
                    }
                }
            }
        }

        self.connection.teardown();
        self.publish();
        let stats = self.dispatcher.stats();
        info!(
            client_id = %self.client_id,
            frames = stats.received,
            dropped = stats.dropped,
            "Session controller stopped"
        );
    }

    /// Returns false when the controller should stop
    fn handle_request(&mut self, req: ControllerRequest) -> bool {
        match req {
            ControllerRequest::StartPlanning { query, reply_tx } => {
                let connected = self.connection.is_connected();
                let transition = self.machine.start_planning(&query, connected, Instant::now());
                self.execute(&transition.commands);
                self.publish();
                let _ = reply_tx.send(transition);
            }

            ControllerRequest::SubmitAnswers { answers, reply_tx } => {
                let transition = self.machine.submit_answers(&answers, Instant::now());
                self.execute(&transition.commands);
                self.publish();
                let _ = reply_tx.send(transition);
            }

            ControllerRequest::Reset => {
                self.machine.reset();
                self.publish();
            }

            ControllerRequest::DismissError => {
                if self.machine.dismiss_error() {
                    self.publish();
                }
            }

            ControllerRequest::Connect => {
                self.connection.connect();
                self.publish();
            }

            ControllerRequest::Snapshot { reply_tx } => {
                let _ = reply_tx.send(self.view());
            }

            ControllerRequest::Stats { reply_tx } => {
                let _ = reply_tx.send(self.dispatcher.stats());
            }

            ControllerRequest::Shutdown => {
                info!(client_id = %self.client_id, "Shutdown requested");
                return false;
            }
        }
        true
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match self.connection.handle_event(event) {
            LinkOutcome::Opened => {
                self.machine.connection_opened();
                self.publish();
            }
            LinkOutcome::Frame(text) => {
                let routing = self.dispatcher.route(&text, &mut self.machine, Instant::now());
                if let Routing::Applied { kind, changed } = &routing {
                    debug!(%kind, changed, "SessionController::handle_connection_event: applied");
                }
                if routing.changed_state() {
                    self.publish();
                }
            }
            outcome @ (LinkOutcome::Disconnected { .. } | LinkOutcome::Reconnecting) => {
                debug!(?outcome, "SessionController::handle_connection_event: status changed");
                self.publish();
            }
            LinkOutcome::Ignored => {}
        }
    }

    fn execute(&mut self, commands: &[Command]) {
        for command in commands {
            match command {
                Command::Send(message) => {
                    if !self.connection.send(message) {
                        warn!(kind = message.kind(), "Message not sent: connection is not open");
                    }
                }
                Command::Connect => self.connection.connect(),
            }
        }
    }

    fn view(&self) -> SessionView {
        self.machine.view(self.connection.status())
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view());
    }
}
