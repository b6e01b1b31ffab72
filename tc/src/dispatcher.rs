//! Inbound frame dispatch
//!
//! Decodes text frames from the connection and routes them to the session
//! state machine. Keepalive traffic is consumed here, unknown message types
//! are ignored and malformed frames are dropped with a warning. Nothing in
//! this path can fail the session.

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::protocol::InboundMessage;
use crate::session::SessionStateMachine;

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Delivered to the state machine; `changed` if state moved
    Applied { kind: String, changed: bool },
    /// Ping/pong, consumed without touching session state
    Keepalive,
    /// Valid frame of a type this client does not handle
    Ignored { kind: String },
    /// Not a decodable message
    Dropped,
}

impl Routing {
    pub fn changed_state(&self) -> bool {
        matches!(self, Self::Applied { changed: true, .. })
    }
}

/// Running totals, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    pub applied: u64,
    pub keepalive: u64,
    pub ignored: u64,
    pub dropped: u64,
}

/// Routes decoded inbound messages to the state machine
#[derive(Debug, Default)]
pub struct MessageDispatcher {
    stats: DispatchStats,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Decode one text frame and route it
    pub fn route(&mut self, text: &str, machine: &mut SessionStateMachine, now: Instant) -> Routing {
        self.stats.received += 1;
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                self.stats.dropped += 1;
                warn!(error = %e, frame_len = text.len(), "Dropping malformed frame");
                return Routing::Dropped;
            }
        };
        self.dispatch(message, machine, now)
    }

    /// Route an already-decoded message
    pub fn dispatch(&mut self, message: InboundMessage, machine: &mut SessionStateMachine, now: Instant) -> Routing {
        debug!(kind = message.kind(), "MessageDispatcher::dispatch: called");
        if message.is_keepalive() {
            self.stats.keepalive += 1;
            return Routing::Keepalive;
        }
        if let InboundMessage::Unknown { kind } = message {
            self.stats.ignored += 1;
            debug!(%kind, "MessageDispatcher::dispatch: ignoring unknown type");
            return Routing::Ignored { kind };
        }

        let kind = message.kind().to_string();
        let changed = machine.apply(message, now);
        self.stats.applied += 1;
        Routing::Applied { kind, changed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;

    fn setup() -> (MessageDispatcher, SessionStateMachine) {
        let mut machine = SessionStateMachine::new(10);
        machine.start_planning("Plan a 5-day trip to Rajasthan", true, Instant::now());
        (MessageDispatcher::new(), machine)
    }

    #[test]
    fn test_routes_agent_events() {
        let (mut dispatcher, mut machine) = setup();
        let now = Instant::now();

        let routing = dispatcher.route(r#"{"type":"agent_start","agent":"planner"}"#, &mut machine, now);
        assert_eq!(
            routing,
            Routing::Applied {
                kind: "agent_start".to_string(),
                changed: true
            }
        );
        assert!(routing.changed_state());
        assert_eq!(machine.tracker().active().map(|d| d.id), Some("planner"));

        dispatcher.route(r#"{"type":"agent_complete","agent":"planner"}"#, &mut machine, now);
        assert_eq!(machine.tracker().completed_count(), 1);
    }

    #[test]
    fn test_keepalive_is_consumed() {
        let (mut dispatcher, mut machine) = setup();
        let before = machine.session().clone();

        assert_eq!(
            dispatcher.route(r#"{"type":"ping"}"#, &mut machine, Instant::now()),
            Routing::Keepalive
        );
        assert_eq!(
            dispatcher.route(r#"{"type":"pong"}"#, &mut machine, Instant::now()),
            Routing::Keepalive
        );
        assert_eq!(machine.session(), &before);
        assert_eq!(dispatcher.stats().keepalive, 2);
    }

    #[test]
    fn test_unknown_type_ignored() {
        let (mut dispatcher, mut machine) = setup();
        let routing = dispatcher.route(r#"{"type":"weather_report","temp":31}"#, &mut machine, Instant::now());

        assert_eq!(
            routing,
            Routing::Ignored {
                kind: "weather_report".to_string()
            }
        );
        assert_eq!(machine.phase(), Phase::Progress);
    }

    #[test]
    fn test_malformed_frames_dropped_without_state_change() {
        let (mut dispatcher, mut machine) = setup();
        let before = machine.session().clone();

        for frame in ["{not json", "42", r#"{"no_type":true}"#, r#"{"type":"questions"}"#] {
            assert_eq!(dispatcher.route(frame, &mut machine, Instant::now()), Routing::Dropped);
        }
        assert_eq!(machine.session(), &before);
        assert!(machine.session().error.is_none());
        assert_eq!(dispatcher.stats().dropped, 4);
    }

    #[test]
    fn test_connected_is_applied_without_change() {
        let (mut dispatcher, mut machine) = setup();
        let routing = dispatcher.route(
            r#"{"type":"connected","session_id":"abc-123"}"#,
            &mut machine,
            Instant::now(),
        );
        assert_eq!(
            routing,
            Routing::Applied {
                kind: "connected".to_string(),
                changed: false
            }
        );
    }

    #[test]
    fn test_stats_totals() {
        let (mut dispatcher, mut machine) = setup();
        let now = Instant::now();
        dispatcher.route(r#"{"type":"agent_start","agent":"planner"}"#, &mut machine, now);
        dispatcher.route(r#"{"type":"ping"}"#, &mut machine, now);
        dispatcher.route(r#"{"type":"mystery"}"#, &mut machine, now);
        dispatcher.route("garbage", &mut machine, now);

        assert_eq!(
            dispatcher.stats(),
            DispatchStats {
                received: 4,
                applied: 1,
                keepalive: 1,
                ignored: 1,
                dropped: 1,
            }
        );
    }
}
