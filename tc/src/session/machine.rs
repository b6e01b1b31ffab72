//! Session phase state machine
//!
//! Pure state: user actions and dispatched inbound messages mutate the session
//! and agent progress, and any I/O the transition needs is returned as
//! `Command`s for the controller to execute against the connection.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::state::{Command, Phase, Rejection, Session};
use super::view::SessionView;
use crate::agents::{AgentPayload, AgentProgressTracker};
use crate::connection::ConnectionStatus;
use crate::protocol::{Answers, InboundMessage, Itinerary, OutboundMessage, Question};

/// Result of a user action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub commands: Vec<Command>,
    pub rejected: Option<Rejection>,
}

impl Transition {
    fn accepted(commands: Vec<Command>) -> Self {
        Self {
            commands,
            rejected: None,
        }
    }

    fn rejected(reason: Rejection, commands: Vec<Command>) -> Self {
        Self {
            commands,
            rejected: Some(reason),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.rejected.is_none()
    }
}

/// Top-level session state and its transitions
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    session: Session,
    tracker: AgentProgressTracker,
    questions: Vec<Question>,
    /// Number of question sets received since the last reset
    question_round: u32,
    itinerary: Option<Itinerary>,
    /// Clock anchor while a run is active; None once the run ends
    run_clock: Option<Instant>,
    min_query_chars: usize,
}

impl SessionStateMachine {
    pub fn new(min_query_chars: usize) -> Self {
        debug!(min_query_chars, "SessionStateMachine::new: called");
        Self {
            session: Session::default(),
            tracker: AgentProgressTracker::new(),
            questions: Vec::new(),
            question_round: 0,
            itinerary: None,
            run_clock: None,
            min_query_chars,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn tracker(&self) -> &AgentProgressTracker {
        &self.tracker
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question_round(&self) -> u32 {
        self.question_round
    }

    pub fn itinerary(&self) -> Option<&Itinerary> {
        self.itinerary.as_ref()
    }

    /// True while the elapsed-time clock is running
    pub fn is_running(&self) -> bool {
        self.run_clock.is_some()
    }

    /// Begin a planning run
    ///
    /// Refused when the query is too short, or when the connection is not
    /// open (which also asks the controller to connect). A refused query
    /// leaves the stored one untouched.
    pub fn start_planning(&mut self, query: &str, connected: bool, now: Instant) -> Transition {
        debug!(query_len = query.len(), connected, "SessionStateMachine::start_planning: called");
        let query = query.trim();

        let actual = query.chars().filter(|c| !c.is_whitespace()).count();
        if actual < self.min_query_chars {
            debug!(actual, min = self.min_query_chars, "SessionStateMachine::start_planning: query too short");
            return self.reject(
                Rejection::QueryTooShort {
                    min: self.min_query_chars,
                    actual,
                },
                Vec::new(),
            );
        }

        if !connected {
            debug!("SessionStateMachine::start_planning: not connected");
            return self.reject(Rejection::NotConnected, vec![Command::Connect]);
        }

        self.session.query = query.to_string();
        self.tracker.clear();
        self.questions.clear();
        self.itinerary = None;
        self.session.error = None;
        self.session.phase = Phase::Progress;
        self.session.started_at = Some(Utc::now());
        self.session.elapsed_seconds = 0;
        self.run_clock = Some(now);

        info!(query = %query, "Planning run started");
        Transition::accepted(vec![Command::Send(OutboundMessage::StartPlanning {
            request: query.to_string(),
        })])
    }

    /// Reply to clarification questions
    ///
    /// Blank answers are dropped; at least one non-blank answer is required.
    pub fn submit_answers(&mut self, answers: &Answers, now: Instant) -> Transition {
        debug!(count = answers.len(), "SessionStateMachine::submit_answers: called");
        let answered = answers.answered();
        if answered.is_empty() {
            debug!("SessionStateMachine::submit_answers: nothing answered");
            return self.reject(Rejection::NoAnswers, Vec::new());
        }

        self.session.phase = Phase::Progress;
        self.session.error = None;
        if self.run_clock.is_none() {
            // Resume the clock where the run left off
            let elapsed = Duration::from_secs(self.session.elapsed_seconds);
            self.run_clock = Some(now.checked_sub(elapsed).unwrap_or(now));
        }

        info!(count = answered.len(), "Submitting clarification answers");
        Transition::accepted(vec![Command::Send(OutboundMessage::AnswerQuestions { answers: answered })])
    }

    fn reject(&mut self, reason: Rejection, commands: Vec<Command>) -> Transition {
        self.session.error = Some(reason.to_string());
        Transition::rejected(reason, commands)
    }

    /// Apply a dispatched inbound message
    ///
    /// Returns true if the session or progress state changed.
    pub fn apply(&mut self, message: InboundMessage, now: Instant) -> bool {
        debug!(kind = message.kind(), "SessionStateMachine::apply: called");
        match message {
            InboundMessage::Connected { session_id } => {
                info!(?session_id, "Backend acknowledged session");
                false
            }
            InboundMessage::AgentStart { agent, description } => {
                self.tracker.mark_active(&agent, description);
                if self.session.phase != Phase::Questions {
                    self.session.phase = Phase::Progress;
                }
                true
            }
            InboundMessage::AgentComplete { agent, summary, data } => {
                self.tracker.mark_complete(&agent, AgentPayload { summary, data });
                true
            }
            InboundMessage::Questions { questions } => {
                info!(count = questions.len(), "Backend asked clarification questions");
                self.questions = questions;
                self.question_round += 1;
                self.tracker.clear_active();
                self.session.phase = Phase::Questions;
                true
            }
            InboundMessage::PlanningComplete { itinerary } => {
                info!(title = ?itinerary.trip_title(), "Planning complete");
                self.itinerary = Some(itinerary);
                self.session.phase = Phase::Result;
                self.tracker.clear_active();
                self.end_run(now);
                true
            }
            InboundMessage::Error { error } => {
                warn!(%error, "Backend reported an error");
                self.session.error = Some(error);
                self.tracker.clear_active();
                self.end_run(now);
                true
            }
            InboundMessage::Ping | InboundMessage::Pong => false,
            InboundMessage::Unknown { kind } => {
                debug!(%kind, "SessionStateMachine::apply: ignoring unknown message");
                false
            }
        }
    }

    fn end_run(&mut self, now: Instant) {
        if let Some(anchor) = self.run_clock.take() {
            self.session.elapsed_seconds = now.saturating_duration_since(anchor).as_secs();
            debug!(elapsed = self.session.elapsed_seconds, "SessionStateMachine::end_run: clock stopped");
        }
    }

    /// Recompute elapsed time; returns true if the value changed
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(anchor) = self.run_clock else {
            return false;
        };
        let elapsed = now.saturating_duration_since(anchor).as_secs();
        if elapsed == self.session.elapsed_seconds {
            return false;
        }
        self.session.elapsed_seconds = elapsed;
        true
    }

    /// Return to the initial state
    pub fn reset(&mut self) {
        debug!("SessionStateMachine::reset: called");
        *self = Self::new(self.min_query_chars);
    }

    /// Hide the error overlay; returns true if one was showing
    pub fn dismiss_error(&mut self) -> bool {
        debug!("SessionStateMachine::dismiss_error: called");
        self.session.error.take().is_some()
    }

    /// The connection (re)opened: clear any outstanding error
    pub fn connection_opened(&mut self) -> bool {
        debug!("SessionStateMachine::connection_opened: called");
        self.session.error.take().is_some()
    }

    /// Compose the view model
    pub fn view(&self, connection: ConnectionStatus) -> SessionView {
        SessionView::compose(
            &self.session,
            connection,
            &self.tracker,
            &self.questions,
            self.question_round,
            self.itinerary.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentStatus, ROSTER};
    use serde_json::{Map, json};

    const QUERY: &str = "Plan a 5-day trip to Rajasthan";

    fn machine() -> SessionStateMachine {
        SessionStateMachine::new(10)
    }

    fn running(now: Instant) -> SessionStateMachine {
        let mut m = machine();
        assert!(m.start_planning(QUERY, true, now).is_accepted());
        m
    }

    fn agent_start(agent: &str) -> InboundMessage {
        InboundMessage::AgentStart {
            agent: agent.to_string(),
            description: None,
        }
    }

    fn agent_complete(agent: &str) -> InboundMessage {
        InboundMessage::AgentComplete {
            agent: agent.to_string(),
            summary: None,
            data: None,
        }
    }

    fn budget_questions() -> InboundMessage {
        InboundMessage::parse(
            r#"{"type":"questions","questions":[{"question_id":"q1","question_text":"Budget?","options":["low","high"]}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_short_query_rejected() {
        let mut m = machine();
        let t = m.start_planning("Plan a trip", true, Instant::now());

        assert_eq!(t.rejected, Some(Rejection::QueryTooShort { min: 10, actual: 9 }));
        assert!(t.commands.is_empty());
        assert_eq!(m.phase(), Phase::Input);
        assert!(m.session().error.is_some());
        assert!(m.session().query.is_empty());
        assert!(!m.is_running());
    }

    #[test]
    fn test_rejected_query_keeps_stored_query() {
        let now = Instant::now();
        let mut m = running(now);

        let t = m.start_planning("too short", true, now);

        assert!(!t.is_accepted());
        assert_eq!(m.session().query, QUERY);
        assert_eq!(m.phase(), Phase::Progress);
        assert!(m.is_running());
    }

    #[test]
    fn test_disconnected_start_rejected_and_requests_connect() {
        let mut m = machine();
        let t = m.start_planning(QUERY, false, Instant::now());

        assert_eq!(t.rejected, Some(Rejection::NotConnected));
        assert_eq!(t.commands, vec![Command::Connect]);
        assert_eq!(m.phase(), Phase::Input);
        assert!(m.session().error.is_some());
    }

    #[test]
    fn test_start_planning_accepted() {
        let mut m = machine();
        m.apply(agent_complete("planner"), Instant::now());
        m.apply(InboundMessage::Error { error: "old".to_string() }, Instant::now());

        let t = m.start_planning(QUERY, true, Instant::now());

        assert_eq!(
            t.commands,
            vec![Command::Send(OutboundMessage::StartPlanning {
                request: QUERY.to_string()
            })]
        );
        assert_eq!(m.phase(), Phase::Progress);
        assert!(m.session().error.is_none());
        assert!(m.session().started_at.is_some());
        assert_eq!(m.tracker().completed_count(), 0);
        assert!(m.is_running());
    }

    #[test]
    fn test_agent_start_then_complete() {
        let now = Instant::now();
        let mut m = running(now);

        assert!(m.apply(agent_start("planner"), now));
        assert_eq!(m.tracker().active().map(|d| d.id), Some("planner"));

        assert!(m.apply(agent_complete("planner"), now));
        assert!(m.tracker().active().is_none());
        assert_eq!(m.tracker().completed_ids(), vec!["planner"]);
        assert!((m.tracker().progress_fraction() - 1.0 / ROSTER.len() as f64).abs() < f64::EPSILON);
    }

    #[test]
    fn test_questions_enter_questions_phase() {
        let now = Instant::now();
        let mut m = running(now);
        m.apply(agent_start("clarification"), now);

        assert!(m.apply(budget_questions(), now));

        assert_eq!(m.phase(), Phase::Questions);
        assert!(m.tracker().active().is_none());
        assert_eq!(m.questions().len(), 1);
        assert_eq!(m.questions()[0].options, vec!["low", "high"]);
        assert!(m.is_running());
    }

    #[test]
    fn test_agent_start_does_not_leave_questions_phase() {
        let now = Instant::now();
        let mut m = running(now);
        m.apply(budget_questions(), now);

        m.apply(agent_start("process_answers"), now);

        assert_eq!(m.phase(), Phase::Questions);
        assert_eq!(m.tracker().status("process_answers"), Some(AgentStatus::Active));
    }

    #[test]
    fn test_agent_start_moves_input_to_progress() {
        let mut m = machine();
        m.apply(agent_start("planner"), Instant::now());
        assert_eq!(m.phase(), Phase::Progress);
    }

    #[test]
    fn test_submit_answers() {
        let now = Instant::now();
        let mut m = running(now);
        m.apply(budget_questions(), now);

        let answers: Answers = [("q1", "low"), ("q2", " ")].into_iter().collect();
        let t = m.submit_answers(&answers, now);

        let expected: Answers = [("q1", "low")].into_iter().collect();
        assert_eq!(
            t.commands,
            vec![Command::Send(OutboundMessage::AnswerQuestions { answers: expected })]
        );
        assert_eq!(m.phase(), Phase::Progress);
    }

    #[test]
    fn test_submit_empty_answers_rejected() {
        let now = Instant::now();
        let mut m = running(now);
        m.apply(budget_questions(), now);

        let t = m.submit_answers(&Answers::new(), now);

        assert_eq!(t.rejected, Some(Rejection::NoAnswers));
        assert!(t.commands.is_empty());
        assert_eq!(m.phase(), Phase::Questions);
        assert!(m.session().error.is_some());
    }

    #[test]
    fn test_questions_may_recur() {
        let now = Instant::now();
        let mut m = running(now);
        let answers: Answers = [("q1", "high")].into_iter().collect();

        for round in 1..=2 {
            m.apply(budget_questions(), now);
            assert_eq!(m.phase(), Phase::Questions);
            assert_eq!(m.question_round(), round);
            assert!(m.submit_answers(&answers, now).is_accepted());
            assert_eq!(m.phase(), Phase::Progress);
        }
    }

    #[test]
    fn test_planning_complete_enters_result_and_stops_clock() {
        let start = Instant::now();
        let mut m = running(start);
        m.apply(agent_start("finalize"), start);

        let mut fields = Map::new();
        fields.insert("trip_title".to_string(), json!("Desert Kingdoms"));
        let done = start + Duration::from_secs(42);
        m.apply(
            InboundMessage::PlanningComplete {
                itinerary: Itinerary::new(fields),
            },
            done,
        );

        assert_eq!(m.phase(), Phase::Result);
        assert!(m.tracker().active().is_none());
        assert_eq!(m.itinerary().and_then(|i| i.trip_title()), Some("Desert Kingdoms"));
        assert!(!m.is_running());
        assert_eq!(m.session().elapsed_seconds, 42);

        assert!(!m.tick(done + Duration::from_secs(10)));
        assert_eq!(m.session().elapsed_seconds, 42);
    }

    #[test]
    fn test_error_is_overlay_not_phase() {
        let now = Instant::now();
        let mut m = running(now);
        m.apply(agent_start("research"), now);
        m.apply(agent_complete("planner"), now);

        m.apply(
            InboundMessage::Error {
                error: "Planning error: upstream timeout".to_string(),
            },
            now,
        );

        assert_eq!(m.phase(), Phase::Progress);
        assert_eq!(m.session().error.as_deref(), Some("Planning error: upstream timeout"));
        assert!(m.tracker().active().is_none());
        assert_eq!(m.tracker().completed_count(), 1);
        assert!(!m.is_running());
    }

    #[test]
    fn test_dismiss_error_only_clears_error() {
        let now = Instant::now();
        let mut m = running(now);
        m.apply(InboundMessage::Error { error: "boom".to_string() }, now);

        assert!(m.dismiss_error());
        assert!(m.session().error.is_none());
        assert_eq!(m.phase(), Phase::Progress);
        assert!(!m.dismiss_error());
    }

    #[test]
    fn test_tick_updates_elapsed_while_running() {
        let start = Instant::now();
        let mut m = running(start);

        assert!(!m.tick(start));
        assert!(m.tick(start + Duration::from_secs(3)));
        assert_eq!(m.session().elapsed_seconds, 3);
        assert!(!m.tick(start + Duration::from_millis(3500)));
    }

    #[test]
    fn test_submit_answers_resumes_stopped_clock() {
        let start = Instant::now();
        let mut m = running(start);
        m.apply(budget_questions(), start);
        m.apply(InboundMessage::Error { error: "hiccup".to_string() }, start + Duration::from_secs(5));
        assert!(!m.is_running());

        let answers: Answers = [("q1", "low")].into_iter().collect();
        let later = start + Duration::from_secs(60);
        m.submit_answers(&answers, later);

        assert!(m.is_running());
        m.tick(later + Duration::from_secs(2));
        assert_eq!(m.session().elapsed_seconds, 7);
    }

    #[test]
    fn test_reset_matches_initial_state() {
        let now = Instant::now();
        let mut m = running(now);
        m.apply(agent_start("planner"), now);
        m.apply(agent_complete("planner"), now);
        m.apply(budget_questions(), now);
        m.apply(InboundMessage::Error { error: "boom".to_string() }, now);

        m.reset();

        let fresh = machine();
        assert_eq!(m.session(), fresh.session());
        assert_eq!(m.question_round(), 0);
        assert_eq!(
            m.view(ConnectionStatus::Connected),
            fresh.view(ConnectionStatus::Connected)
        );
        assert!(!m.is_running());
    }

    #[test]
    fn test_connection_opened_clears_error() {
        let mut m = machine();
        m.start_planning(QUERY, false, Instant::now());
        assert!(m.session().error.is_some());

        assert!(m.connection_opened());
        assert!(m.session().error.is_none());
    }

    #[test]
    fn test_keepalive_and_unknown_change_nothing() {
        let now = Instant::now();
        let mut m = running(now);
        let before = m.view(ConnectionStatus::Connected);

        assert!(!m.apply(InboundMessage::Ping, now));
        assert!(!m.apply(InboundMessage::Pong, now));
        assert!(!m.apply(
            InboundMessage::Unknown {
                kind: "progress_hint".to_string()
            },
            now
        ));
        assert!(!m.apply(InboundMessage::Connected { session_id: None }, now));

        assert_eq!(m.view(ConnectionStatus::Connected), before);
    }
}
