//! Read-only view model for rendering layers

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::{Phase, Session};
use crate::agents::{AgentProgressTracker, AgentRow};
use crate::connection::ConnectionStatus;
use crate::protocol::{Itinerary, Question};

/// Everything a renderer needs, derived from the current state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub phase: Phase,
    pub query: String,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub connection: ConnectionStatus,
    pub agents: Vec<AgentRow>,
    pub active_agent: Option<String>,
    pub activity: Option<String>,
    pub completed: usize,
    pub roster_size: usize,
    pub progress: f64,
    pub questions: Vec<Question>,
    /// Bumped for every question set, so repeats are distinguishable
    pub question_round: u32,
    pub itinerary: Option<Itinerary>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self::compose(
            &Session::default(),
            ConnectionStatus::Disconnected,
            &AgentProgressTracker::new(),
            &[],
            0,
            None,
        )
    }
}

impl SessionView {
    pub(crate) fn compose(
        session: &Session,
        connection: ConnectionStatus,
        tracker: &AgentProgressTracker,
        questions: &[Question],
        question_round: u32,
        itinerary: Option<&Itinerary>,
    ) -> Self {
        Self {
            phase: session.phase,
            query: session.query.clone(),
            error: session.error.clone(),
            started_at: session.started_at,
            elapsed_seconds: session.elapsed_seconds,
            connection,
            agents: tracker.rows(),
            active_agent: tracker.active().map(|d| d.id.to_string()),
            activity: tracker.activity().map(str::to_string),
            completed: tracker.completed_count(),
            roster_size: tracker.roster().len(),
            progress: tracker.progress_fraction(),
            questions: questions.to_vec(),
            question_round,
            itinerary: itinerary.cloned(),
        }
    }

    /// Progress as a whole percentage
    pub fn percent(&self) -> u8 {
        (self.progress * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Elapsed time as `m:ss`
    pub fn elapsed_display(&self) -> String {
        format!("{}:{:02}", self.elapsed_seconds / 60, self.elapsed_seconds % 60)
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionStatus::Connected
    }

    /// True if a question set newer than `answered_round` is showing
    pub fn awaiting_answers(&self, answered_round: u32) -> bool {
        self.phase == Phase::Questions && self.question_round > answered_round
    }
}
