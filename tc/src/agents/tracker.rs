//! Agent progress tracking
//!
//! Aggregates backend agent lifecycle events into one consistent progress
//! view over the static roster. At most one agent is active at a time and the
//! completed set only grows until `clear`.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::roster::{AgentDescriptor, ROSTER};

/// Runtime status of a roster agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Pending,
    Active,
    Complete,
}

/// Data reported by an agent on completion
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentPayload {
    /// Human-readable outcome ("Found 12 attractions")
    pub summary: Option<String>,
    /// Structured sub-status (counts, partial totals)
    pub data: Option<Value>,
}

impl AgentPayload {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.data.is_none()
    }
}

/// Tracks active/completed status and payloads for the roster
#[derive(Debug, Clone)]
pub struct AgentProgressTracker {
    roster: &'static [AgentDescriptor],
    /// Roster index of the active agent
    active: Option<usize>,
    /// Activity text sent with the latest agent_start
    activity: Option<String>,
    completed: BTreeSet<usize>,
    payloads: HashMap<usize, AgentPayload>,
}

impl Default for AgentProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentProgressTracker {
    /// Tracker over the built-in roster
    pub fn new() -> Self {
        Self::with_roster(ROSTER)
    }

    /// Tracker over a custom roster
    pub fn with_roster(roster: &'static [AgentDescriptor]) -> Self {
        debug!(roster_size = roster.len(), "AgentProgressTracker::with_roster: called");
        Self {
            roster,
            active: None,
            activity: None,
            completed: BTreeSet::new(),
            payloads: HashMap::new(),
        }
    }

    pub fn roster(&self) -> &'static [AgentDescriptor] {
        self.roster
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.roster.iter().position(|d| d.id == id)
    }

    /// Mark an agent active, superseding any previously active agent
    ///
    /// Returns false (and changes nothing) for ids outside the roster.
    pub fn mark_active(&mut self, id: &str, activity: Option<String>) -> bool {
        debug!(%id, "AgentProgressTracker::mark_active: called");
        let Some(index) = self.index_of(id) else {
            debug!(%id, "AgentProgressTracker::mark_active: not in roster, ignoring");
            return false;
        };
        self.active = Some(index);
        self.activity = activity;
        true
    }

    /// Mark an agent complete and record its payload
    ///
    /// Completing an already-complete agent leaves the completed set as is; a
    /// non-empty payload still replaces the stored one (last write wins).
    /// Returns false (and changes nothing) for ids outside the roster.
    pub fn mark_complete(&mut self, id: &str, payload: AgentPayload) -> bool {
        debug!(%id, "AgentProgressTracker::mark_complete: called");
        let Some(index) = self.index_of(id) else {
            debug!(%id, "AgentProgressTracker::mark_complete: not in roster, ignoring");
            return false;
        };

        if !self.completed.insert(index) {
            debug!(%id, "AgentProgressTracker::mark_complete: already complete");
        }
        if !payload.is_empty() {
            self.payloads.insert(index, payload);
        }
        if self.active == Some(index) {
            self.active = None;
            self.activity = None;
        }
        true
    }

    /// Clear the active agent without completing it
    pub fn clear_active(&mut self) {
        debug!("AgentProgressTracker::clear_active: called");
        self.active = None;
        self.activity = None;
    }

    /// Forget all runtime status
    pub fn clear(&mut self) {
        debug!("AgentProgressTracker::clear: called");
        self.active = None;
        self.activity = None;
        self.completed.clear();
        self.payloads.clear();
    }

    pub fn active(&self) -> Option<&'static AgentDescriptor> {
        self.active.map(|i| &self.roster[i])
    }

    pub fn activity(&self) -> Option<&str> {
        self.activity.as_deref()
    }

    pub fn status(&self, id: &str) -> Option<AgentStatus> {
        self.index_of(id).map(|i| self.status_at(i))
    }

    fn status_at(&self, index: usize) -> AgentStatus {
        if self.active == Some(index) {
            AgentStatus::Active
        } else if self.completed.contains(&index) {
            AgentStatus::Complete
        } else {
            AgentStatus::Pending
        }
    }

    pub fn is_complete(&self, id: &str) -> bool {
        self.index_of(id).is_some_and(|i| self.completed.contains(&i))
    }

    pub fn payload(&self, id: &str) -> Option<&AgentPayload> {
        self.index_of(id).and_then(|i| self.payloads.get(&i))
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Completed ids in roster order
    pub fn completed_ids(&self) -> Vec<&'static str> {
        self.completed.iter().map(|&i| self.roster[i].id).collect()
    }

    /// Fraction of the roster completed, in [0, 1]
    pub fn progress_fraction(&self) -> f64 {
        if self.roster.is_empty() {
            return 0.0;
        }
        self.completed.len() as f64 / self.roster.len() as f64
    }

    /// Per-agent rows in roster order
    pub fn rows(&self) -> Vec<AgentRow> {
        self.roster
            .iter()
            .enumerate()
            .map(|(i, descriptor)| AgentRow {
                descriptor: *descriptor,
                status: self.status_at(i),
                payload: self.payloads.get(&i).cloned(),
            })
            .collect()
    }
}

/// One roster agent with its runtime status, for the view model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRow {
    #[serde(flatten)]
    pub descriptor: AgentDescriptor,
    pub status: AgentStatus,
    pub payload: Option<AgentPayload>,
}
