//! Terminal rendering of session views

use std::collections::HashSet;

use colored::Colorize;

use crate::agents::{AgentDescriptor, AgentStatus};
use crate::protocol::{Itinerary, Question};
use crate::session::SessionView;

/// Turns a stream of views into progress lines, printing each change once
#[derive(Debug, Default)]
pub struct ProgressPrinter {
    active: Option<String>,
    completed: HashSet<String>,
    connection_lost: bool,
}

impl ProgressPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines describing what changed since the previous view
    pub fn update(&mut self, view: &SessionView) -> Vec<String> {
        let mut lines = Vec::new();

        if !view.is_connected() && !self.connection_lost && view.started_at.is_some() {
            lines.push(format!("  {} connection {}", "!".yellow(), view.connection.display_name()));
            self.connection_lost = true;
        } else if view.is_connected() {
            self.connection_lost = false;
        }

        for row in &view.agents {
            if row.status != AgentStatus::Complete || !self.completed.insert(row.descriptor.id.to_string()) {
                continue;
            }
            let summary = row
                .payload
                .as_ref()
                .and_then(|p| p.summary.as_deref())
                .unwrap_or("done");
            lines.push(format!(
                "  {} {:<24} {} {}",
                "✔".green(),
                row.descriptor.name,
                summary.dimmed(),
                format!("[{:>3}%]", view.percent()).cyan()
            ));
        }

        if view.active_agent != self.active {
            if let Some(id) = &view.active_agent
                && let Some(row) = view.agents.iter().find(|r| r.descriptor.id == id)
            {
                let activity = view.activity.as_deref().unwrap_or(row.descriptor.description);
                lines.push(format!(
                    "  {} {:<24} {}",
                    row.descriptor.icon,
                    row.descriptor.name.bold(),
                    activity.dimmed()
                ));
            }
            self.active = view.active_agent.clone();
        }

        lines
    }
}

/// Question text with numbered options
pub fn question_lines(question: &Question) -> Vec<String> {
    let mut lines = vec![question.text.bold().to_string()];
    for (i, option) in question.options.iter().enumerate() {
        lines.push(format!("  {}) {}", i + 1, option));
    }
    if question.allow_multiple && !question.options.is_empty() {
        lines.push("  (several allowed, separate with commas)".dimmed().to_string());
    }
    lines
}

/// Summary printed once an itinerary arrives
pub fn itinerary_lines(itinerary: &Itinerary, elapsed: &str) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {}",
        "Itinerary ready:".green().bold(),
        itinerary.trip_title().unwrap_or("Your trip")
    )];
    if let Some(days) = itinerary.total_days() {
        lines.push(format!("  Days:   {}", days));
    }
    let cities = itinerary.cities_visited();
    if !cities.is_empty() {
        lines.push(format!("  Cities: {}", cities.join(" → ")));
    }
    if let Some(cost) = itinerary.total_estimated_cost_usd() {
        lines.push(format!("  Cost:   ${:.0} (estimated)", cost));
    }
    lines.push(format!("  Planned in {}", elapsed).dimmed().to_string());
    lines
}

/// One line per roster agent
pub fn roster_lines(roster: &[AgentDescriptor]) -> Vec<String> {
    roster
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{:>2}. {} {:<24} {}", i + 1, d.icon, d.name.bold(), d.description.dimmed()))
        .collect()
}
