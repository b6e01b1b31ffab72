//! Static agent roster
//!
//! The fixed, ordered set of backend agents expected in one planning run,
//! with the display metadata the rendering layer needs.

use serde::Serialize;

/// Display descriptor for one backend agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    /// Accent color as a hex string
    pub color: &'static str,
}

/// All agents, in backend execution order
pub const ROSTER: &[AgentDescriptor] = &[
    AgentDescriptor {
        id: "clarification",
        name: "Clarification Agent",
        description: "Understanding your travel preferences...",
        icon: "❓",
        color: "#8b5cf6",
    },
    AgentDescriptor {
        id: "process_answers",
        name: "Processing Answers",
        description: "Analyzing your responses...",
        icon: "📝",
        color: "#a855f7",
    },
    AgentDescriptor {
        id: "planner",
        name: "Trip Planner",
        description: "Designing your perfect itinerary...",
        icon: "🗺",
        color: "#3b82f6",
    },
    AgentDescriptor {
        id: "geography",
        name: "Geography Expert",
        description: "Optimizing your travel route...",
        icon: "🧭",
        color: "#06b6d4",
    },
    AgentDescriptor {
        id: "research",
        name: "Destination Researcher",
        description: "Discovering the best attractions...",
        icon: "🔍",
        color: "#10b981",
    },
    AgentDescriptor {
        id: "food_culture",
        name: "Food & Culture Guide",
        description: "Finding local cuisine and cultural insights...",
        icon: "🍜",
        color: "#f59e0b",
    },
    AgentDescriptor {
        id: "transport_scraper",
        name: "Transport Price Finder",
        description: "Searching for real-time transport prices...",
        icon: "🚆",
        color: "#ef4444",
    },
    AgentDescriptor {
        id: "transport_budget",
        name: "Budget Calculator",
        description: "Calculating your trip budget...",
        icon: "💰",
        color: "#84cc16",
    },
    AgentDescriptor {
        id: "critic",
        name: "Plan Reviewer",
        description: "Reviewing and validating your plan...",
        icon: "✅",
        color: "#ec4899",
    },
    AgentDescriptor {
        id: "finalize",
        name: "Finalizing",
        description: "Assembling your complete itinerary...",
        icon: "✨",
        color: "#14b8a6",
    },
];

/// Look up a descriptor by agent id
pub fn descriptor(id: &str) -> Option<&'static AgentDescriptor> {
    ROSTER.iter().find(|d| d.id == id)
}

/// Position of an agent in the roster
pub fn position(id: &str) -> Option<usize> {
    ROSTER.iter().position(|d| d.id == id)
}
