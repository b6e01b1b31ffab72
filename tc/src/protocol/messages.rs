//! Inbound and outbound message types
//!
//! Inbound frames are decoded in two steps: the `type` tag is read from the raw
//! JSON first, so unknown tags can be ignored without failing, then known tags
//! are decoded into their typed payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::types::{Answers, Itinerary, Question};

/// Inbound `type` tags this client understands
pub const INBOUND_TYPES: &[&str] = &[
    "connected",
    "agent_start",
    "agent_complete",
    "questions",
    "planning_complete",
    "error",
    "ping",
    "pong",
];

/// Errors decoding an inbound frame
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Frame has no string 'type' field")]
    MissingType,

    #[error("Malformed '{kind}' payload: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Messages received from the planning backend
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Handshake acknowledgement
    Connected { session_id: Option<String> },

    /// An agent began working
    AgentStart {
        agent: String,
        description: Option<String>,
    },

    /// An agent finished, optionally reporting a payload
    AgentComplete {
        agent: String,
        summary: Option<String>,
        data: Option<Value>,
    },

    /// The backend needs clarification before continuing
    Questions { questions: Vec<Question> },

    /// The run produced an itinerary
    PlanningComplete { itinerary: Itinerary },

    /// The run failed
    Error { error: String },

    Ping,
    Pong,

    /// A tag this client does not know; ignored
    Unknown { kind: String },
}

impl InboundMessage {
    /// Decode a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::NotJson)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !INBOUND_TYPES.contains(&kind.as_str()) {
            debug!(%kind, "InboundMessage::from_value: unknown type");
            return Ok(Self::Unknown { kind });
        }

        let wire: WireInbound =
            serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { kind, source })?;
        Ok(wire.into())
    }

    /// The wire tag of this message
    pub fn kind(&self) -> &str {
        match self {
            Self::Connected { .. } => "connected",
            Self::AgentStart { .. } => "agent_start",
            Self::AgentComplete { .. } => "agent_complete",
            Self::Questions { .. } => "questions",
            Self::PlanningComplete { .. } => "planning_complete",
            Self::Error { .. } => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Unknown { kind } => kind,
        }
    }

    /// Keepalive traffic carries no session semantics
    pub fn is_keepalive(&self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }
}

/// A question as the backend sends it
#[derive(Debug, Clone, Deserialize)]
pub struct WireQuestion {
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(alias = "question")]
    pub question_text: String,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub allow_multiple: bool,
}

fn default_required() -> bool {
    true
}

impl WireQuestion {
    /// Normalize into a `Question`, falling back to a positional id
    pub fn into_question(self, index: usize) -> Question {
        Question {
            id: self
                .question_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("q{}", index)),
            text: self.question_text,
            question_type: self.question_type,
            options: self.options.unwrap_or_default(),
            required: self.required,
            allow_multiple: self.allow_multiple,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireInbound {
    Connected {
        #[serde(default)]
        session_id: Option<String>,
    },
    AgentStart {
        agent: String,
        #[serde(default)]
        description: Option<String>,
    },
    AgentComplete {
        agent: String,
        #[serde(default)]
        summary: Option<String>,
        #[serde(default)]
        data: Option<Value>,
    },
    Questions {
        questions: Vec<WireQuestion>,
    },
    PlanningComplete {
        itinerary: Map<String, Value>,
    },
    Error {
        error: String,
    },
    Ping,
    Pong,
}

impl From<WireInbound> for InboundMessage {
    fn from(wire: WireInbound) -> Self {
        match wire {
            WireInbound::Connected { session_id } => Self::Connected { session_id },
            WireInbound::AgentStart { agent, description } => Self::AgentStart { agent, description },
            WireInbound::AgentComplete { agent, summary, data } => Self::AgentComplete {
                agent,
                summary,
                data: data.filter(|d| !d.is_null()),
            },
            WireInbound::Questions { questions } => Self::Questions {
                questions: questions
                    .into_iter()
                    .enumerate()
                    .map(|(i, q)| q.into_question(i))
                    .collect(),
            },
            WireInbound::PlanningComplete { itinerary } => Self::PlanningComplete {
                itinerary: Itinerary::new(itinerary),
            },
            WireInbound::Error { error } => Self::Error { error },
            WireInbound::Ping => Self::Ping,
            WireInbound::Pong => Self::Pong,
        }
    }
}

/// Messages sent to the planning backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Begin a planning run
    StartPlanning { request: String },

    /// Reply to clarification questions
    AnswerQuestions { answers: Answers },

    /// Keepalive
    Ping,
}

impl OutboundMessage {
    /// Serialize into a text frame
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartPlanning { .. } => "start_planning",
            Self::AnswerQuestions { .. } => "answer_questions",
            Self::Ping => "ping",
        }
    }
}
