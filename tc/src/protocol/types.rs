//! Payload value types carried by protocol messages

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A clarification question produced by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    /// Backend category (origin_city, dietary, travel_pace, ...)
    pub question_type: Option<String>,
    /// Fixed choices; empty for free-text questions
    pub options: Vec<String>,
    pub required: bool,
    pub allow_multiple: bool,
}

impl Question {
    /// Map a user reply onto this question
    ///
    /// A 1-based number selects the matching option; anything else is kept as
    /// free text. Multi-select questions take a comma-separated list, resolved
    /// item by item.
    pub fn resolve_reply(&self, reply: &str) -> String {
        let reply = reply.trim();
        if !self.allow_multiple {
            return self.resolve_choice(reply);
        }
        reply
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| self.resolve_choice(part))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn resolve_choice(&self, choice: &str) -> String {
        match choice.parse::<usize>() {
            Ok(n) if n >= 1 && n <= self.options.len() => self.options[n - 1].clone(),
            _ => choice.to_string(),
        }
    }
}

/// User answers keyed by question id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answers(BTreeMap<String, String>);

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, question_id: impl Into<String>, answer: impl Into<String>) {
        self.0.insert(question_id.into(), answer.into());
    }

    pub fn get(&self, question_id: &str) -> Option<&str> {
        self.0.get(question_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Only the answers with non-blank text
    pub fn answered(&self) -> Answers {
        Answers(
            self.0
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| (k.clone(), v.trim().to_string()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Answers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Answers(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Final itinerary delivered on success
///
/// Opaque to the session core: only the shape "JSON object" is enforced. The
/// accessors exist for summary rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Itinerary(Map<String, Value>);

impl Itinerary {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn trip_title(&self) -> Option<&str> {
        self.0.get("trip_title").and_then(Value::as_str)
    }

    pub fn total_days(&self) -> Option<u64> {
        self.0.get("total_days").and_then(Value::as_u64)
    }

    pub fn cities_visited(&self) -> Vec<&str> {
        self.0
            .get("cities_visited")
            .and_then(Value::as_array)
            .map(|cities| cities.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn total_estimated_cost_usd(&self) -> Option<f64> {
        self.0.get("total_estimated_cost_usd").and_then(Value::as_f64)
    }
}
