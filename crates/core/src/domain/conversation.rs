use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::estimate::EstimateResult;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to an uploaded image. The core never inspects pixel data;
/// references are carried so a richer analyzer can be swapped in later.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef(pub String);

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A single extracted project attribute. Numeric fields (square footage) are
/// kept as numbers so validation does not have to re-parse display strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Full state of one conversation. Created on first contact, mutated only by
/// workflow nodes, destroyed only by explicit session deletion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: SessionId,
    /// Append-only transcript; never shrinks, not even on reset.
    pub history: Vec<HistoryEntry>,
    pub extracted_fields: BTreeMap<String, FieldValue>,
    pub service_type: Option<String>,
    pub final_estimate: Option<EstimateResult>,
    pub pending_question_field: Option<String>,
    pub image_refs: Vec<ImageRef>,
}

impl ConversationState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            history: Vec::new(),
            extracted_fields: BTreeMap::new(),
            service_type: None,
            final_estimate: None,
            pending_question_field: None,
            image_refs: Vec::new(),
        }
    }

    pub fn push_history(&mut self, role: Role, text: impl Into<String>) {
        self.history.push(HistoryEntry { role, text: text.into(), timestamp: Utc::now() });
    }

    /// Whether a required field already has a usable value. `service_type` is
    /// tracked on the state itself rather than in the field map.
    pub fn has_field(&self, field: &str) -> bool {
        if field == "service_type" {
            return self.service_type.is_some();
        }
        self.extracted_fields.contains_key(field)
    }

    /// Clears everything completion-derived while preserving the session id,
    /// the transcript, and previously uploaded image references.
    pub fn reset_completion(&mut self) {
        self.extracted_fields.clear();
        self.service_type = None;
        self.final_estimate = None;
        self.pending_question_field = None;
    }
}
