use thiserror::Error;

use crate::domain::conversation::SessionId;

/// Failures raised by the estimation calculator. All variants are recoverable:
/// the workflow reacts by evicting the offending value and asking a clarifying
/// question instead of surfacing the error to the user.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EstimateError {
    #[error("invalid or missing value for `{field}`")]
    Validation { field: String },
}

impl EstimateError {
    pub fn validation(field: impl Into<String>) -> Self {
        Self::Validation { field: field.into() }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Validation { field } => field,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("execution limit exceeded after {visited} nodes in session {session_id}")]
    ExecutionLimitExceeded { session_id: SessionId, visited: usize },
}

impl WorkflowError {
    /// The text shown to the end user. Internal error detail never crosses
    /// this boundary.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => {
                "I couldn't find that conversation. Please start a new session."
            }
            Self::ExecutionLimitExceeded { .. } => {
                "Something went wrong on our side. Your earlier answers are safe; please try again."
            }
        }
    }
}

/// The extraction or image-analysis collaborator failed or timed out. The
/// workflow recovers locally by continuing the turn with an empty result.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("extraction collaborator unavailable: {reason}")]
pub struct ExtractionUnavailable {
    pub reason: String,
}

impl ExtractionUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::conversation::SessionId;
    use crate::errors::WorkflowError;

    #[test]
    fn session_not_found_has_user_safe_message() {
        let error = WorkflowError::SessionNotFound(SessionId("sess-1".to_string()));
        assert!(error.user_message().contains("start a new session"));
        assert!(!error.user_message().contains("sess-1"));
    }

    #[test]
    fn execution_limit_message_hides_internal_detail() {
        let error = WorkflowError::ExecutionLimitExceeded {
            session_id: SessionId("sess-2".to_string()),
            visited: 251,
        };
        assert!(!error.user_message().contains("251"));
        assert!(!error.user_message().to_lowercase().contains("limit"));
    }
}
