//! Error types for precondition operations

use thiserror::Error;
use tour_dom::DomError;
use tour_editor_state::EditorStoreError;
use tour_locator::LocatorError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PreconditionError {
    #[error("Unknown precondition type: {0}")]
    UnknownType(String),

    #[error("{kind} requires the '{param}' parameter")]
    MissingParam { kind: &'static str, param: &'static str },

    #[error("Invalid parameter for {kind}: {reason}")]
    InvalidParam { kind: &'static str, reason: String },

    /// The condition did not hold before the poll deadline.
    #[error("Timed out after {waited_ms}ms waiting for {condition}")]
    Timeout { condition: String, waited_ms: u64 },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("Editor state error: {0}")]
    Editor(#[from] EditorStoreError),

    /// The run was superseded or its tour ended.
    #[error("Precondition run cancelled")]
    Cancelled,

    #[error("Locator error: {0}")]
    Locator(#[from] LocatorError),
}

impl PreconditionError {
    pub fn timeout(condition: impl Into<String>, waited_ms: u64) -> Self {
        PreconditionError::Timeout {
            condition: condition.into(),
            waited_ms,
        }
    }

    /// Another attempt might succeed once the page settles.
    pub fn is_retryable(&self) -> bool {
        match self {
            PreconditionError::Timeout { .. } | PreconditionError::ElementNotFound(_) => true,
            PreconditionError::Editor(err) => err.is_retryable(),
            PreconditionError::Locator(err) => err.is_retryable(),
            _ => false,
        }
    }
}
