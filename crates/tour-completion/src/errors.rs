//! Error types for arming completion watchers
//!
//! Only malformed rules are errors. Timeouts and cancellation are reported
//! through [`crate::CompletionOutcome`].

use thiserror::Error;
use tour_dom::DomError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompletionError {
    /// The rule watches an element but none was resolved.
    #[error("{0} completion requires a resolved target")]
    MissingTarget(&'static str),

    #[error("{kind} completion requires the '{param}' parameter")]
    MissingParam { kind: &'static str, param: &'static str },

    #[error("Invalid {kind} completion: {reason}")]
    InvalidParam { kind: &'static str, reason: String },

    #[error("DOM error: {0}")]
    Dom(#[from] DomError),
}

impl CompletionError {
    pub fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        CompletionError::InvalidParam {
            kind,
            reason: reason.into(),
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            CompletionError::MissingTarget(_) => 1,
            _ => 0,
        }
    }
}
