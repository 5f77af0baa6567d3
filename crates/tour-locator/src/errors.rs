//! Error types for locator capture and resolution

use thiserror::Error;
use tour_dom::DomError;
use tour_editor_state::EditorStoreError;

pub const NO_MATCH_MESSAGE: &str = "No matching element found";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocatorError {
    /// Every locator came back empty after filtering.
    #[error("No matching element found")]
    NoMatch,

    /// The target lives in the editor frame and the frame is not reachable.
    #[error("Editor iframe not available: {0}")]
    FrameUnavailable(String),

    #[error("Invalid {kind} locator '{value}': {reason}")]
    InvalidLocator {
        kind: String,
        value: String,
        reason: String,
    },

    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("Editor state error: {0}")]
    Editor(#[from] EditorStoreError),
}

impl LocatorError {
    pub fn invalid(kind: &str, value: &str, reason: impl Into<String>) -> Self {
        LocatorError::InvalidLocator {
            kind: kind.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Worth a recovery pass: the page may still be catching up.
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::NoMatch | LocatorError::FrameUnavailable(_) => true,
            LocatorError::Editor(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::NoMatch => 1,
            LocatorError::FrameUnavailable(_) | LocatorError::Editor(_) => 2,
            LocatorError::InvalidLocator { .. } | LocatorError::Dom(_) => 0,
        }
    }
}
