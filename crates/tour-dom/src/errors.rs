use thiserror::Error;

use crate::port::ElementHandle;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomError {
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("editor frame document is not available")]
    FrameUnavailable,

    #[error("element {0} is no longer attached")]
    StaleElement(ElementHandle),

    #[error("element {0} cannot receive focus")]
    NotFocusable(ElementHandle),
}

impl DomError {
    pub fn invalid_selector(selector: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}
