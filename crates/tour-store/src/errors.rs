//! Error types for the tour store and its service clients

use thiserror::Error;
use tourguide_core_types::{StepId, TourId};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The service answered with a non-success status.
    #[error("Request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Client configuration error: {0}")]
    Config(String),

    #[error("No tour is being edited")]
    NoTour,

    #[error("Tour {0} not found")]
    TourNotFound(TourId),

    #[error("Generated tours cannot be saved")]
    EphemeralTour,

    #[error("Unknown step: {0}")]
    UnknownStep(StepId),

    #[error("Step position {0} is out of range")]
    StepOutOfRange(usize),

    #[error("Picker is not active")]
    NotPicking,

    #[error("No tour generation to retry")]
    NothingToRetry,
}

impl StoreError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        StoreError::Http {
            status,
            message: message.into(),
        }
    }

    /// Transport failures and server-side errors may succeed when retried by
    /// the user; client mistakes will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            StoreError::NotPicking | StoreError::NothingToRetry => 0,
            StoreError::UnknownStep(_)
            | StoreError::StepOutOfRange(_)
            | StoreError::NoTour
            | StoreError::EphemeralTour => 1,
            StoreError::Http { .. }
            | StoreError::Network(_)
            | StoreError::Decode(_)
            | StoreError::TourNotFound(_) => 2,
            StoreError::Config(_) => 3,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            StoreError::http(status.as_u16(), err.to_string())
        } else {
            StoreError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_failures() {
        assert!(StoreError::Network("reset".into()).is_retryable());
        assert!(StoreError::http(503, "busy").is_retryable());
        assert!(StoreError::http(429, "slow down").is_retryable());
        assert!(!StoreError::http(404, "missing").is_retryable());
        assert!(!StoreError::EphemeralTour.is_retryable());
    }
}
