//! Shared primitives for the tour engine.
//!
//! Everything the capture, resolution, precondition, completion and playback
//! crates exchange lives here: the tour/step data model, identifiers, the
//! playback configuration, the per-tour session state and the bounded poll
//! helper every "wait until" in the engine is built on.

pub mod config;
pub mod model;
pub mod session;
pub mod wait;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use config::PlaybackConfig;
pub use model::*;
pub use session::PlaybackSession;
pub use wait::{poll_for, poll_until};

/// Shared error type for model-level failures.
#[derive(Debug, Error, Clone)]
pub enum TourError {
    #[error("{message}")]
    Message { message: String },

    #[error("step {0} is out of range")]
    StepOutOfRange(usize),

    #[error("unknown step id: {0}")]
    UnknownStep(String),
}

impl TourError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Server-assigned tour identifier. Ephemeral and unsaved tours have none.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TourId(pub u64);

impl fmt::Display for TourId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Who is driving playback.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackMode {
    /// Author previewing their own tour.
    Educator,
    /// Learner following a published tour.
    Pupil,
}

impl PlaybackMode {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackMode::Educator => "educator",
            PlaybackMode::Pupil => "pupil",
        }
    }
}
