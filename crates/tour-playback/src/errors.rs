//! Error types for tour playback

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("tour has no steps")]
    EmptyTour,

    #[error("no tour is playing")]
    NotPlaying,

    #[error("step {0} is out of range")]
    StepOutOfRange(usize),

    /// A repeated step failed to resolve again; playback was stopped.
    #[error("step {step} could not be resolved after a retry: {reason}")]
    Unrecoverable { step: usize, reason: String },
}

impl PlaybackError {
    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            PlaybackError::NotPlaying | PlaybackError::StepOutOfRange(_) => 0,
            PlaybackError::EmptyTour => 1,
            PlaybackError::Unrecoverable { .. } => 3,
        }
    }
}
