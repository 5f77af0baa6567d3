//! Tour playback
//!
//! [`TourPlayer`] walks a tour step by step: it applies each step's
//! preconditions, resolves and highlights the target (with one recovery
//! retry), arms the completion rule and advances when it is satisfied,
//! after giving the next step's block a bounded chance to appear.
//! Presentation layers read [`PlaybackState`] snapshots or follow
//! [`PlaybackEvent`]s.

pub mod errors;
pub mod lookahead;
pub mod player;
mod recovery;
pub mod types;

pub use errors::PlaybackError;
pub use lookahead::wait_for_next_step_block;
pub use player::TourPlayer;
pub use types::{FailureContext, LookAhead, PlaybackEvent, PlaybackState, StepEntry, StepPhase};
