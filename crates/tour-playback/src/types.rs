//! Presentation-facing playback state and events

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tour_dom::ElementHandle;
use tour_preconditions::PreconditionResult;
use tourguide_core_types::{PlaybackMode, TourId};

/// Where the current step is in its setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepPhase {
    #[default]
    Idle,
    ApplyingPreconditions,
    ResolvingTarget,
    AwaitingCompletion,
    Advancing,
    TourEnded,
}

/// Why a step is being (re)entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepEntry {
    Start,
    Advance,
    Previous,
    Repeat,
    Skip,
    Jump,
}

/// Snapshot read by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub tour_id: Option<TourId>,
    pub tour_title: Option<String>,
    pub step_count: usize,
    pub current_step_index: Option<usize>,
    pub mode: Option<PlaybackMode>,
    pub phase: StepPhase,
    pub completion_satisfied: bool,
    pub resolved_element: Option<ElementHandle>,
    /// Locator that produced `resolved_element`, as `type:value`.
    pub resolved_locator: Option<String>,
    pub resolution_attempts: u32,
    pub repeat_count: u32,
    pub resolution_error: Option<String>,
    pub is_applying_preconditions: bool,
    pub failed_preconditions: Vec<PreconditionResult>,
    pub skipped_steps: Vec<usize>,
    #[serde(rename = "aiTourError")]
    pub tour_error: Option<String>,
    pub last_failure_context: Option<Value>,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.current_step_index.is_some() && self.phase != StepPhase::TourEnded
    }

    /// Per-step fields back to their pre-setup values.
    pub(crate) fn reset_step(&mut self, index: usize) {
        self.current_step_index = Some(index);
        self.completion_satisfied = false;
        self.resolved_element = None;
        self.resolved_locator = None;
        self.resolution_error = None;
        self.failed_preconditions.clear();
    }
}

/// Details of a fatal step failure, handed to tour regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureContext {
    pub step_index: usize,
    pub step_title: String,
    pub error: String,
    /// Locators tried, as `type:value`.
    pub locators: Vec<String>,
    pub failed_preconditions: Vec<String>,
}

/// Result of waiting for the next step's block to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookAhead {
    /// A wait was needed because the block was not there yet.
    pub waited: bool,
    pub block_type: Option<String>,
    pub success: bool,
}

impl LookAhead {
    pub fn not_needed(block_type: Option<String>) -> Self {
        Self {
            waited: false,
            block_type,
            success: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    TourStarted {
        step_count: usize,
    },
    StepEntered {
        index: usize,
        entry: StepEntry,
    },
    PreconditionsApplied {
        index: usize,
        success: bool,
        failed: usize,
    },
    StepResolved {
        index: usize,
        element: ElementHandle,
        locator: String,
        recovered: bool,
    },
    StepFailed {
        index: usize,
        error: String,
    },
    WatchingCompletion {
        index: usize,
        rule: String,
    },
    StepCompleted {
        index: usize,
        event: Option<String>,
    },
    LookedAhead {
        index: usize,
        result: LookAhead,
    },
    StepSkipped {
        index: usize,
    },
    TourEnded {
        completed: bool,
    },
    TourError {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_uses_presentation_names() {
        let state = PlaybackState {
            tour_error: Some("boom".into()),
            is_applying_preconditions: true,
            ..PlaybackState::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["aiTourError"], "boom");
        assert_eq!(json["isApplyingPreconditions"], true);
        assert_eq!(json["resolutionError"], json!(null));
        assert!(!state.is_playing());
    }

    #[test]
    fn events_are_tagged() {
        let event = PlaybackEvent::StepCompleted {
            index: 2,
            event: Some("click".into()),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "stepCompleted", "index": 2, "event": "click" })
        );
    }
}
