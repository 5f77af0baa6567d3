//! Request/response bodies for the tour and drafting services, plus the
//! authoring state snapshot

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tour_locator::ElementContext;
use tourguide_core_types::{Completion, StepId, TourId};

/// Body of `POST /ai/generate-draft`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRequest {
    pub element_context: ElementContext,
    pub post_type: String,
}

/// Suggested step fields; anything missing leaves the step as it was.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "instruction")]
    pub content: Option<String>,
    #[serde(default)]
    pub completion: Option<Completion>,
}

/// Body of `POST /ai/generate-tour`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiTourRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub post_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_context: Option<Value>,
    /// Why the previous generated tour failed, so the next one can adapt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_context: Option<Value>,
}

impl AiTourRequest {
    pub fn for_task(task_id: impl Into<String>, post_type: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            post_type: post_type.into(),
            ..Self::default()
        }
    }

    pub fn for_query(query: impl Into<String>, post_type: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            post_type: post_type.into(),
            ..Self::default()
        }
    }
}

/// Entry of the predefined task catalog (`GET /ai/tasks`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiTask {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub post_types: Vec<String>,
}

/// Authoring and generation state read by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    pub tour_id: Option<TourId>,
    pub step_count: usize,
    pub is_dirty: bool,
    pub is_saving: bool,
    pub is_picker_active: bool,
    pub picking_step_id: Option<StepId>,
    pub drafting_step_id: Option<StepId>,
    pub is_generating: bool,
    pub ai_tour_error: Option<String>,
    pub last_failure_context: Option<Value>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tour_request_omits_unset_fields() {
        let request = AiTourRequest::for_task("add-image", "post");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "taskId": "add-image", "postType": "post" })
        );
    }

    #[test]
    fn draft_accepts_instruction_alias() {
        let draft: StepDraft =
            serde_json::from_value(json!({ "title": "Publish", "instruction": "Click it" })).unwrap();
        assert_eq!(draft.content.as_deref(), Some("Click it"));
        assert_eq!(draft.completion, None);
    }
}
