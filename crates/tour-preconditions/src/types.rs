use serde::{Deserialize, Serialize};
use tour_dom::ElementHandle;

/// Outcome of one precondition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreconditionResult {
    pub success: bool,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Block created, reused or selected by the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,

    /// Element the operation left focused or scrolled to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementHandle>,
}

impl PreconditionResult {
    pub fn ok(kind: impl Into<String>, outcome: Applied) -> Self {
        Self {
            success: true,
            kind: kind.into(),
            error: None,
            block_id: outcome.block_id,
            element: outcome.element,
        }
    }

    pub fn failed(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: kind.into(),
            error: Some(error.into()),
            block_id: None,
            element: None,
        }
    }
}

/// Aggregate of a sequential run; failures never stop the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreconditionBatch {
    pub success: bool,
    pub results: Vec<PreconditionResult>,
    #[serde(rename = "failedPreconditions")]
    pub failed: Vec<PreconditionResult>,
    /// Stopped before every precondition ran.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl PreconditionBatch {
    pub fn from_results(results: Vec<PreconditionResult>) -> Self {
        let failed: Vec<PreconditionResult> =
            results.iter().filter(|r| !r.success).cloned().collect();
        Self {
            success: failed.is_empty(),
            results,
            failed,
            cancelled: false,
        }
    }

    pub fn into_cancelled(self) -> Self {
        Self {
            success: false,
            cancelled: true,
            ..self
        }
    }
}

/// What an operation touched, reported back on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    pub block_id: Option<String>,
    pub element: Option<ElementHandle>,
}

impl Applied {
    pub fn nothing() -> Self {
        Self::default()
    }

    pub fn element(element: ElementHandle) -> Self {
        Self {
            block_id: None,
            element: Some(element),
        }
    }

    pub fn block(block_id: impl Into<String>, element: Option<ElementHandle>) -> Self {
        Self {
            block_id: Some(block_id.into()),
            element,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_collects_failures_in_order() {
        let batch = PreconditionBatch::from_results(vec![
            PreconditionResult::ok("openInserter", Applied::nothing()),
            PreconditionResult::failed("frobnicate", "Unknown precondition type: frobnicate"),
            PreconditionResult::failed("selectBlock", "boom"),
        ]);
        assert!(!batch.success);
        assert_eq!(batch.results.len(), 3);
        let kinds: Vec<&str> = batch.failed.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, ["frobnicate", "selectBlock"]);
    }

    #[test]
    fn empty_batch_succeeds() {
        assert!(PreconditionBatch::from_results(Vec::new()).success);
    }

    #[test]
    fn serializes_with_wire_names() {
        let batch = PreconditionBatch::from_results(vec![PreconditionResult::failed(
            "closeModal",
            "nope",
        )]);
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["failedPreconditions"][0]["type"], "closeModal");
        assert!(json["results"][0].get("blockId").is_none());
    }
}
