//! Tour and step data model
//!
//! The JSON shape matches what the tour-persistence API stores, so every
//! type here uses camelCase field names on the wire.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{StepId, TourError, TourId};

/// Default locator weight when the stored bundle omits one.
pub const DEFAULT_LOCATOR_WEIGHT: u8 = 50;

/// Locator strategy enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocatorType {
    /// Raw CSS selector
    Css,
    /// `role` or `role:accessible name`
    Role,
    /// `data-testid` value
    TestId,
    /// `data-attr` or `data-attr:value`
    DataAttribute,
    /// Substring of `aria-label`
    AriaLabel,
    /// `container >> inner`
    Contextual,
    /// Block-selector expression (`first`, `type:core/image:1`, `inserted:m1`, ...)
    WpBlock,
    /// Anything this build does not understand; yields no candidates.
    #[serde(other)]
    Unknown,
}

impl LocatorType {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorType::Css => "css",
            LocatorType::Role => "role",
            LocatorType::TestId => "testId",
            LocatorType::DataAttribute => "dataAttribute",
            LocatorType::AriaLabel => "ariaLabel",
            LocatorType::Contextual => "contextual",
            LocatorType::WpBlock => "wpBlock",
            LocatorType::Unknown => "unknown",
        }
    }
}

fn default_weight() -> u8 {
    DEFAULT_LOCATOR_WEIGHT
}

/// One candidate strategy for finding an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(rename = "type")]
    pub kind: LocatorType,

    pub value: String,

    /// 0-100, higher is tried earlier among locators of the same partition.
    #[serde(default = "default_weight")]
    pub weight: u8,

    /// Fallback locators are tried only after every non-fallback one.
    #[serde(default)]
    pub fallback: bool,
}

impl Locator {
    pub fn new(kind: LocatorType, value: impl Into<String>, weight: u8) -> Self {
        Self {
            kind,
            value: value.into(),
            weight: weight.min(100),
            fallback: false,
        }
    }

    pub fn as_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.name(), self.value)?;
        if self.fallback {
            f.write_str(" (fallback)")?;
        }
        Ok(())
    }
}

/// Resolution constraints applied to every locator's candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within_container: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_editor_iframe: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_to_selected_block: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,
}

impl TargetConstraints {
    /// Visibility filtering is on unless explicitly disabled.
    pub fn requires_visible(&self) -> bool {
        self.visible != Some(false)
    }

    pub fn in_editor_iframe(&self) -> bool {
        self.in_editor_iframe == Some(true)
    }

    pub fn scope_to_selected_block(&self) -> bool {
        self.scope_to_selected_block == Some(true)
    }
}

/// A locator bundle plus the constraints identifying one intended element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub locators: Vec<Locator>,

    #[serde(default)]
    pub constraints: TargetConstraints,
}

impl Target {
    pub fn new(locators: Vec<Locator>) -> Self {
        Self {
            locators,
            constraints: TargetConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: TargetConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    /// Resolution try order: non-fallback by weight, then fallback by weight.
    /// Ties keep their stored order.
    pub fn ordered_locators(&self) -> Vec<&Locator> {
        let mut primary: Vec<&Locator> = self.locators.iter().filter(|l| !l.fallback).collect();
        let mut fallback: Vec<&Locator> = self.locators.iter().filter(|l| l.fallback).collect();
        primary.sort_by(|a, b| b.weight.cmp(&a.weight));
        fallback.sort_by(|a, b| b.weight.cmp(&a.weight));
        primary.extend(fallback);
        primary
    }
}

/// The twelve precondition operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreconditionKind {
    EnsureEditor,
    EnsureSidebarOpen,
    EnsureSidebarClosed,
    SelectSidebarTab,
    OpenInserter,
    CloseInserter,
    SelectBlock,
    FocusElement,
    ScrollIntoView,
    OpenModal,
    CloseModal,
    InsertBlock,
}

impl PreconditionKind {
    pub const ALL: [PreconditionKind; 12] = [
        PreconditionKind::EnsureEditor,
        PreconditionKind::EnsureSidebarOpen,
        PreconditionKind::EnsureSidebarClosed,
        PreconditionKind::SelectSidebarTab,
        PreconditionKind::OpenInserter,
        PreconditionKind::CloseInserter,
        PreconditionKind::SelectBlock,
        PreconditionKind::FocusElement,
        PreconditionKind::ScrollIntoView,
        PreconditionKind::OpenModal,
        PreconditionKind::CloseModal,
        PreconditionKind::InsertBlock,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PreconditionKind::EnsureEditor => "ensureEditor",
            PreconditionKind::EnsureSidebarOpen => "ensureSidebarOpen",
            PreconditionKind::EnsureSidebarClosed => "ensureSidebarClosed",
            PreconditionKind::SelectSidebarTab => "selectSidebarTab",
            PreconditionKind::OpenInserter => "openInserter",
            PreconditionKind::CloseInserter => "closeInserter",
            PreconditionKind::SelectBlock => "selectBlock",
            PreconditionKind::FocusElement => "focusElement",
            PreconditionKind::ScrollIntoView => "scrollIntoView",
            PreconditionKind::OpenModal => "openModal",
            PreconditionKind::CloseModal => "closeModal",
            PreconditionKind::InsertBlock => "insertBlock",
        }
    }
}

impl FromStr for PreconditionKind {
    type Err = TourError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PreconditionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| TourError::new(format!("Unknown precondition type: {s}")))
    }
}

/// A UI-state-setting operation run before a step is presented.
///
/// The type is kept as a raw string so an unknown operation survives a
/// round trip and can be reported back by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precondition {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Precondition {
    pub fn new(kind: PreconditionKind, params: Value) -> Self {
        Self {
            kind: kind.name().to_string(),
            params,
        }
    }

    pub fn parsed_kind(&self) -> Result<PreconditionKind, TourError> {
        self.kind.parse()
    }

    /// String parameter lookup, ignoring empty strings.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Completion rule enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionType {
    ClickTarget,
    DomValueChanged,
    WpData,
    Manual,
    ElementAppear,
    ElementDisappear,
    CustomEvent,
    /// Unrecognised rule; watched as `manual`.
    #[serde(other)]
    Unknown,
}

impl CompletionType {
    pub fn name(&self) -> &'static str {
        match self {
            CompletionType::ClickTarget => "clickTarget",
            CompletionType::DomValueChanged => "domValueChanged",
            CompletionType::WpData => "wpData",
            CompletionType::Manual => "manual",
            CompletionType::ElementAppear => "elementAppear",
            CompletionType::ElementDisappear => "elementDisappear",
            CompletionType::CustomEvent => "customEvent",
            CompletionType::Unknown => "unknown",
        }
    }

    /// Rules that can only be watched against a resolved element.
    pub fn needs_target(&self) -> bool {
        matches!(
            self,
            CompletionType::ClickTarget | CompletionType::DomValueChanged
        )
    }
}

/// The condition that marks a step finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(rename = "type")]
    pub kind: CompletionType,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,

    /// Overall timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Completion {
    pub fn new(kind: CompletionType) -> Self {
        Self {
            kind,
            params: Value::Null,
            timeout: None,
        }
    }

    pub fn manual() -> Self {
        Self::new(CompletionType::Manual)
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub id: StepId,

    #[serde(default)]
    pub order: usize,

    #[serde(default)]
    pub title: String,

    /// Instruction HTML shown to the pupil.
    #[serde(default, alias = "instruction")]
    pub content: String,

    #[serde(default)]
    pub target: Target,

    #[serde(default)]
    pub preconditions: Vec<Precondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<Vec<Precondition>>,
}

impl Step {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            order: 0,
            title: title.into(),
            content: String::new(),
            target: Target::default(),
            preconditions: Vec::new(),
            completion: None,
            recovery: None,
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn with_recovery(mut self, recovery: Vec<Precondition>) -> Self {
        self.recovery = Some(recovery);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TourStatus {
    #[default]
    Draft,
    Publish,
    Private,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TourId>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub status: TourStatus,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub post_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_scope: Option<String>,

    /// AI-generated one-off tours are never persisted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ephemeral: bool,
}

impl Tour {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            status: TourStatus::Draft,
            steps: Vec::new(),
            post_types: Vec::new(),
            editor_scope: None,
            ephemeral: false,
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self.reindex();
        self
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn step_index(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|step| &step.id == id)
    }

    /// Re-derive dense 0..n-1 orders from the current array position.
    pub fn reindex(&mut self) {
        for (index, step) in self.steps.iter_mut().enumerate() {
            step.order = index;
        }
    }

    /// Sort by stored order (server payloads may arrive shuffled) then reindex.
    pub fn normalize(&mut self) {
        self.steps.sort_by_key(|step| step.order);
        self.reindex();
    }

    pub fn validate(&self) -> Vec<TourIssue> {
        let mut issues = Vec::new();

        if self.title.trim().is_empty() {
            issues.push(TourIssue::error(None, "Tour title is empty"));
        }
        if self.steps.is_empty() {
            issues.push(TourIssue::warning(None, "Tour has no steps"));
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.order != index {
                issues.push(TourIssue::error(
                    Some(index),
                    format!("Step order {} does not match position {}", step.order, index),
                ));
            }
            if !seen.insert(step.id.clone()) {
                issues.push(TourIssue::error(
                    Some(index),
                    format!("Duplicate step id {}", step.id),
                ));
            }
            if step.title.trim().is_empty() {
                issues.push(TourIssue::warning(Some(index), "Step title is empty"));
            }
            for precondition in step
                .preconditions
                .iter()
                .chain(step.recovery.iter().flatten())
            {
                if precondition.parsed_kind().is_err() {
                    issues.push(TourIssue::warning(
                        Some(index),
                        format!("Unknown precondition type: {}", precondition.kind),
                    ));
                }
            }
            if let Some(completion) = &step.completion {
                if completion.kind == CompletionType::Unknown {
                    issues.push(TourIssue::warning(
                        Some(index),
                        "Unknown completion type; it will be treated as manual",
                    ));
                }
                if completion.kind.needs_target() && step.target.is_empty() {
                    issues.push(TourIssue::error(
                        Some(index),
                        format!("Completion '{}' needs a target", completion.kind.name()),
                    ));
                }
            }
            if step
                .target
                .locators
                .iter()
                .any(|locator| locator.kind == LocatorType::Unknown)
            {
                issues.push(TourIssue::warning(Some(index), "Target has unknown locator types"));
            }
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourIssue {
    pub severity: IssueSeverity,
    pub step: Option<usize>,
    pub message: String,
}

impl TourIssue {
    fn error(step: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            step,
            message: message.into(),
        }
    }

    fn warning(step: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            step,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn locator_defaults_when_weight_missing() {
        let locator: Locator = serde_json::from_value(json!({
            "type": "testId",
            "value": "publish-btn"
        }))
        .unwrap();
        assert_eq!(locator.kind, LocatorType::TestId);
        assert_eq!(locator.weight, DEFAULT_LOCATOR_WEIGHT);
        assert!(!locator.fallback);
    }

    #[test]
    fn unknown_locator_type_deserializes() {
        let locator: Locator =
            serde_json::from_value(json!({"type": "xpath", "value": "//div"})).unwrap();
        assert_eq!(locator.kind, LocatorType::Unknown);
    }

    #[test]
    fn ordered_locators_put_fallbacks_last() {
        let target = Target::new(vec![
            Locator::new(LocatorType::AriaLabel, "Publish", 90).as_fallback(),
            Locator::new(LocatorType::Css, ".publish", 60),
            Locator::new(LocatorType::TestId, "publish", 100),
            Locator::new(LocatorType::Contextual, "header >> button", 50).as_fallback(),
        ]);

        let order: Vec<LocatorType> = target.ordered_locators().iter().map(|l| l.kind).collect();
        assert_eq!(
            order,
            vec![
                LocatorType::TestId,
                LocatorType::Css,
                LocatorType::AriaLabel,
                LocatorType::Contextual
            ]
        );
    }

    #[test]
    fn precondition_kind_round_trips_names() {
        for kind in PreconditionKind::ALL {
            assert_eq!(kind.name().parse::<PreconditionKind>().unwrap(), kind);
        }
        assert!("unknownType".parse::<PreconditionKind>().is_err());
    }

    #[test]
    fn unknown_completion_type_is_kept() {
        let completion: Completion =
            serde_json::from_value(json!({"type": "hover", "timeout": 500})).unwrap();
        assert_eq!(completion.kind, CompletionType::Unknown);
        assert_eq!(completion.timeout, Some(500));
    }

    #[test]
    fn step_accepts_instruction_alias() {
        let step: Step = serde_json::from_value(json!({
            "id": "s1",
            "title": "Publish",
            "instruction": "<p>Click publish</p>"
        }))
        .unwrap();
        assert_eq!(step.content, "<p>Click publish</p>");
        assert_eq!(step.id, StepId::from("s1"));
    }

    #[test]
    fn normalize_sorts_and_densifies() {
        let mut tour = Tour::new("Demo");
        let mut a = Step::new("a");
        a.order = 7;
        let mut b = Step::new("b");
        b.order = 2;
        tour.steps = vec![a, b];
        tour.normalize();
        assert_eq!(tour.steps[0].title, "b");
        assert_eq!(
            tour.steps.iter().map(|s| s.order).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn validate_reports_order_gaps_and_unknown_types() {
        let mut tour = Tour::new("Demo")
            .with_step(Step::new("one").with_precondition(Precondition {
                kind: "teleport".to_string(),
                params: Value::Null,
            }))
            .with_step(Step::new("two"));
        tour.steps[1].order = 5;

        let issues = tour.validate();
        assert!(issues.iter().any(|i| i.is_error() && i.step == Some(1)));
        assert!(issues
            .iter()
            .any(|i| !i.is_error() && i.message.contains("teleport")));
    }

    #[test]
    fn ephemeral_flag_skipped_when_false() {
        let tour = Tour::new("Demo");
        let json = serde_json::to_value(&tour).unwrap();
        assert!(json.get("ephemeral").is_none());
        assert!(json.get("id").is_none());
    }
}
