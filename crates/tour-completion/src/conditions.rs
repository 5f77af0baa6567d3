//! Completion rules parsed from step data

use serde_json::Value;

use tour_dom::{selector, DomPort, ElementHandle};
use tourguide_core_types::{Completion, CompletionType};

use crate::errors::CompletionError;
use crate::types::WpDataOperator;

pub const DEFAULT_DATA_STORE: &str = "core/block-editor";

/// Named query on the editor's data stores plus the comparison to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct WpDataQuery {
    pub store: String,
    pub selector: String,
    pub args: Vec<Value>,
    pub operator: WpDataOperator,
    pub expected: Value,
}

/// A validated completion rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Click on or inside the target, after the grace period.
    ClickTarget { target: ElementHandle },

    /// Target value differs from its value at arm time, or equals `expected`.
    ValueChanged {
        target: ElementHandle,
        attribute: Option<String>,
        expected: Option<String>,
    },

    WpData(WpDataQuery),

    /// Resolved only through `confirm()`.
    Manual,

    /// An element matching `selector` that was not there at arm time.
    ElementAppear { selector: String },

    ElementDisappear { selector: String },

    CustomEvent {
        name: String,
        /// Only events dispatched on or inside a match count; any when `None`.
        target: Option<String>,
    },
}

impl Condition {
    pub fn from_completion(
        completion: &Completion,
        target: Option<ElementHandle>,
    ) -> Result<Self, CompletionError> {
        let kind = completion.kind;
        let needs_target = || target.ok_or(CompletionError::MissingTarget(kind.name()));
        let param = |key: &str| completion.param_str(key).map(str::to_string);

        let condition = match kind {
            CompletionType::ClickTarget => Condition::ClickTarget {
                target: needs_target()?,
            },
            CompletionType::DomValueChanged => Condition::ValueChanged {
                target: needs_target()?,
                attribute: param("attribute"),
                expected: expected_text(&completion.params),
            },
            CompletionType::WpData => Condition::WpData(wp_data_query(completion)?),
            CompletionType::Manual | CompletionType::Unknown => Condition::Manual,
            CompletionType::ElementAppear => Condition::ElementAppear {
                selector: checked_selector(completion, kind)?,
            },
            CompletionType::ElementDisappear => Condition::ElementDisappear {
                selector: checked_selector(completion, kind)?,
            },
            CompletionType::CustomEvent => {
                let name = param("eventName")
                    .or_else(|| param("event"))
                    .ok_or(CompletionError::MissingParam {
                        kind: kind.name(),
                        param: "eventName",
                    })?;
                let target = param("target");
                if let Some(target) = &target {
                    selector::parse(target)?;
                }
                Condition::CustomEvent { name, target }
            }
        };
        Ok(condition)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Condition::ClickTarget { .. } => "clickTarget",
            Condition::ValueChanged { .. } => "domValueChanged",
            Condition::WpData(_) => "wpData",
            Condition::Manual => "manual",
            Condition::ElementAppear { .. } => "elementAppear",
            Condition::ElementDisappear { .. } => "elementDisappear",
            Condition::CustomEvent { .. } => "customEvent",
        }
    }
}

fn checked_selector(
    completion: &Completion,
    kind: CompletionType,
) -> Result<String, CompletionError> {
    let value = completion
        .param_str("selector")
        .ok_or(CompletionError::MissingParam {
            kind: kind.name(),
            param: "selector",
        })?;
    selector::parse(value)?;
    Ok(value.to_string())
}

/// `expected` (or `value`) as text; numbers and booleans are stringified.
fn expected_text(params: &Value) -> Option<String> {
    let value = params.get("expected").or_else(|| params.get("value"))?;
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn wp_data_query(completion: &Completion) -> Result<WpDataQuery, CompletionError> {
    let kind = CompletionType::WpData.name();
    let params = &completion.params;
    let selector = completion
        .param_str("selector")
        .ok_or(CompletionError::MissingParam {
            kind,
            param: "selector",
        })?;
    let operator = match completion.param_str("operator") {
        Some(op) => op
            .parse()
            .map_err(|reason: String| CompletionError::invalid(kind, reason))?,
        None => WpDataOperator::Equals,
    };
    let args = match params.get("args") {
        Some(Value::Array(args)) => args.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single.clone()],
    };

    Ok(WpDataQuery {
        store: completion
            .param_str("store")
            .unwrap_or(DEFAULT_DATA_STORE)
            .to_string(),
        selector: selector.to_string(),
        args,
        operator,
        expected: params
            .get("expected")
            .or_else(|| params.get("value"))
            .cloned()
            .unwrap_or(Value::Null),
    })
}

/// Current observable value of `element`: a named attribute, the checked
/// state, the form value or the text content, in that order.
pub fn observe_value(
    dom: &dyn DomPort,
    element: ElementHandle,
    attribute: Option<&str>,
) -> Option<String> {
    if let Some(attribute) = attribute {
        return dom.attribute(element, attribute);
    }
    if let Some(checked) = dom.checked(element) {
        return Some(checked.to_string());
    }
    if let Some(value) = dom.form_value(element) {
        return Some(value);
    }
    dom.is_connected(element)
        .then(|| dom.text_content(element))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tour_dom::{ElementSpec, MemoryDom, SearchScope};

    #[test]
    fn element_rules_need_a_target() {
        let completion = Completion::new(CompletionType::ClickTarget);
        assert_eq!(
            Condition::from_completion(&completion, None),
            Err(CompletionError::MissingTarget("clickTarget"))
        );
        assert!(Condition::from_completion(&completion, Some(ElementHandle(3))).is_ok());
    }

    #[test]
    fn unknown_rules_become_manual() {
        let completion: Completion =
            serde_json::from_value(json!({ "type": "somethingNew" })).unwrap();
        assert_eq!(
            Condition::from_completion(&completion, None).unwrap(),
            Condition::Manual
        );
    }

    #[test]
    fn wp_data_defaults_and_validation() {
        let completion = Completion::new(CompletionType::WpData)
            .with_params(json!({ "selector": "getBlockCount", "expected": 2 }));
        let Condition::WpData(query) = Condition::from_completion(&completion, None).unwrap() else {
            panic!("expected wpData");
        };
        assert_eq!(query.store, DEFAULT_DATA_STORE);
        assert_eq!(query.operator, WpDataOperator::Equals);
        assert_eq!(query.expected, json!(2));

        let bad = Completion::new(CompletionType::WpData)
            .with_params(json!({ "selector": "getBlockCount", "operator": "between" }));
        assert!(matches!(
            Condition::from_completion(&bad, None),
            Err(CompletionError::InvalidParam { .. })
        ));
    }

    #[test]
    fn selectors_are_checked_when_armed() {
        let completion = Completion::new(CompletionType::ElementAppear)
            .with_params(json!({ "selector": "div[" }));
        assert!(matches!(
            Condition::from_completion(&completion, None),
            Err(CompletionError::Dom(_))
        ));
        let missing = Completion::new(CompletionType::ElementDisappear);
        assert!(matches!(
            Condition::from_completion(&missing, None),
            Err(CompletionError::MissingParam { param: "selector", .. })
        ));
    }

    #[test]
    fn observed_value_prefers_attribute_then_checked_then_value() {
        let dom = MemoryDom::new();
        let body = dom.body(SearchScope::Main);
        let checkbox = dom.append(
            body,
            &ElementSpec::new("input").attr("type", "checkbox").attr("data-state", "off"),
        );
        let field = dom.append(body, &ElementSpec::new("input").value("hello"));
        let heading = dom.append(body, &ElementSpec::new("h2").text("Title"));

        assert_eq!(observe_value(&dom, checkbox, Some("data-state")).as_deref(), Some("off"));
        assert_eq!(observe_value(&dom, checkbox, None).as_deref(), Some("false"));
        assert_eq!(observe_value(&dom, field, None).as_deref(), Some("hello"));
        assert_eq!(observe_value(&dom, heading, None).as_deref(), Some("Title"));
    }
}
