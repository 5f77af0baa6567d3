//! Watcher outcomes and `wpData` comparison operators

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn is_false(value: &bool) -> bool {
    !*value
}

/// How a watch ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub timed_out: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub cancelled: bool,

    /// What satisfied the rule, e.g. `click` or `manual`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl CompletionOutcome {
    pub fn satisfied(event: impl Into<String>) -> Self {
        Self {
            success: true,
            timed_out: false,
            cancelled: false,
            event: Some(event.into()),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            success: false,
            timed_out: true,
            cancelled: false,
            event: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            success: false,
            timed_out: false,
            cancelled: true,
            event: None,
        }
    }
}

/// Comparison applied by `wpData` rules to a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WpDataOperator {
    Equals,
    NotEquals,
    Truthy,
    Falsy,
    Contains,
    GreaterThan,
    LessThan,
    LengthEquals,
    LengthGreaterThan,
}

impl WpDataOperator {
    pub const ALL: [WpDataOperator; 9] = [
        WpDataOperator::Equals,
        WpDataOperator::NotEquals,
        WpDataOperator::Truthy,
        WpDataOperator::Falsy,
        WpDataOperator::Contains,
        WpDataOperator::GreaterThan,
        WpDataOperator::LessThan,
        WpDataOperator::LengthEquals,
        WpDataOperator::LengthGreaterThan,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WpDataOperator::Equals => "equals",
            WpDataOperator::NotEquals => "notEquals",
            WpDataOperator::Truthy => "truthy",
            WpDataOperator::Falsy => "falsy",
            WpDataOperator::Contains => "contains",
            WpDataOperator::GreaterThan => "greaterThan",
            WpDataOperator::LessThan => "lessThan",
            WpDataOperator::LengthEquals => "lengthEquals",
            WpDataOperator::LengthGreaterThan => "lengthGreaterThan",
        }
    }

    pub fn evaluate(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            WpDataOperator::Equals => loosely_equal(actual, expected),
            WpDataOperator::NotEquals => !loosely_equal(actual, expected),
            WpDataOperator::Truthy => is_truthy(actual),
            WpDataOperator::Falsy => !is_truthy(actual),
            WpDataOperator::Contains => match actual {
                Value::String(text) => expected.as_str().map_or(false, |needle| text.contains(needle)),
                Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
                Value::Object(map) => expected.as_str().map_or(false, |key| map.contains_key(key)),
                _ => false,
            },
            WpDataOperator::GreaterThan => compare_numbers(actual, expected, |a, b| a > b),
            WpDataOperator::LessThan => compare_numbers(actual, expected, |a, b| a < b),
            WpDataOperator::LengthEquals => {
                length_of(actual).zip(expected.as_f64()).map_or(false, |(len, want)| len as f64 == want)
            }
            WpDataOperator::LengthGreaterThan => {
                length_of(actual).zip(expected.as_f64()).map_or(false, |(len, want)| len as f64 > want)
            }
        }
    }
}

impl FromStr for WpDataOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WpDataOperator::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("unknown operator '{s}'"))
    }
}

/// JavaScript truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Equality where numbers compare by value (`1` equals `1.0`).
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

fn compare_numbers(actual: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operators_follow_loose_semantics() {
        use WpDataOperator::*;
        assert!(Equals.evaluate(&json!(2), &json!(2.0)));
        assert!(NotEquals.evaluate(&json!("a"), &json!("b")));
        assert!(Truthy.evaluate(&json!([]), &json!(null)));
        assert!(Falsy.evaluate(&json!(""), &json!(null)));
        assert!(Falsy.evaluate(&json!(0), &json!(null)));
        assert!(Contains.evaluate(&json!("core/image"), &json!("image")));
        assert!(Contains.evaluate(&json!(["a", "b"]), &json!("b")));
        assert!(GreaterThan.evaluate(&json!(3), &json!(2)));
        assert!(GreaterThan.evaluate(&json!("10"), &json!(9)));
        assert!(LessThan.evaluate(&json!(1), &json!(2)));
        assert!(!LessThan.evaluate(&json!(null), &json!(2)));
        assert!(LengthEquals.evaluate(&json!([1, 2]), &json!(2)));
        assert!(LengthGreaterThan.evaluate(&json!("abc"), &json!(2)));
        assert!(!LengthGreaterThan.evaluate(&json!(5), &json!(2)));
    }

    #[test]
    fn operator_names_round_trip() {
        for op in WpDataOperator::ALL {
            assert_eq!(op.name().parse::<WpDataOperator>().unwrap(), op);
        }
        assert!("between".parse::<WpDataOperator>().is_err());
    }

    #[test]
    fn outcome_serializes_only_set_flags() {
        let json = serde_json::to_value(CompletionOutcome::satisfied("manual")).unwrap();
        assert_eq!(json, json!({ "success": true, "event": "manual" }));
        let json = serde_json::to_value(CompletionOutcome::cancelled()).unwrap();
        assert_eq!(json, json!({ "success": false, "cancelled": true }));
    }
}
