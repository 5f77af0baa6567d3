//! Compact element summaries for the drafting service
//!
//! Only structural hints leave the page: no form values, no attribute values
//! other than a short list of `data-*` markers, and text trimmed to a few
//! hundred characters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tour_dom::{closest, DomPort, ElementHandle, SearchScope};

use crate::aria::{accessible_name, collapse_whitespace, element_role};
use crate::capture::{data_attributes, stable_classes};

const MAX_TEXT_CHARS: usize = 200;
const MAX_CLASSES: usize = 5;
const MAX_DATA_ATTRS: usize = 5;
const MAX_ANCESTORS: usize = 3;
const MAX_ANCESTOR_CLASSES: usize = 3;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AncestorSummary {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementContext {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data_attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<AncestorSummary>,
    pub in_editor_iframe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Snapshot of `element` for drafting step copy; not used for resolution.
pub fn capture_element_context(dom: &dyn DomPort, element: ElementHandle) -> ElementContext {
    let text = collapse_whitespace(&dom.text_content(element));
    let mut classes = stable_classes(dom, element);
    classes.truncate(MAX_CLASSES);

    let mut ancestors = Vec::new();
    let mut current = dom.parent(element);
    while let Some(node) = current {
        if ancestors.len() == MAX_ANCESTORS {
            break;
        }
        let tag = dom.tag_name(node).unwrap_or_default();
        if tag == "body" || tag == "html" {
            break;
        }
        let mut ancestor_classes = stable_classes(dom, node);
        ancestor_classes.truncate(MAX_ANCESTOR_CLASSES);
        ancestors.push(AncestorSummary {
            tag,
            role: element_role(dom, node),
            id: dom.attribute(node, "id").filter(|id| !id.is_empty()),
            classes: ancestor_classes,
        });
        current = dom.parent(node);
    }

    ElementContext {
        tag: dom.tag_name(element).unwrap_or_default(),
        role: element_role(dom, element),
        classes,
        text: (!text.is_empty()).then(|| truncate_chars(&text, MAX_TEXT_CHARS)),
        placeholder: dom
            .attribute(element, "placeholder")
            .or_else(|| dom.attribute(element, "aria-placeholder")),
        label: accessible_name(dom, element).map(|label| truncate_chars(&label, MAX_TEXT_CHARS)),
        data_attributes: data_attributes(dom, element)
            .into_iter()
            .take(MAX_DATA_ATTRS)
            .collect(),
        ancestors,
        in_editor_iframe: dom.scope_of(element) == Some(SearchScope::EditorFrame),
        block_type: closest(dom, element, "[data-block]")
            .and_then(|block| dom.attribute(block, "data-type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tour_dom::{ElementSpec, MemoryDom};

    #[test]
    fn summary_is_bounded() {
        let dom = MemoryDom::new();
        let body = dom.body(SearchScope::Main);
        let long_text = "word ".repeat(100);
        dom.append(
            body,
            &ElementSpec::new("nav").attr("role", "navigation").child(
                ElementSpec::new("div").class("a1 panel").child(
                    ElementSpec::new("section").child(
                        ElementSpec::new("div").child(
                            ElementSpec::new("button")
                                .class("components-button css-abc123 is-busy")
                                .attr("data-toolbar-item", "true")
                                .attr("data-block", "secret")
                                .attr("value", "private")
                                .text(long_text),
                        ),
                    ),
                ),
            ),
        );
        let button = dom.find(SearchScope::Main, "button").unwrap();
        let context = capture_element_context(&dom, button);

        assert_eq!(context.tag, "button");
        assert_eq!(context.role.as_deref(), Some("button"));
        assert_eq!(context.classes, vec!["components-button".to_string()]);
        assert_eq!(context.text.as_ref().map(|t| t.chars().count()), Some(200));
        assert_eq!(context.ancestors.len(), 3);
        assert_eq!(context.ancestors[1].tag, "section");
        assert!(context.data_attributes.contains_key("data-toolbar-item"));
        assert!(!context.data_attributes.contains_key("data-block"));

        let json = serde_json::to_string(&context).unwrap();
        assert!(!json.contains("private"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
