//! Locator capture: element -> durable [`Target`]
//!
//! Candidates are collected strongest first:
//!
//! | source                         | type          | weight | fallback |
//! |--------------------------------|---------------|--------|----------|
//! | `data-testid`                  | testId        | 100    | no       |
//! | `id`                           | css `#id`     | 95     | no       |
//! | role + accessible name         | role          | 80     | no       |
//! | other `data-*` (max 2)         | dataAttribute | 85/70  | no       |
//! | short CSS path                 | css           | 60     | no       |
//! | `aria-label`                   | ariaLabel     | 40     | yes      |
//! | landmark `>>` element          | contextual    | 50     | yes      |
//! | `tag:nth-child(n)` last resort | css           | 10     | no       |

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use tour_dom::{
    attr_selector, closest, escape_ident, DomPort, ElementHandle, SearchScope,
};
use tourguide_core_types::{Locator, LocatorType, Target, TargetConstraints};

use crate::aria::{accessible_name, element_role};

pub const TEST_ID_WEIGHT: u8 = 100;
pub const ID_WEIGHT: u8 = 95;
pub const ROLE_WEIGHT: u8 = 80;
pub const FRAMEWORK_DATA_WEIGHT: u8 = 85;
pub const DATA_WEIGHT: u8 = 70;
pub const CSS_PATH_WEIGHT: u8 = 60;
pub const CONTEXTUAL_WEIGHT: u8 = 50;
pub const ARIA_LABEL_WEIGHT: u8 = 40;
pub const STRUCTURAL_WEIGHT: u8 = 10;

const MAX_DATA_LOCATORS: usize = 2;
const MAX_PATH_ANCESTORS: usize = 3;
const MAX_ATTR_VALUE_LEN: usize = 120;

/// `data-*` prefixes set by the editor's own component library.
const FRAMEWORK_DATA_PREFIXES: &[&str] = &["data-wp-", "data-type", "data-tab-id", "data-toolbar-item"];

/// Never useful for re-finding an element: ephemeral ids or framework bookkeeping.
const EXCLUDED_DATA_ATTRS: &[&str] = &[
    "data-testid",
    "data-test-id",
    "data-block",
    "data-reactid",
    "data-reactroot",
    "data-emotion",
    "data-styled",
    "data-focus-lock-disabled",
    "data-rbd-draggable-id",
];
const EXCLUDED_DATA_PREFIXES: &[&str] = &["data-react", "data-v-", "data-rbd-", "data-radix-"];

/// Hashed, numeric or state-only class names that change between renders.
static GENERATED_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^\d",
        r"|^(css|jss|sc|emotion|styled|makeStyles|svelte)-",
        r"|^[a-zA-Z]+-[a-f0-9]{5,}$",
        r"|_{2,3}[a-zA-Z0-9]*\d[a-zA-Z0-9]*$",
        r"|^_[a-zA-Z0-9]{4,}$",
        r"|^(is|has)-",
    ))
    .expect("generated class pattern")
});

/// Landmark containers used to anchor contextual locators.
const LANDMARK_TAGS: &[&str] = &["header", "nav", "main", "aside", "footer", "form", "dialog"];
const LANDMARK_ROLES: &[&str] = &[
    "banner",
    "navigation",
    "main",
    "complementary",
    "contentinfo",
    "region",
    "search",
    "form",
    "dialog",
    "toolbar",
    "tablist",
    "menu",
];
pub(crate) const EDITOR_REGION_CLASSES: &[&str] = &[
    "edit-post-header",
    "editor-header",
    "interface-interface-skeleton__header",
    "interface-complementary-area",
    "edit-post-sidebar",
    "block-editor-block-toolbar",
    "block-editor-inserter__menu",
    "components-modal__frame",
    "editor-styles-wrapper",
    "is-root-container",
];

/// Class names that look stable enough to select on.
pub fn stable_classes(dom: &dyn DomPort, element: ElementHandle) -> Vec<String> {
    dom.attribute(element, "class")
        .unwrap_or_default()
        .split_whitespace()
        .filter(|class| !is_generated_class(class))
        .map(str::to_string)
        .collect()
}

pub fn is_generated_class(class: &str) -> bool {
    class.len() < 3 || GENERATED_CLASS.is_match(class)
}

/// Capture a locator bundle for `element`.
pub fn capture(dom: &dyn DomPort, element: ElementHandle) -> Target {
    let mut locators: Vec<Locator> = Vec::new();
    let mut push = |locator: Locator| {
        let duplicate = locators
            .iter()
            .any(|existing| existing.kind == locator.kind && existing.value == locator.value);
        if !duplicate && !locator.value.is_empty() {
            locators.push(locator);
        }
    };

    if let Some(test_id) = dom.attribute(element, "data-testid").filter(|v| !v.is_empty()) {
        push(Locator::new(LocatorType::TestId, test_id, TEST_ID_WEIGHT));
    }

    if let Some(id) = dom.attribute(element, "id").filter(|v| !v.is_empty()) {
        push(Locator::new(LocatorType::Css, format!("#{}", escape_ident(&id)), ID_WEIGHT));
    }

    if let Some(role) = element_role(dom, element) {
        if let Some(name) = accessible_name(dom, element) {
            push(Locator::new(LocatorType::Role, format!("{role}:{name}"), ROLE_WEIGHT));
        }
    }

    let mut data: Vec<(String, String, u8)> = data_attributes(dom, element)
        .into_iter()
        .map(|(name, value)| {
            let weight = if FRAMEWORK_DATA_PREFIXES.iter().any(|p| name.starts_with(p)) {
                FRAMEWORK_DATA_WEIGHT
            } else {
                DATA_WEIGHT
            };
            (name, value, weight)
        })
        .collect();
    data.sort_by(|a, b| b.2.cmp(&a.2));
    for (name, value, weight) in data.into_iter().take(MAX_DATA_LOCATORS) {
        push(Locator::new(
            LocatorType::DataAttribute,
            format!("{name}:{value}"),
            weight,
        ));
    }

    if let Some(path) = css_path(dom, element) {
        push(Locator::new(LocatorType::Css, path, CSS_PATH_WEIGHT));
    }

    if let Some(label) = dom.attribute(element, "aria-label") {
        let label = label.trim();
        if !label.is_empty() {
            push(Locator::new(LocatorType::AriaLabel, label, ARIA_LABEL_WEIGHT).as_fallback());
        }
    }

    if let Some(contextual) = contextual_value(dom, element) {
        push(Locator::new(LocatorType::Contextual, contextual, CONTEXTUAL_WEIGHT).as_fallback());
    }

    if locators.is_empty() {
        let structural = structural_selector(dom, element);
        locators.push(Locator::new(LocatorType::Css, structural, STRUCTURAL_WEIGHT));
    }

    locators.sort_by(|a, b| b.weight.cmp(&a.weight));

    let scope = dom.scope_of(element).unwrap_or(SearchScope::Main);
    let block_type = closest(dom, element, "[data-block]")
        .and_then(|block| dom.attribute(block, "data-type"));
    let constraints = TargetConstraints {
        in_editor_iframe: (scope == SearchScope::EditorFrame).then_some(true),
        block_type,
        ..TargetConstraints::default()
    };

    debug!(
        element = %element,
        locators = locators.len(),
        scope = scope.name(),
        "captured target"
    );
    Target::new(locators).with_constraints(constraints)
}

/// Candidate `data-*` attributes in source order, excluding test ids and internals.
pub fn data_attributes(dom: &dyn DomPort, element: ElementHandle) -> Vec<(String, String)> {
    dom.attributes(element)
        .into_iter()
        .filter(|(name, value)| {
            name.starts_with("data-")
                && !EXCLUDED_DATA_ATTRS.contains(&name.as_str())
                && !EXCLUDED_DATA_PREFIXES.iter().any(|p| name.starts_with(p))
                && !value.is_empty()
                && value.len() <= MAX_ATTR_VALUE_LEN
        })
        .collect()
}

/// One path segment; `true` when it uniquely anchors the path (id or test id).
fn segment(dom: &dyn DomPort, element: ElementHandle) -> Option<(String, bool)> {
    let tag = dom.tag_name(element)?;
    if let Some(id) = dom.attribute(element, "id").filter(|v| !v.is_empty()) {
        return Some((format!("#{}", escape_ident(&id)), true));
    }
    if let Some(test_id) = dom.attribute(element, "data-testid").filter(|v| !v.is_empty()) {
        return Some((attr_selector("data-testid", &test_id), true));
    }

    let mut segment = tag.clone();
    for class in stable_classes(dom, element).iter().take(2) {
        segment.push('.');
        segment.push_str(&escape_ident(class));
    }

    if let Some(parent) = dom.parent(element) {
        let same_tag: Vec<ElementHandle> = dom
            .children(parent)
            .into_iter()
            .filter(|sibling| dom.tag_name(*sibling).as_deref() == Some(tag.as_str()))
            .collect();
        if same_tag.len() > 1 {
            if let Some(pos) = same_tag.iter().position(|sibling| *sibling == element) {
                segment.push_str(&format!(":nth-of-type({})", pos + 1));
            }
        }
    }
    Some((segment, false))
}

/// Child-combinator path through at most three ancestors, stopping early at
/// an id/test-id anchor or the document body.
pub fn css_path(dom: &dyn DomPort, element: ElementHandle) -> Option<String> {
    let (first, anchored) = segment(dom, element)?;
    let mut parts = vec![first];
    let mut current = element;
    if !anchored {
        for _ in 0..MAX_PATH_ANCESTORS {
            let Some(parent) = dom.parent(current) else { break };
            if matches!(dom.tag_name(parent).as_deref(), Some("body") | Some("html") | None) {
                break;
            }
            let Some((part, anchored)) = segment(dom, parent) else { break };
            parts.push(part);
            current = parent;
            if anchored {
                break;
            }
        }
    }
    parts.reverse();
    Some(parts.join(" > "))
}

/// Nearest landmark, native or ARIA, or a known editor region.
pub fn landmark_ancestor(dom: &dyn DomPort, element: ElementHandle) -> Option<ElementHandle> {
    let mut current = dom.parent(element);
    while let Some(node) = current {
        if is_landmark(dom, node) {
            return Some(node);
        }
        current = dom.parent(node);
    }
    None
}

fn is_landmark(dom: &dyn DomPort, node: ElementHandle) -> bool {
    let tag = dom.tag_name(node).unwrap_or_default();
    if LANDMARK_TAGS.contains(&tag.as_str()) {
        return true;
    }
    if let Some(role) = dom.attribute(node, "role") {
        if LANDMARK_ROLES.contains(&role.as_str()) {
            return true;
        }
    }
    let class = dom.attribute(node, "class").unwrap_or_default();
    class
        .split_whitespace()
        .any(|c| EDITOR_REGION_CLASSES.contains(&c))
}

fn container_selector(dom: &dyn DomPort, container: ElementHandle) -> Option<String> {
    if let Some(id) = dom.attribute(container, "id").filter(|v| !v.is_empty()) {
        return Some(format!("#{}", escape_ident(&id)));
    }
    let class = dom.attribute(container, "class").unwrap_or_default();
    if let Some(region) = class
        .split_whitespace()
        .find(|c| EDITOR_REGION_CLASSES.contains(c))
    {
        return Some(format!(".{region}"));
    }
    if let Some(role) = dom.attribute(container, "role").filter(|r| LANDMARK_ROLES.contains(&r.as_str())) {
        return Some(attr_selector("role", &role));
    }
    dom.tag_name(container)
}

fn inner_selector(dom: &dyn DomPort, element: ElementHandle) -> Option<String> {
    let tag = dom.tag_name(element)?;
    if let Some(label) = dom.attribute(element, "aria-label").filter(|v| !v.trim().is_empty()) {
        return Some(format!("{tag}{}", attr_selector("aria-label", &label)));
    }
    match stable_classes(dom, element).first() {
        Some(class) => Some(format!("{tag}.{}", escape_ident(class))),
        None => Some(tag),
    }
}

/// `"container >> element"` anchored at the nearest landmark.
pub fn contextual_value(dom: &dyn DomPort, element: ElementHandle) -> Option<String> {
    let container = landmark_ancestor(dom, element)?;
    let outer = container_selector(dom, container)?;
    let inner = inner_selector(dom, element)?;
    Some(format!("{outer} >> {inner}"))
}

/// `tag:nth-child(n)`.
pub fn structural_selector(dom: &dyn DomPort, element: ElementHandle) -> String {
    let tag = dom.tag_name(element).unwrap_or_else(|| "*".to_string());
    let position = dom
        .parent(element)
        .and_then(|parent| dom.children(parent).iter().position(|c| *c == element))
        .map(|pos| pos + 1)
        .unwrap_or(1);
    format!("{tag}:nth-child({position})")
}
