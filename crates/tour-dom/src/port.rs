//! The document port consumed by the engine

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::DomError;

/// Opaque reference to one element, stable for the element's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementHandle(pub u64);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which document a search runs against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchScope {
    /// The top-level admin document.
    Main,
    /// The editor canvas rendered in an embedded same-origin frame.
    EditorFrame,
}

impl SearchScope {
    pub fn name(&self) -> &'static str {
        match self {
            SearchScope::Main => "main",
            SearchScope::EditorFrame => "editor-frame",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
        }
    }
}

impl ComputedStyle {
    pub fn hidden() -> Self {
        Self {
            display: "none".to_string(),
            ..Self::default()
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.display != "none" && self.visibility != "hidden" && self.opacity > 0.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomEventKind {
    Click,
    Input,
    Change,
    /// Attribute, child-list or character-data change on the target.
    Mutation,
    Custom(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DomEvent {
    pub kind: DomEventKind,
    /// `None` for events dispatched on the document itself.
    pub target: Option<ElementHandle>,
    pub scope: SearchScope,
}

/// Document operations the engine relies on.
///
/// Everything is synchronous: the engine awaits only its own timers and
/// event subscriptions, never the document.
pub trait DomPort: Send + Sync {
    /// Whether the editor frame's document is currently reachable.
    fn has_editor_frame(&self) -> bool;

    /// Document-order matches of `selector` in `scope`.
    fn query_all(&self, scope: SearchScope, selector: &str)
        -> Result<Vec<ElementHandle>, DomError>;

    /// Descendants of `root` matching `selector`.
    fn query_within(
        &self,
        root: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DomError>;

    fn matches(&self, element: ElementHandle, selector: &str) -> Result<bool, DomError>;

    /// Lower-case tag name; `None` once the element is gone.
    fn tag_name(&self, element: ElementHandle) -> Option<String>;

    fn attribute(&self, element: ElementHandle, name: &str) -> Option<String>;

    /// Attributes in source order.
    fn attributes(&self, element: ElementHandle) -> Vec<(String, String)>;

    fn text_content(&self, element: ElementHandle) -> String;

    fn parent(&self, element: ElementHandle) -> Option<ElementHandle>;

    fn children(&self, element: ElementHandle) -> Vec<ElementHandle>;

    fn scope_of(&self, element: ElementHandle) -> Option<SearchScope>;

    fn is_connected(&self, element: ElementHandle) -> bool;

    fn computed_style(&self, element: ElementHandle) -> ComputedStyle;

    /// Bounding box relative to the element's own document viewport.
    fn bounding_rect(&self, element: ElementHandle) -> Rect;

    /// Current value of a form control.
    fn form_value(&self, element: ElementHandle) -> Option<String>;

    /// Checked state of a checkbox or radio.
    fn checked(&self, element: ElementHandle) -> Option<bool>;

    fn is_content_editable(&self, element: ElementHandle) -> bool;

    /// Position of the editor frame inside the main viewport.
    fn frame_offset(&self) -> (f64, f64);

    fn active_element(&self, scope: SearchScope) -> Option<ElementHandle>;

    fn focus(&self, element: ElementHandle) -> Result<(), DomError>;

    /// Blur whatever currently has focus in either document.
    fn blur_active(&self);

    fn place_caret_at_end(&self, element: ElementHandle) -> Result<(), DomError>;

    fn click(&self, element: ElementHandle) -> Result<(), DomError>;

    /// Scroll the main viewport so `y` (main-document coordinates) is at the top.
    fn scroll_main_to(&self, y: f64);

    /// Draw (or clear, with `None`) the tour highlight.
    fn highlight(&self, element: Option<ElementHandle>);

    fn subscribe(&self) -> broadcast::Receiver<DomEvent>;
}

/// Pixels left above a scrolled-to element.
const SCROLL_MARGIN: f64 = 120.0;

/// `node` is `ancestor` or lies inside it.
pub fn contains(dom: &dyn DomPort, ancestor: ElementHandle, node: ElementHandle) -> bool {
    let mut current = Some(node);
    while let Some(element) = current {
        if element == ancestor {
            return true;
        }
        current = dom.parent(element);
    }
    false
}

/// Connected, rendered and with a non-empty box.
pub fn is_visible(dom: &dyn DomPort, element: ElementHandle) -> bool {
    dom.is_connected(element)
        && dom.computed_style(element).is_rendered()
        && dom.bounding_rect(element).area() > 0.0
}

/// Nearest ancestor-or-self matching `selector`.
pub fn closest(dom: &dyn DomPort, element: ElementHandle, selector: &str) -> Option<ElementHandle> {
    let mut current = Some(element);
    while let Some(node) = current {
        if dom.matches(node, selector).unwrap_or(false) {
            return Some(node);
        }
        current = dom.parent(node);
    }
    None
}

/// Query the main document, then the editor frame when it exists.
pub fn query_everywhere(dom: &dyn DomPort, selector: &str) -> Vec<ElementHandle> {
    let mut found = dom.query_all(SearchScope::Main, selector).unwrap_or_default();
    if dom.has_editor_frame() {
        found.extend(
            dom.query_all(SearchScope::EditorFrame, selector)
                .unwrap_or_default(),
        );
    }
    found
}

/// Identity that survives re-renders: the block id when the element is a
/// block wrapper, otherwise the handle itself.
pub fn element_identity(dom: &dyn DomPort, element: ElementHandle) -> String {
    match dom.attribute(element, "data-block") {
        Some(block) if !block.is_empty() => format!("block:{block}"),
        _ => format!("node:{}", element.0),
    }
}

/// Scroll the main viewport to `element`, translating frame coordinates.
pub fn scroll_into_view(dom: &dyn DomPort, element: ElementHandle) {
    let rect = dom.bounding_rect(element);
    let mut top = rect.y;
    if dom.scope_of(element) == Some(SearchScope::EditorFrame) {
        top += dom.frame_offset().1;
    }
    dom.scroll_main_to((top - SCROLL_MARGIN).max(0.0));
}

/// Double-quoted CSS attribute value with quotes and backslashes escaped.
pub fn quote_attr_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// `[name="value"]` selector for an exact attribute match.
pub fn attr_selector(name: &str, value: &str) -> String {
    format!("[{}={}]", name, quote_attr_value(value))
}

/// Escape an identifier for use after `#` or `.`.
pub fn escape_ident(ident: &str) -> String {
    let mut escaped = String::with_capacity(ident.len());
    for (i, ch) in ident.chars().enumerate() {
        let plain = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii();
        if !plain || (i == 0 && ch.is_ascii_digit()) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_area_ignores_negative_sizes() {
        assert_eq!(Rect::new(0.0, 0.0, -5.0, 10.0).area(), 0.0);
        assert_eq!(Rect::new(0.0, 0.0, 4.0, 5.0).area(), 20.0);
    }

    #[test]
    fn style_rendering_rules() {
        assert!(ComputedStyle::default().is_rendered());
        assert!(!ComputedStyle::hidden().is_rendered());
        let transparent = ComputedStyle {
            opacity: 0.0,
            ..ComputedStyle::default()
        };
        assert!(!transparent.is_rendered());
    }

    #[test]
    fn attribute_quoting_escapes() {
        assert_eq!(attr_selector("data-testid", "a\"b"), r#"[data-testid="a\"b"]"#);
    }

    #[test]
    fn ident_escaping() {
        assert_eq!(escape_ident("main-title"), "main-title");
        assert_eq!(escape_ident("1abc"), "\\1abc");
        assert_eq!(escape_ident("a:b"), "a\\:b");
    }
}
