//! ARIA roles and accessible names

use tour_dom::{attr_selector, closest, DomPort, ElementHandle, SearchScope};

/// Roles whose accessible name may come from their text content.
const NAME_FROM_CONTENT: &[&str] = &[
    "button", "link", "tab", "menuitem", "menuitemcheckbox", "menuitemradio", "option",
    "checkbox", "radio", "switch", "treeitem", "heading", "cell", "tooltip",
];

/// Implicit role table: tag (and input type) to role.
pub fn implicit_role(dom: &dyn DomPort, element: ElementHandle) -> Option<&'static str> {
    let tag = dom.tag_name(element)?;
    let role = match tag.as_str() {
        "a" | "area" => dom.attribute(element, "href").map(|_| "link")?,
        "button" => "button",
        "input" => {
            let kind = dom
                .attribute(element, "type")
                .unwrap_or_else(|| "text".to_string())
                .to_ascii_lowercase();
            match kind.as_str() {
                "button" | "submit" | "reset" | "image" => "button",
                "checkbox" => "checkbox",
                "radio" => "radio",
                "range" => "slider",
                "number" => "spinbutton",
                "search" => "searchbox",
                "text" | "email" | "tel" | "url" | "password" => "textbox",
                _ => return None,
            }
        }
        "select" => {
            if dom.attribute(element, "multiple").is_some() {
                "listbox"
            } else {
                "combobox"
            }
        }
        "textarea" => "textbox",
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
        "nav" => "navigation",
        "main" => "main",
        "header" => "banner",
        "footer" => "contentinfo",
        "aside" => "complementary",
        "form" => "form",
        "dialog" => "dialog",
        "ul" | "ol" => "list",
        "li" => "listitem",
        "img" => "img",
        "table" => "table",
        "option" => "option",
        "progress" => "progressbar",
        "section" if has_label(dom, element) => "region",
        _ => return None,
    };
    Some(role)
}

/// Explicit `role` (first token), else the implicit role.
pub fn element_role(dom: &dyn DomPort, element: ElementHandle) -> Option<String> {
    if let Some(role) = dom.attribute(element, "role") {
        if let Some(first) = role.split_whitespace().next() {
            return Some(first.to_ascii_lowercase());
        }
    }
    implicit_role(dom, element).map(str::to_string)
}

/// Selectors that can carry `role` implicitly; candidates still need an
/// [`element_role`] check because an explicit role overrides these.
pub fn implicit_role_selectors(role: &str) -> &'static [&'static str] {
    match role {
        "button" => &[
            "button",
            "input[type=\"button\"]",
            "input[type=\"submit\"]",
            "input[type=\"reset\"]",
            "input[type=\"image\"]",
        ],
        "link" => &["a[href]", "area[href]"],
        "checkbox" => &["input[type=\"checkbox\"]"],
        "radio" => &["input[type=\"radio\"]"],
        "slider" => &["input[type=\"range\"]"],
        "spinbutton" => &["input[type=\"number\"]"],
        "searchbox" => &["input[type=\"search\"]"],
        "textbox" => &[
            "textarea",
            "input:not([type])",
            "input[type=\"text\"]",
            "input[type=\"email\"]",
            "input[type=\"tel\"]",
            "input[type=\"url\"]",
            "input[type=\"password\"]",
        ],
        "combobox" => &["select"],
        "listbox" => &["select[multiple]"],
        "heading" => &["h1", "h2", "h3", "h4", "h5", "h6"],
        "navigation" => &["nav"],
        "main" => &["main"],
        "banner" => &["header"],
        "contentinfo" => &["footer"],
        "complementary" => &["aside"],
        "form" => &["form"],
        "dialog" => &["dialog"],
        "list" => &["ul", "ol"],
        "listitem" => &["li"],
        "img" => &["img"],
        "table" => &["table"],
        "option" => &["option"],
        "progressbar" => &["progress"],
        "region" => &["section"],
        _ => &[],
    }
}

/// Elements in `scope` whose computed role is `role`, in document order.
pub fn query_role(dom: &dyn DomPort, scope: SearchScope, role: &str) -> Vec<ElementHandle> {
    let mut selectors = vec![format!("[role~={}]", tour_dom::quote_attr_value(role))];
    selectors.extend(implicit_role_selectors(role).iter().map(|s| s.to_string()));
    dom.query_all(scope, &selectors.join(", "))
        .unwrap_or_default()
        .into_iter()
        .filter(|el| element_role(dom, *el).as_deref() == Some(role))
        .collect()
}

fn has_label(dom: &dyn DomPort, element: ElementHandle) -> bool {
    dom.attribute(element, "aria-label").is_some()
        || dom.attribute(element, "aria-labelledby").is_some()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    let text = collapse_whitespace(&text);
    (!text.is_empty()).then_some(text)
}

/// Accessible name, following the usual precedence:
/// `aria-label`, `aria-labelledby`, an associated `<label>`, `title`, then
/// text content for roles that take their name from content.
pub fn accessible_name(dom: &dyn DomPort, element: ElementHandle) -> Option<String> {
    if let Some(label) = dom.attribute(element, "aria-label").and_then(non_empty) {
        return Some(label);
    }

    let scope = dom.scope_of(element).unwrap_or(SearchScope::Main);
    if let Some(ids) = dom.attribute(element, "aria-labelledby") {
        let text: Vec<String> = ids
            .split_whitespace()
            .filter_map(|id| {
                dom.query_all(scope, &attr_selector("id", id))
                    .ok()?
                    .into_iter()
                    .next()
            })
            .map(|label| dom.text_content(label))
            .collect();
        if let Some(name) = non_empty(text.join(" ")) {
            return Some(name);
        }
    }

    if let Some(label) = associated_label(dom, element, scope) {
        if let Some(name) = non_empty(dom.text_content(label)) {
            return Some(name);
        }
    }

    if let Some(title) = dom.attribute(element, "title").and_then(non_empty) {
        return Some(title);
    }

    let role = element_role(dom, element)?;
    if NAME_FROM_CONTENT.contains(&role.as_str()) {
        return non_empty(dom.text_content(element));
    }
    None
}

fn associated_label(
    dom: &dyn DomPort,
    element: ElementHandle,
    scope: SearchScope,
) -> Option<ElementHandle> {
    if let Some(id) = dom.attribute(element, "id").filter(|id| !id.is_empty()) {
        let by_for = dom
            .query_all(scope, &format!("label{}", attr_selector("for", &id)))
            .ok()
            .and_then(|found| found.into_iter().next());
        if by_for.is_some() {
            return by_for;
        }
    }
    closest(dom, element, "label").filter(|label| *label != element)
}

/// Case-insensitive, whitespace-insensitive name comparison.
pub fn names_match(actual: &str, expected: &str) -> bool {
    collapse_whitespace(actual).to_lowercase() == collapse_whitespace(expected).to_lowercase()
}
