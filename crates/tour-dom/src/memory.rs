//! In-process document implementing [`DomPort`]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::trace;

use crate::errors::DomError;
use crate::fixture::ElementSpec;
use crate::port::{
    ComputedStyle, DomEvent, DomEventKind, DomPort, ElementHandle, Rect, SearchScope,
};
use crate::selector::{self, SelectorTree};

const EVENT_CAPACITY: usize = 256;
const AUTO_ROW_HEIGHT: f64 = 24.0;
const DEFAULT_FRAME_OFFSET: (f64, f64) = (0.0, 80.0);

type ClickHook = Arc<dyn Fn(&MemoryDom) + Send + Sync>;

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<ElementHandle>,
    parent: Option<ElementHandle>,
    scope: SearchScope,
    connected: bool,
    style: ComputedStyle,
    rect: Option<Rect>,
    value: Option<String>,
    checked: Option<bool>,
}

impl NodeData {
    fn new(tag: &str, scope: SearchScope) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
            scope,
            connected: true,
            style: ComputedStyle::default(),
            rect: None,
            value: None,
            checked: None,
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

struct DomState {
    nodes: HashMap<ElementHandle, NodeData>,
    next_id: u64,
    roots: HashMap<SearchScope, ElementHandle>,
    bodies: HashMap<SearchScope, ElementHandle>,
    frame_offset: (f64, f64),
    active: HashMap<SearchScope, ElementHandle>,
    caret: Option<ElementHandle>,
    highlighted: Option<ElementHandle>,
    scroll_y: f64,
}

impl DomState {
    fn node(&self, handle: ElementHandle) -> Option<&NodeData> {
        self.nodes.get(&handle)
    }

    fn live(&self, handle: ElementHandle) -> Result<&NodeData, DomError> {
        self.nodes
            .get(&handle)
            .filter(|node| node.connected)
            .ok_or(DomError::StaleElement(handle))
    }

    fn create(&mut self, tag: &str, scope: SearchScope) -> ElementHandle {
        self.next_id += 1;
        let handle = ElementHandle(self.next_id);
        self.nodes.insert(handle, NodeData::new(tag, scope));
        handle
    }

    fn build(&mut self, parent: ElementHandle, spec: &ElementSpec, scope: SearchScope) -> ElementHandle {
        let handle = self.create(&spec.tag, scope);
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.attrs = spec
                .attrs
                .iter()
                .map(|(key, value)| (key.to_ascii_lowercase(), value.clone()))
                .collect();
            node.text = spec.text.clone();
            node.value = spec.value.clone();
            node.checked = spec.checked;
            node.rect = spec.rect;
            node.parent = Some(parent);
            if spec.hidden {
                node.style = ComputedStyle::hidden();
            }
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(handle);
        }
        for child in &spec.children {
            self.build(handle, child, scope);
        }
        handle
    }

    /// Pre-order descendants of `root`, optionally including `root` itself.
    fn descendants(&self, root: ElementHandle, include_root: bool) -> Vec<ElementHandle> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if handle != root || include_root {
                out.push(handle);
            }
            if let Some(node) = self.node(handle) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn ancestors_rendered(&self, handle: ElementHandle) -> bool {
        let mut current = Some(handle);
        while let Some(h) = current {
            match self.node(h) {
                Some(node) if node.style.display == "none" => return false,
                Some(node) => current = node.parent,
                None => return false,
            }
        }
        true
    }

    fn inherited_visibility(&self, handle: ElementHandle) -> Option<String> {
        let mut current = self.node(handle).and_then(|node| node.parent);
        while let Some(h) = current {
            let node = self.node(h)?;
            if node.style.visibility == "hidden" {
                return Some("hidden".to_string());
            }
            current = node.parent;
        }
        None
    }
}

impl SelectorTree for DomState {
    type Node = ElementHandle;

    fn tag_name(&self, node: ElementHandle) -> String {
        self.node(node).map(|n| n.tag.clone()).unwrap_or_default()
    }

    fn attr(&self, node: ElementHandle, name: &str) -> Option<String> {
        self.node(node)?.attr(name).map(str::to_string)
    }

    fn parent_element(&self, node: ElementHandle) -> Option<ElementHandle> {
        self.node(node)?.parent
    }

    fn element_children(&self, node: ElementHandle) -> Vec<ElementHandle> {
        self.node(node).map(|n| n.children.clone()).unwrap_or_default()
    }
}

/// A mutable two-document tree with change notifications.
///
/// Mutation helpers emit the same [`DomEvent`]s a browser would deliver to
/// listeners, so completion watchers can be driven from tests.
pub struct MemoryDom {
    state: RwLock<DomState>,
    click_hooks: Mutex<HashMap<ElementHandle, ClickHook>>,
    events: broadcast::Sender<DomEvent>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// Empty main document (`html > body`) and no editor frame.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let dom = Self {
            state: RwLock::new(DomState {
                nodes: HashMap::new(),
                next_id: 0,
                roots: HashMap::new(),
                bodies: HashMap::new(),
                frame_offset: DEFAULT_FRAME_OFFSET,
                active: HashMap::new(),
                caret: None,
                highlighted: None,
                scroll_y: 0.0,
            }),
            click_hooks: Mutex::new(HashMap::new()),
            events,
        };
        dom.create_document(SearchScope::Main);
        dom
    }

    fn create_document(&self, scope: SearchScope) -> ElementHandle {
        let mut state = self.state.write();
        let html = state.create("html", scope);
        let body = state.create("body", scope);
        if let Some(node) = state.nodes.get_mut(&body) {
            node.parent = Some(html);
        }
        if let Some(node) = state.nodes.get_mut(&html) {
            node.children.push(body);
        }
        state.roots.insert(scope, html);
        state.bodies.insert(scope, body);
        body
    }

    fn emit(&self, kind: DomEventKind, target: Option<ElementHandle>, scope: SearchScope) {
        trace!(?kind, ?target, scope = scope.name(), "dom event");
        let _ = self.events.send(DomEvent {
            kind,
            target,
            scope,
        });
    }

    fn scope_or_main(&self, element: ElementHandle) -> SearchScope {
        self.scope_of(element).unwrap_or(SearchScope::Main)
    }

    /// `<body>` of `scope`.
    ///
    /// # Panics
    /// When `scope` is the editor frame and no frame is attached.
    pub fn body(&self, scope: SearchScope) -> ElementHandle {
        self.state.read().bodies[&scope]
    }

    pub fn frame_body(&self) -> Option<ElementHandle> {
        self.state
            .read()
            .bodies
            .get(&SearchScope::EditorFrame)
            .copied()
    }

    /// Attach the editor frame (idempotent); returns its `<body>`.
    pub fn attach_editor_frame(&self) -> ElementHandle {
        if let Some(body) = self.frame_body() {
            return body;
        }
        self.create_document(SearchScope::EditorFrame)
    }

    /// Tear down the frame document; its elements become disconnected.
    pub fn detach_editor_frame(&self) {
        let mut state = self.state.write();
        let Some(root) = state.roots.remove(&SearchScope::EditorFrame) else {
            return;
        };
        state.bodies.remove(&SearchScope::EditorFrame);
        state.active.remove(&SearchScope::EditorFrame);
        for handle in state.descendants(root, true) {
            if let Some(node) = state.nodes.get_mut(&handle) {
                node.connected = false;
            }
        }
    }

    pub fn set_frame_offset(&self, x: f64, y: f64) {
        self.state.write().frame_offset = (x, y);
    }

    /// Build `spec` as the last child of `parent`.
    pub fn append(&self, parent: ElementHandle, spec: &ElementSpec) -> ElementHandle {
        let scope = self.scope_or_main(parent);
        let handle = self.state.write().build(parent, spec, scope);
        self.emit(DomEventKind::Mutation, Some(parent), scope);
        handle
    }

    /// Detach `element` and its subtree.
    pub fn remove(&self, element: ElementHandle) {
        let scope = self.scope_or_main(element);
        let parent = {
            let mut state = self.state.write();
            let Some(parent) = state.node(element).and_then(|node| node.parent) else {
                return;
            };
            if let Some(parent_node) = state.nodes.get_mut(&parent) {
                parent_node.children.retain(|child| *child != element);
            }
            for handle in state.descendants(element, true) {
                if let Some(node) = state.nodes.get_mut(&handle) {
                    node.connected = false;
                }
            }
            if let Some(node) = state.nodes.get_mut(&element) {
                node.parent = None;
            }
            state.active.retain(|_, active| *active != element);
            parent
        };
        self.emit(DomEventKind::Mutation, Some(parent), scope);
    }

    pub fn set_attribute(&self, element: ElementHandle, name: &str, value: &str) {
        {
            let mut state = self.state.write();
            let Some(node) = state.nodes.get_mut(&element) else {
                return;
            };
            let name = name.to_ascii_lowercase();
            match node.attrs.iter_mut().find(|(key, _)| *key == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => node.attrs.push((name, value.to_string())),
            }
        }
        self.emit(DomEventKind::Mutation, Some(element), self.scope_or_main(element));
    }

    pub fn remove_attribute(&self, element: ElementHandle, name: &str) {
        {
            let mut state = self.state.write();
            let Some(node) = state.nodes.get_mut(&element) else {
                return;
            };
            node.attrs.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        }
        self.emit(DomEventKind::Mutation, Some(element), self.scope_or_main(element));
    }

    pub fn set_text(&self, element: ElementHandle, text: &str) {
        {
            let mut state = self.state.write();
            let Some(node) = state.nodes.get_mut(&element) else {
                return;
            };
            node.text = text.to_string();
        }
        self.emit(DomEventKind::Mutation, Some(element), self.scope_or_main(element));
    }

    /// Type into a form control; emits `input`.
    pub fn set_value(&self, element: ElementHandle, value: &str) {
        {
            let mut state = self.state.write();
            let Some(node) = state.nodes.get_mut(&element) else {
                return;
            };
            node.value = Some(value.to_string());
        }
        self.emit(DomEventKind::Input, Some(element), self.scope_or_main(element));
    }

    /// Toggle a checkbox or radio; emits `change`.
    pub fn set_checked(&self, element: ElementHandle, checked: bool) {
        {
            let mut state = self.state.write();
            let Some(node) = state.nodes.get_mut(&element) else {
                return;
            };
            node.checked = Some(checked);
        }
        self.emit(DomEventKind::Change, Some(element), self.scope_or_main(element));
    }

    pub fn set_style(&self, element: ElementHandle, style: ComputedStyle) {
        if let Some(node) = self.state.write().nodes.get_mut(&element) {
            node.style = style;
        }
        self.emit(DomEventKind::Mutation, Some(element), self.scope_or_main(element));
    }

    pub fn set_rect(&self, element: ElementHandle, rect: Rect) {
        if let Some(node) = self.state.write().nodes.get_mut(&element) {
            node.rect = Some(rect);
        }
    }

    /// Fire a custom event on `target`, or on the main document when `None`.
    pub fn dispatch_custom(&self, name: &str, target: Option<ElementHandle>) {
        let scope = target
            .map(|element| self.scope_or_main(element))
            .unwrap_or(SearchScope::Main);
        self.emit(DomEventKind::Custom(name.to_string()), target, scope);
    }

    /// Run `hook` after every click on `element`, mimicking page script.
    pub fn on_click(&self, element: ElementHandle, hook: impl Fn(&MemoryDom) + Send + Sync + 'static) {
        self.click_hooks.lock().insert(element, Arc::new(hook));
    }

    /// First match for `selector` in `scope`.
    pub fn find(&self, scope: SearchScope, selector: &str) -> Option<ElementHandle> {
        self.query_all(scope, selector)
            .ok()
            .and_then(|found| found.into_iter().next())
    }

    pub fn highlighted(&self) -> Option<ElementHandle> {
        self.state.read().highlighted
    }

    pub fn scroll_y(&self) -> f64 {
        self.state.read().scroll_y
    }

    /// Element holding a collapsed caret, if any.
    pub fn caret(&self) -> Option<ElementHandle> {
        self.state.read().caret
    }
}

impl DomPort for MemoryDom {
    fn has_editor_frame(&self) -> bool {
        self.state.read().roots.contains_key(&SearchScope::EditorFrame)
    }

    fn query_all(&self, scope: SearchScope, selector: &str) -> Result<Vec<ElementHandle>, DomError> {
        let parsed = selector::parse(selector)?;
        let state = self.state.read();
        let root = *state.roots.get(&scope).ok_or(DomError::FrameUnavailable)?;
        Ok(state
            .descendants(root, true)
            .into_iter()
            .filter(|handle| parsed.matches(&*state, *handle))
            .collect())
    }

    fn query_within(&self, root: ElementHandle, selector: &str) -> Result<Vec<ElementHandle>, DomError> {
        let parsed = selector::parse(selector)?;
        let state = self.state.read();
        state.live(root)?;
        Ok(state
            .descendants(root, false)
            .into_iter()
            .filter(|handle| parsed.matches(&*state, *handle))
            .collect())
    }

    fn matches(&self, element: ElementHandle, selector: &str) -> Result<bool, DomError> {
        let parsed = selector::parse(selector)?;
        let state = self.state.read();
        state.live(element)?;
        Ok(parsed.matches(&*state, element))
    }

    fn tag_name(&self, element: ElementHandle) -> Option<String> {
        self.state.read().node(element).map(|node| node.tag.clone())
    }

    fn attribute(&self, element: ElementHandle, name: &str) -> Option<String> {
        self.state
            .read()
            .node(element)?
            .attr(&name.to_ascii_lowercase())
            .map(str::to_string)
    }

    fn attributes(&self, element: ElementHandle) -> Vec<(String, String)> {
        self.state
            .read()
            .node(element)
            .map(|node| node.attrs.clone())
            .unwrap_or_default()
    }

    fn text_content(&self, element: ElementHandle) -> String {
        let state = self.state.read();
        state
            .descendants(element, true)
            .into_iter()
            .filter_map(|handle| state.node(handle))
            .map(|node| node.text.as_str())
            .collect()
    }

    fn parent(&self, element: ElementHandle) -> Option<ElementHandle> {
        self.state.read().node(element)?.parent
    }

    fn children(&self, element: ElementHandle) -> Vec<ElementHandle> {
        self.state
            .read()
            .node(element)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    fn scope_of(&self, element: ElementHandle) -> Option<SearchScope> {
        self.state.read().node(element).map(|node| node.scope)
    }

    fn is_connected(&self, element: ElementHandle) -> bool {
        self.state.read().live(element).is_ok()
    }

    fn computed_style(&self, element: ElementHandle) -> ComputedStyle {
        let state = self.state.read();
        let Some(node) = state.node(element) else {
            return ComputedStyle::hidden();
        };
        let mut style = node.style.clone();
        if !state.ancestors_rendered(element) {
            style.display = "none".to_string();
        }
        if let Some(visibility) = state.inherited_visibility(element) {
            style.visibility = visibility;
        }
        style
    }

    fn bounding_rect(&self, element: ElementHandle) -> Rect {
        let state = self.state.read();
        match state.node(element) {
            Some(node) if node.connected && state.ancestors_rendered(element) => node
                .rect
                .unwrap_or_else(|| Rect::new(0.0, element.0 as f64 * AUTO_ROW_HEIGHT, 320.0, AUTO_ROW_HEIGHT)),
            _ => Rect::default(),
        }
    }

    fn form_value(&self, element: ElementHandle) -> Option<String> {
        let state = self.state.read();
        let node = state.node(element)?;
        if let Some(value) = &node.value {
            return Some(value.clone());
        }
        match node.tag.as_str() {
            "input" | "textarea" | "select" => {
                Some(node.attr("value").map(str::to_string).unwrap_or_default())
            }
            _ => None,
        }
    }

    fn checked(&self, element: ElementHandle) -> Option<bool> {
        let state = self.state.read();
        let node = state.node(element)?;
        if node.tag != "input" {
            return node.checked;
        }
        match node.attr("type") {
            Some("checkbox") | Some("radio") => {
                Some(node.checked.unwrap_or_else(|| node.attr("checked").is_some()))
            }
            _ => node.checked,
        }
    }

    fn is_content_editable(&self, element: ElementHandle) -> bool {
        let state = self.state.read();
        let mut current = Some(element);
        while let Some(handle) = current {
            let Some(node) = state.node(handle) else {
                return false;
            };
            match node.attr("contenteditable") {
                Some("false") => return false,
                Some(_) => return true,
                None => current = node.parent,
            }
        }
        false
    }

    fn frame_offset(&self) -> (f64, f64) {
        self.state.read().frame_offset
    }

    fn active_element(&self, scope: SearchScope) -> Option<ElementHandle> {
        self.state.read().active.get(&scope).copied()
    }

    fn focus(&self, element: ElementHandle) -> Result<(), DomError> {
        let mut state = self.state.write();
        let scope = state.live(element)?.scope;
        if !state.ancestors_rendered(element) {
            return Err(DomError::NotFocusable(element));
        }
        state.active.insert(scope, element);
        Ok(())
    }

    fn blur_active(&self) {
        let mut state = self.state.write();
        state.active.clear();
        state.caret = None;
    }

    fn place_caret_at_end(&self, element: ElementHandle) -> Result<(), DomError> {
        if !self.is_content_editable(element) {
            return Err(DomError::NotFocusable(element));
        }
        self.focus(element)?;
        self.state.write().caret = Some(element);
        Ok(())
    }

    fn click(&self, element: ElementHandle) -> Result<(), DomError> {
        let (scope, toggles) = {
            let mut state = self.state.write();
            let node = state.live(element)?;
            let scope = node.scope;
            let toggles = node.tag == "input" && node.attr("type") == Some("checkbox");
            if toggles {
                let was = node.checked.unwrap_or_else(|| node.attr("checked").is_some());
                if let Some(node) = state.nodes.get_mut(&element) {
                    node.checked = Some(!was);
                }
            }
            (scope, toggles)
        };

        self.emit(DomEventKind::Click, Some(element), scope);
        if toggles {
            self.emit(DomEventKind::Change, Some(element), scope);
        }

        let hook = self.click_hooks.lock().get(&element).cloned();
        if let Some(hook) = hook {
            hook(self);
        }
        Ok(())
    }

    fn scroll_main_to(&self, y: f64) {
        self.state.write().scroll_y = y;
    }

    fn highlight(&self, element: Option<ElementHandle>) {
        self.state.write().highlighted = element;
    }

    fn subscribe(&self) -> broadcast::Receiver<DomEvent> {
        self.events.subscribe()
    }
}
