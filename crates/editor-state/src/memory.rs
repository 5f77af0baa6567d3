use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use tour_dom::{DomPort, ElementHandle, ElementSpec, MemoryDom};

use crate::errors::EditorStoreError;
use crate::store::EditorStore;
use crate::types::{find_block, flatten_blocks, is_text_like, Block, EditorChange};

const CHANGE_CAPACITY: usize = 128;
const BLOCK_CLASS: &str = "wp-block block-editor-block-list__block";

#[derive(Debug, Default)]
struct EditorState {
    ready: bool,
    unavailable: bool,
    blocks: Vec<Block>,
    selected: Option<String>,
    sidebar_open: bool,
    active_sidebar: Option<String>,
    inserter_open: bool,
    post: Map<String, Value>,
}

/// Renders blocks into the editor frame of a [`MemoryDom`].
struct CanvasMirror {
    dom: Arc<MemoryDom>,
    container: ElementHandle,
    rendered: Mutex<HashMap<String, ElementHandle>>,
}

impl CanvasMirror {
    fn new(dom: Arc<MemoryDom>) -> Self {
        let body = dom.attach_editor_frame();
        let container = match dom.find(tour_dom::SearchScope::EditorFrame, ".is-root-container") {
            Some(existing) => existing,
            None => {
                let wrapper = dom.append(
                    body,
                    &ElementSpec::new("div").class("editor-styles-wrapper").child(
                        ElementSpec::new("div")
                            .class("block-editor-writing-flow")
                            .child(
                                ElementSpec::new("div")
                                    .class("is-root-container block-editor-block-list__layout"),
                            ),
                    ),
                );
                dom.query_within(wrapper, ".is-root-container")
                    .ok()
                    .and_then(|found| found.into_iter().next())
                    .unwrap_or(wrapper)
            }
        };
        Self {
            dom,
            container,
            rendered: Mutex::new(HashMap::new()),
        }
    }

    fn render(&self, parent: ElementHandle, block: &Block) {
        let handle = self.dom.append(parent, &block_markup(block));
        self.rendered.lock().insert(block.client_id.clone(), handle);
        for inner in &block.inner_blocks {
            self.render(handle, inner);
        }
    }

    fn render_top_level(&self, block: &Block) {
        self.render(self.container, block);
    }

    fn unrender(&self, block: &Block) {
        let handle = self.rendered.lock().remove(&block.client_id);
        for inner in flatten_blocks(&block.inner_blocks) {
            self.rendered.lock().remove(&inner.client_id);
        }
        if let Some(handle) = handle {
            self.dom.remove(handle);
        }
    }

    fn mark_selected(&self, previous: Option<&str>, next: Option<&str>) {
        let rendered = self.rendered.lock().clone();
        if let Some(handle) = previous.and_then(|id| rendered.get(id)) {
            self.dom.set_attribute(*handle, "class", BLOCK_CLASS);
        }
        if let Some(handle) = next.and_then(|id| rendered.get(id)) {
            self.dom
                .set_attribute(*handle, "class", &format!("{BLOCK_CLASS} is-selected"));
        }
    }

    fn element(&self, client_id: &str) -> Option<ElementHandle> {
        self.rendered.lock().get(client_id).copied()
    }
}

fn block_markup(block: &Block) -> ElementSpec {
    let title = block
        .name
        .rsplit('/')
        .next()
        .unwrap_or(block.name.as_str())
        .to_string();
    let mut spec = ElementSpec::new("div")
        .id(format!("block-{}", block.client_id))
        .class(BLOCK_CLASS)
        .attr("data-block", block.client_id.clone())
        .attr("data-type", block.name.clone())
        .attr("aria-label", format!("Block: {title}"));

    if is_text_like(&block.name) {
        let tag = match block.name.as_str() {
            "core/heading" => "h2",
            "core/list" | "core/list-item" => "li",
            "core/preformatted" | "core/code" => "pre",
            _ => "p",
        };
        let content = block
            .attributes
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        spec = spec.child(
            ElementSpec::new(tag)
                .class("block-editor-rich-text__editable")
                .attr("contenteditable", "true")
                .attr("role", "document")
                .text(content),
        );
    } else if block.name == "core/image" {
        spec = spec.child(
            ElementSpec::new("figure").child(
                ElementSpec::new("div")
                    .class("components-placeholder")
                    .child(ElementSpec::new("button").text("Upload")),
            ),
        );
    }
    spec
}

/// In-memory editor store for tests and fixture-driven runs.
pub struct InMemoryEditorStore {
    state: Mutex<EditorState>,
    canvas: Option<CanvasMirror>,
    changes: broadcast::Sender<EditorChange>,
    mutations: AtomicUsize,
}

impl Default for InMemoryEditorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEditorStore {
    /// Ready editor with no blocks and nothing open.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            state: Mutex::new(EditorState {
                ready: true,
                ..EditorState::default()
            }),
            canvas: None,
            changes,
            mutations: AtomicUsize::new(0),
        }
    }

    /// Render blocks into `dom`'s editor frame (attaching one if needed).
    pub fn with_dom(dom: Arc<MemoryDom>) -> Self {
        Self {
            canvas: Some(CanvasMirror::new(dom)),
            ..Self::new()
        }
    }

    /// Seed the document; seeding does not count as a mutation.
    pub fn with_blocks(self, blocks: Vec<Block>) -> Self {
        if let Some(canvas) = &self.canvas {
            for block in &blocks {
                canvas.render_top_level(block);
            }
        }
        self.state.lock().blocks = blocks;
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
        self.notify(EditorChange::Ready);
    }

    /// Make every call fail with [`EditorStoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn set_post_attribute(&self, key: &str, value: Value) {
        self.state.lock().post.insert(key.to_string(), value);
        self.notify(EditorChange::Attributes);
    }

    /// Delete a block (and its rendering) as if the user removed it.
    pub fn remove_block(&self, client_id: &str) -> Option<Block> {
        let removed = {
            let mut state = self.state.lock();
            let removed = remove_from(&mut state.blocks, client_id);
            if removed.is_some() && state.selected.as_deref() == Some(client_id) {
                state.selected = None;
            }
            removed
        };
        if let (Some(block), Some(canvas)) = (&removed, &self.canvas) {
            canvas.unrender(block);
        }
        if removed.is_some() {
            self.notify(EditorChange::Blocks);
        }
        removed
    }

    /// Number of mutating calls received through [`EditorStore`].
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Rendered wrapper element of a block, when mirrored into a document.
    pub fn dom_element(&self, client_id: &str) -> Option<ElementHandle> {
        self.canvas.as_ref()?.element(client_id)
    }

    pub fn block_count(&self) -> usize {
        flatten_blocks(&self.state.lock().blocks).len()
    }

    fn notify(&self, change: EditorChange) {
        let _ = self.changes.send(change);
    }

    fn check(&self) -> Result<(), EditorStoreError> {
        if self.state.lock().unavailable {
            return Err(EditorStoreError::Unavailable(
                "editor data store not registered".to_string(),
            ));
        }
        Ok(())
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn set_selection(&self, next: Option<String>) {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.selected, next.clone())
        };
        if let Some(canvas) = &self.canvas {
            canvas.mark_selected(previous.as_deref(), next.as_deref());
        }
        self.notify(EditorChange::Selection);
    }
}

fn remove_from(blocks: &mut Vec<Block>, client_id: &str) -> Option<Block> {
    if let Some(pos) = blocks.iter().position(|block| block.client_id == client_id) {
        return Some(blocks.remove(pos));
    }
    blocks
        .iter_mut()
        .find_map(|block| remove_from(&mut block.inner_blocks, client_id))
}

fn find_block_mut<'a>(blocks: &'a mut [Block], client_id: &str) -> Option<&'a mut Block> {
    for block in blocks.iter_mut() {
        if block.client_id == client_id {
            return Some(block);
        }
        if let Some(found) = find_block_mut(&mut block.inner_blocks, client_id) {
            return Some(found);
        }
    }
    None
}

fn arg_str(args: &[Value], index: usize) -> Option<&str> {
    args.get(index).and_then(Value::as_str)
}

#[async_trait]
impl EditorStore for InMemoryEditorStore {
    async fn is_editor_ready(&self) -> Result<bool, EditorStoreError> {
        self.check()?;
        Ok(self.state.lock().ready)
    }

    async fn blocks(&self) -> Result<Vec<Block>, EditorStoreError> {
        self.check()?;
        Ok(self.state.lock().blocks.clone())
    }

    async fn selected_block_id(&self) -> Result<Option<String>, EditorStoreError> {
        self.check()?;
        Ok(self.state.lock().selected.clone())
    }

    async fn is_sidebar_open(&self) -> Result<bool, EditorStoreError> {
        self.check()?;
        Ok(self.state.lock().sidebar_open)
    }

    async fn active_sidebar(&self) -> Result<Option<String>, EditorStoreError> {
        self.check()?;
        let state = self.state.lock();
        Ok(state
            .sidebar_open
            .then(|| state.active_sidebar.clone())
            .flatten())
    }

    async fn is_inserter_open(&self) -> Result<bool, EditorStoreError> {
        self.check()?;
        Ok(self.state.lock().inserter_open)
    }

    async fn query(
        &self,
        store: &str,
        selector: &str,
        args: &[Value],
    ) -> Result<Value, EditorStoreError> {
        self.check()?;
        let state = self.state.lock();
        let value = match selector {
            "getBlocks" => serde_json::to_value(&state.blocks).unwrap_or(Value::Null),
            "getBlockCount" => json!(state.blocks.len()),
            "getBlockOrder" => json!(state
                .blocks
                .iter()
                .map(|block| block.client_id.clone())
                .collect::<Vec<_>>()),
            "getSelectedBlockClientId" => json!(state.selected),
            "getSelectedBlock" => state
                .selected
                .as_deref()
                .and_then(|id| find_block(&state.blocks, id))
                .and_then(|block| serde_json::to_value(block).ok())
                .unwrap_or(Value::Null),
            "getBlockName" => arg_str(args, 0)
                .and_then(|id| find_block(&state.blocks, id))
                .map(|block| json!(block.name))
                .unwrap_or(Value::Null),
            "getBlockAttributes" => arg_str(args, 0)
                .and_then(|id| find_block(&state.blocks, id))
                .map(|block| block.attributes.clone())
                .unwrap_or(Value::Null),
            "isEditorSidebarOpened" => json!(state.sidebar_open),
            "getActiveGeneralSidebar" => json!(state.active_sidebar),
            "isInserterOpened" => json!(state.inserter_open),
            "getEditedPostAttribute" => arg_str(args, 0)
                .and_then(|key| state.post.get(key).cloned())
                .unwrap_or(Value::Null),
            _ => {
                return Err(EditorStoreError::UnknownQuery {
                    store: store.to_string(),
                    selector: selector.to_string(),
                })
            }
        };
        Ok(value)
    }

    async fn select_block(&self, client_id: &str) -> Result<(), EditorStoreError> {
        self.check()?;
        self.mutated();
        if find_block(&self.state.lock().blocks, client_id).is_none() {
            return Err(EditorStoreError::UnknownBlock(client_id.to_string()));
        }
        self.set_selection(Some(client_id.to_string()));
        Ok(())
    }

    async fn clear_selection(&self) -> Result<(), EditorStoreError> {
        self.check()?;
        self.mutated();
        self.set_selection(None);
        Ok(())
    }

    async fn open_sidebar(&self, name: &str) -> Result<(), EditorStoreError> {
        self.check()?;
        self.mutated();
        {
            let mut state = self.state.lock();
            state.sidebar_open = true;
            state.active_sidebar = Some(name.to_string());
        }
        self.notify(EditorChange::Sidebar);
        Ok(())
    }

    async fn close_sidebar(&self) -> Result<(), EditorStoreError> {
        self.check()?;
        self.mutated();
        self.state.lock().sidebar_open = false;
        self.notify(EditorChange::Sidebar);
        Ok(())
    }

    async fn set_inserter_open(&self, open: bool) -> Result<(), EditorStoreError> {
        self.check()?;
        self.mutated();
        self.state.lock().inserter_open = open;
        self.notify(EditorChange::Inserter);
        Ok(())
    }

    async fn insert_block(&self, name: &str, attributes: Value) -> Result<Block, EditorStoreError> {
        self.check()?;
        self.mutated();
        let mut block = Block::new(Uuid::new_v4().to_string(), name);
        if attributes.is_object() {
            block.attributes = attributes;
        }
        self.state.lock().blocks.push(block.clone());
        if let Some(canvas) = &self.canvas {
            canvas.render_top_level(&block);
        }
        debug!(block = %block.client_id, name, "inserted block");
        self.notify(EditorChange::Blocks);
        self.set_selection(Some(block.client_id.clone()));
        Ok(block)
    }

    async fn update_block_attributes(
        &self,
        client_id: &str,
        attributes: Value,
    ) -> Result<(), EditorStoreError> {
        self.check()?;
        self.mutated();
        {
            let mut state = self.state.lock();
            let block = find_block_mut(&mut state.blocks, client_id)
                .ok_or_else(|| EditorStoreError::UnknownBlock(client_id.to_string()))?;
            match (&mut block.attributes, attributes) {
                (Value::Object(existing), Value::Object(update)) => existing.extend(update),
                (slot, update) => *slot = update,
            }
        }
        self.notify(EditorChange::Attributes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<EditorChange> {
        self.changes.subscribe()
    }
}
