//! Page fixtures: a document plus the editor's block tree
//!
//! The CLI plays tours against a recorded page instead of a live browser.
//! A fixture is the [`DomFixture`] layout with an extra `blocks` list that
//! seeds the in-memory editor store.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use tour_dom::{query_everywhere, DomFixture, DomPort, ElementHandle, MemoryDom};
use tour_editor_state::{Block, InMemoryEditorStore};
use tourguide_core_types::Tour;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageFixture {
    #[serde(flatten)]
    pub dom: DomFixture,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// A fixture materialized into a document and an editor store bound to it.
pub struct LoadedPage {
    pub dom: Arc<MemoryDom>,
    pub editor: Arc<InMemoryEditorStore>,
}

impl PageFixture {
    pub fn load(self) -> LoadedPage {
        let dom = Arc::new(MemoryDom::from_fixture(&self.dom));
        let editor = Arc::new(InMemoryEditorStore::with_dom(dom.clone()).with_blocks(self.blocks));
        LoadedPage { dom, editor }
    }
}

impl LoadedPage {
    /// First element matching `selector` in the main document or the editor frame.
    pub fn find(&self, selector: &str) -> Result<ElementHandle> {
        query_everywhere(self.dom.as_ref() as &dyn DomPort, selector)
            .into_iter()
            .next()
            .with_context(|| format!("no element matches {selector}"))
    }
}

pub async fn read_page(path: &Path) -> Result<LoadedPage> {
    let fixture: PageFixture = read_document(path).await?;
    Ok(fixture.load())
}

pub async fn read_tour(path: &Path) -> Result<Tour> {
    read_document(path).await
}

/// JSON unless the extension says YAML.
pub async fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    } else {
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}
