use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::errors::EditorStoreError;
use crate::types::{Block, EditorChange};

/// The host editor's state store, as consumed by the engine.
///
/// Reads are cheap snapshots. Mutations resolve once the store has accepted
/// the change; the document may render it later.
#[async_trait]
pub trait EditorStore: Send + Sync {
    async fn is_editor_ready(&self) -> Result<bool, EditorStoreError>;

    /// Top-level blocks in document order, with nested children.
    async fn blocks(&self) -> Result<Vec<Block>, EditorStoreError>;

    async fn selected_block_id(&self) -> Result<Option<String>, EditorStoreError>;

    async fn is_sidebar_open(&self) -> Result<bool, EditorStoreError>;

    /// Name of the open sidebar panel, e.g. `edit-post/block`.
    async fn active_sidebar(&self) -> Result<Option<String>, EditorStoreError>;

    async fn is_inserter_open(&self) -> Result<bool, EditorStoreError>;

    /// Call a named selector on one of the host's data stores.
    async fn query(
        &self,
        store: &str,
        selector: &str,
        args: &[Value],
    ) -> Result<Value, EditorStoreError>;

    async fn select_block(&self, client_id: &str) -> Result<(), EditorStoreError>;

    async fn clear_selection(&self) -> Result<(), EditorStoreError>;

    async fn open_sidebar(&self, name: &str) -> Result<(), EditorStoreError>;

    async fn close_sidebar(&self) -> Result<(), EditorStoreError>;

    async fn set_inserter_open(&self, open: bool) -> Result<(), EditorStoreError>;

    /// Append a new block and return it with its assigned client id.
    async fn insert_block(&self, name: &str, attributes: Value) -> Result<Block, EditorStoreError>;

    async fn update_block_attributes(
        &self,
        client_id: &str,
        attributes: Value,
    ) -> Result<(), EditorStoreError>;

    fn subscribe(&self) -> broadcast::Receiver<EditorChange>;
}
