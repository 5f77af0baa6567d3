//! Host editor state, as seen by the tour engine
//!
//! The engine treats the editor's data store as an injected [`EditorStore`].
//! [`InMemoryEditorStore`] is a faithful stand-in that keeps a block tree,
//! selection, sidebar and inserter state, and (optionally) renders blocks
//! into a [`tour_dom::MemoryDom`] the way the editor canvas would.

pub mod errors;
pub mod memory;
pub mod store;
pub mod types;

pub use errors::EditorStoreError;
pub use memory::InMemoryEditorStore;
pub use store::EditorStore;
pub use types::{find_block, flatten_blocks, is_text_like, Block, EditorChange, TEXT_LIKE_BLOCKS};
