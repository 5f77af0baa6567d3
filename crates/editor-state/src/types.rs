use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One structural unit of the edited document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub client_id: String,
    pub name: String,
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub inner_blocks: Vec<Block>,
}

impl Block {
    pub fn new(client_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            name: name.into(),
            attributes: Value::Object(Default::default()),
            inner_blocks: Vec::new(),
        }
    }

    pub fn is_text_like(&self) -> bool {
        is_text_like(&self.name)
    }
}

/// What changed in the editor state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditorChange {
    Ready,
    Blocks,
    Selection,
    Sidebar,
    Inserter,
    Attributes,
}

/// Block types whose content is a single rich-text field.
pub const TEXT_LIKE_BLOCKS: &[&str] = &[
    "core/paragraph",
    "core/heading",
    "core/list",
    "core/list-item",
    "core/quote",
    "core/verse",
    "core/preformatted",
    "core/pullquote",
    "core/code",
];

pub fn is_text_like(name: &str) -> bool {
    TEXT_LIKE_BLOCKS.contains(&name)
}

/// Depth-first, document-order view of a nested block list.
pub fn flatten_blocks(blocks: &[Block]) -> Vec<&Block> {
    let mut out = Vec::new();
    for block in blocks {
        out.push(block);
        out.extend(flatten_blocks(&block.inner_blocks));
    }
    out
}

pub fn find_block<'a>(blocks: &'a [Block], client_id: &str) -> Option<&'a Block> {
    flatten_blocks(blocks)
        .into_iter()
        .find(|block| block.client_id == client_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_keeps_document_order() {
        let mut group = Block::new("g", "core/group");
        group.inner_blocks = vec![Block::new("a", "core/paragraph"), Block::new("b", "core/image")];
        let blocks = vec![group, Block::new("c", "core/heading")];
        let ids: Vec<&str> = flatten_blocks(&blocks)
            .iter()
            .map(|block| block.client_id.as_str())
            .collect();
        assert_eq!(ids, ["g", "a", "b", "c"]);
        assert_eq!(find_block(&blocks, "b").map(|b| b.name.as_str()), Some("core/image"));
    }

    #[test]
    fn text_like_categories() {
        assert!(is_text_like("core/paragraph"));
        assert!(is_text_like("core/heading"));
        assert!(!is_text_like("core/image"));
        assert!(!is_text_like("core/group"));
    }
}
