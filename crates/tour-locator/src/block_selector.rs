//! Block-selector expressions
//!
//! `first`, `last`, `selected`, `nth:<i>`, `type:<name>`, `type:<name>:<i>`,
//! `inserted` and `inserted:<marker>`. Indices are zero-based. Everything but
//! `inserted` is answered by the editor's block list; the resulting block ids
//! are mapped to their `[data-block]` wrapper elements.

use std::fmt;
use std::str::FromStr;

use tour_dom::{attr_selector, closest, query_everywhere, DomPort, ElementHandle};
use tour_editor_state::{flatten_blocks, EditorStore};
use tourguide_core_types::{LocatorType, PlaybackSession, Target};

use crate::errors::LocatorError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockSelector {
    First,
    Last,
    Selected,
    Nth(usize),
    Type { name: String, index: Option<usize> },
    Inserted(Option<String>),
}

impl FromStr for BlockSelector {
    type Err = LocatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| LocatorError::invalid(LocatorType::WpBlock.name(), value, reason);
        let trimmed = value.trim();
        match trimmed {
            "first" => return Ok(BlockSelector::First),
            "last" => return Ok(BlockSelector::Last),
            "selected" => return Ok(BlockSelector::Selected),
            "inserted" => return Ok(BlockSelector::Inserted(None)),
            _ => {}
        }

        if let Some(marker) = trimmed.strip_prefix("inserted:") {
            if marker.is_empty() {
                return Err(invalid("empty marker id"));
            }
            return Ok(BlockSelector::Inserted(Some(marker.to_string())));
        }

        if let Some(index) = trimmed.strip_prefix("nth:") {
            return index
                .parse()
                .map(BlockSelector::Nth)
                .map_err(|_| invalid("index must be a non-negative integer"));
        }

        if let Some(rest) = trimmed.strip_prefix("type:") {
            let (name, index) = match rest.rsplit_once(':') {
                Some((name, index)) => match index.parse::<usize>() {
                    Ok(index) => (name, Some(index)),
                    Err(_) => (rest, None),
                },
                None => (rest, None),
            };
            if name.is_empty() {
                return Err(invalid("empty block type"));
            }
            return Ok(BlockSelector::Type {
                name: name.to_string(),
                index,
            });
        }

        Err(invalid("unrecognised block selector"))
    }
}

impl fmt::Display for BlockSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSelector::First => f.write_str("first"),
            BlockSelector::Last => f.write_str("last"),
            BlockSelector::Selected => f.write_str("selected"),
            BlockSelector::Nth(i) => write!(f, "nth:{i}"),
            BlockSelector::Type { name, index: None } => write!(f, "type:{name}"),
            BlockSelector::Type {
                name,
                index: Some(i),
            } => write!(f, "type:{name}:{i}"),
            BlockSelector::Inserted(None) => f.write_str("inserted"),
            BlockSelector::Inserted(Some(marker)) => write!(f, "inserted:{marker}"),
        }
    }
}

impl BlockSelector {
    /// Block ids the expression denotes, in document order.
    pub async fn block_ids(
        &self,
        editor: &dyn EditorStore,
        session: &PlaybackSession,
    ) -> Result<Vec<String>, LocatorError> {
        if let BlockSelector::Inserted(marker) = self {
            let id = match marker {
                Some(marker) => session
                    .current_step_marker(marker)
                    .or_else(|| session.global_marker(marker)),
                None => session.last_inserted(),
            };
            return Ok(id.into_iter().collect());
        }

        if let BlockSelector::Selected = self {
            return Ok(editor.selected_block_id().await?.into_iter().collect());
        }

        let blocks = editor.blocks().await?;
        let ids = match self {
            BlockSelector::First => blocks.first().map(|b| b.client_id.clone()).into_iter().collect(),
            BlockSelector::Last => blocks.last().map(|b| b.client_id.clone()).into_iter().collect(),
            BlockSelector::Nth(i) => blocks.get(*i).map(|b| b.client_id.clone()).into_iter().collect(),
            BlockSelector::Type { name, index } => {
                let matching: Vec<String> = flatten_blocks(&blocks)
                    .into_iter()
                    .filter(|block| &block.name == name)
                    .map(|block| block.client_id.clone())
                    .collect();
                match index {
                    Some(i) => matching.into_iter().nth(*i).into_iter().collect(),
                    None => matching,
                }
            }
            BlockSelector::Selected | BlockSelector::Inserted(_) => Vec::new(),
        };
        Ok(ids)
    }

    /// Wrapper elements of the denoted blocks, searched in both documents.
    pub async fn elements(
        &self,
        dom: &dyn DomPort,
        editor: &dyn EditorStore,
        session: &PlaybackSession,
    ) -> Result<Vec<ElementHandle>, LocatorError> {
        let ids = self.block_ids(editor, session).await?;
        Ok(ids
            .iter()
            .flat_map(|id| block_element(dom, id))
            .collect())
    }
}

/// Rendered wrapper of block `client_id`, if it is in either document.
pub fn block_element(dom: &dyn DomPort, client_id: &str) -> Option<ElementHandle> {
    query_everywhere(dom, &attr_selector("data-block", client_id))
        .into_iter()
        .next()
}

/// Block id of the structural unit enclosing `element`.
pub fn enclosing_block_id(dom: &dyn DomPort, element: ElementHandle) -> Option<String> {
    closest(dom, element, "[data-block]").and_then(|block| dom.attribute(block, "data-block"))
}

/// Block type a step's target expects to exist, from its constraints or
/// from a `type:` block locator or a `data-type` attribute locator.
pub fn expected_block_type(target: &Target) -> Option<String> {
    if let Some(block_type) = target.constraints.block_type.as_ref().filter(|t| !t.is_empty()) {
        return Some(block_type.clone());
    }
    target.ordered_locators().into_iter().find_map(|locator| match locator.kind {
        LocatorType::WpBlock => match locator.value.parse::<BlockSelector>() {
            Ok(BlockSelector::Type { name, .. }) => Some(name),
            _ => None,
        },
        LocatorType::DataAttribute => locator
            .value
            .strip_prefix("data-type:")
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tour_editor_state::{Block, InMemoryEditorStore};
    use tourguide_core_types::{Locator, TargetConstraints};

    #[test]
    fn parses_every_form() {
        assert_eq!("first".parse::<BlockSelector>().unwrap(), BlockSelector::First);
        assert_eq!("nth:2".parse::<BlockSelector>().unwrap(), BlockSelector::Nth(2));
        assert_eq!(
            "type:core/image:1".parse::<BlockSelector>().unwrap(),
            BlockSelector::Type {
                name: "core/image".into(),
                index: Some(1)
            }
        );
        assert_eq!(
            "type:core/paragraph".parse::<BlockSelector>().unwrap(),
            BlockSelector::Type {
                name: "core/paragraph".into(),
                index: None
            }
        );
        assert_eq!(
            "inserted:m1".parse::<BlockSelector>().unwrap(),
            BlockSelector::Inserted(Some("m1".into()))
        );
        assert!("nth:-1".parse::<BlockSelector>().is_err());
        assert!("somewhere".parse::<BlockSelector>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for text in ["last", "selected", "type:core/image:3", "inserted", "inserted:m"] {
            assert_eq!(text.parse::<BlockSelector>().unwrap().to_string(), text);
        }
    }

    #[tokio::test]
    async fn resolves_against_editor_and_session() {
        let store = InMemoryEditorStore::new().with_blocks(vec![
            Block::new("p1", "core/paragraph"),
            Block::new("i1", "core/image"),
            Block::new("p2", "core/paragraph"),
        ]);
        let session = PlaybackSession::new();
        session.enter_step(0);
        session.record_insert("m1", "p2");

        let ids = |sel: &str| {
            let sel: BlockSelector = sel.parse().unwrap();
            let store = &store;
            let session = &session;
            async move { sel.block_ids(store, session).await.unwrap() }
        };

        assert_eq!(ids("first").await, ["p1"]);
        assert_eq!(ids("last").await, ["p2"]);
        assert_eq!(ids("type:core/paragraph").await, ["p1", "p2"]);
        assert_eq!(ids("type:core/paragraph:1").await, ["p2"]);
        assert_eq!(ids("nth:1").await, ["i1"]);
        assert_eq!(ids("inserted:m1").await, ["p2"]);
        assert!(ids("inserted:other").await.is_empty());
        assert!(ids("selected").await.is_empty());

        store.select_block("i1").await.unwrap();
        assert_eq!(ids("selected").await, ["i1"]);
    }

    #[test]
    fn expected_type_sources() {
        let by_constraint = Target::new(vec![]).with_constraints(TargetConstraints {
            block_type: Some("core/image".into()),
            ..TargetConstraints::default()
        });
        assert_eq!(expected_block_type(&by_constraint).as_deref(), Some("core/image"));

        let by_locator = Target::new(vec![Locator::new(LocatorType::WpBlock, "type:core/heading", 90)]);
        assert_eq!(expected_block_type(&by_locator).as_deref(), Some("core/heading"));

        let by_data = Target::new(vec![Locator::new(
            LocatorType::DataAttribute,
            "data-type:core/quote",
            70,
        )]);
        assert_eq!(expected_block_type(&by_data).as_deref(), Some("core/quote"));

        let none = Target::new(vec![Locator::new(LocatorType::Css, "#x", 90)]);
        assert_eq!(expected_block_type(&none), None);
    }
}
