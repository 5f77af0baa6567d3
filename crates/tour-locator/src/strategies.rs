//! Per-type candidate finders
//!
//! Each strategy turns one locator value into zero or more candidate
//! elements. Filtering by constraints happens in the resolver.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use tour_dom::{attr_selector, quote_attr_value, DomPort, ElementHandle, SearchScope};
use tour_editor_state::EditorStore;
use tourguide_core_types::{LocatorType, PlaybackSession};

use crate::aria::{accessible_name, names_match, query_role};
use crate::block_selector::BlockSelector;
use crate::errors::LocatorError;

/// Where a strategy searches.
#[derive(Clone, Copy)]
pub struct SearchContext<'a> {
    pub dom: &'a dyn DomPort,
    pub scope: SearchScope,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    async fn find(
        &self,
        ctx: SearchContext<'_>,
        value: &str,
    ) -> Result<Vec<ElementHandle>, LocatorError>;

    fn locator_type(&self) -> LocatorType;

    fn name(&self) -> &'static str {
        self.locator_type().name()
    }
}

/// Raw CSS selector.
pub struct CssStrategy;

#[async_trait]
impl Strategy for CssStrategy {
    async fn find(
        &self,
        ctx: SearchContext<'_>,
        value: &str,
    ) -> Result<Vec<ElementHandle>, LocatorError> {
        Ok(ctx.dom.query_all(ctx.scope, value)?)
    }

    fn locator_type(&self) -> LocatorType {
        LocatorType::Css
    }
}

/// `role` or `role:accessible name`.
pub struct RoleStrategy;

#[async_trait]
impl Strategy for RoleStrategy {
    async fn find(
        &self,
        ctx: SearchContext<'_>,
        value: &str,
    ) -> Result<Vec<ElementHandle>, LocatorError> {
        let (role, name) = match value.split_once(':') {
            Some((role, name)) => (role.trim(), Some(name)),
            None => (value.trim(), None),
        };
        if role.is_empty() {
            return Err(LocatorError::invalid(self.name(), value, "empty role"));
        }

        let candidates = query_role(ctx.dom, ctx.scope, &role.to_ascii_lowercase());
        Ok(match name.filter(|n| !n.trim().is_empty()) {
            Some(name) => candidates
                .into_iter()
                .filter(|el| {
                    accessible_name(ctx.dom, *el)
                        .map(|actual| names_match(&actual, name))
                        .unwrap_or(false)
                })
                .collect(),
            None => candidates,
        })
    }

    fn locator_type(&self) -> LocatorType {
        LocatorType::Role
    }
}

/// `data-testid` value.
pub struct TestIdStrategy;

#[async_trait]
impl Strategy for TestIdStrategy {
    async fn find(
        &self,
        ctx: SearchContext<'_>,
        value: &str,
    ) -> Result<Vec<ElementHandle>, LocatorError> {
        Ok(ctx
            .dom
            .query_all(ctx.scope, &attr_selector("data-testid", value))?)
    }

    fn locator_type(&self) -> LocatorType {
        LocatorType::TestId
    }
}

/// `data-attr` (presence) or `data-attr:value` (exact).
pub struct DataAttributeStrategy;

#[async_trait]
impl Strategy for DataAttributeStrategy {
    async fn find(
        &self,
        ctx: SearchContext<'_>,
        value: &str,
    ) -> Result<Vec<ElementHandle>, LocatorError> {
        let (attr, expected) = match value.split_once(':') {
            Some((attr, expected)) => (attr.trim(), Some(expected)),
            None => (value.trim(), None),
        };
        let valid_name = !attr.is_empty()
            && attr
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_name {
            return Err(LocatorError::invalid(self.name(), value, "bad attribute name"));
        }

        let selector = match expected.filter(|v| !v.is_empty()) {
            Some(expected) => attr_selector(attr, expected),
            None => format!("[{attr}]"),
        };
        Ok(ctx.dom.query_all(ctx.scope, &selector)?)
    }

    fn locator_type(&self) -> LocatorType {
        LocatorType::DataAttribute
    }
}

/// Substring of `aria-label`.
pub struct AriaLabelStrategy;

#[async_trait]
impl Strategy for AriaLabelStrategy {
    async fn find(
        &self,
        ctx: SearchContext<'_>,
        value: &str,
    ) -> Result<Vec<ElementHandle>, LocatorError> {
        if value.is_empty() {
            return Ok(Vec::new());
        }
        Ok(ctx
            .dom
            .query_all(ctx.scope, &format!("[aria-label*={}]", quote_attr_value(value)))?)
    }

    fn locator_type(&self) -> LocatorType {
        LocatorType::AriaLabel
    }
}

/// `container >> inner`: inner matches inside any container match.
pub struct ContextualStrategy;

#[async_trait]
impl Strategy for ContextualStrategy {
    async fn find(
        &self,
        ctx: SearchContext<'_>,
        value: &str,
    ) -> Result<Vec<ElementHandle>, LocatorError> {
        let Some((outer, inner)) = value.split_once(">>") else {
            return Err(LocatorError::invalid(self.name(), value, "expected 'container >> element'"));
        };
        let (outer, inner) = (outer.trim(), inner.trim());
        if outer.is_empty() || inner.is_empty() {
            return Err(LocatorError::invalid(self.name(), value, "empty half"));
        }

        let mut found = Vec::new();
        for container in ctx.dom.query_all(ctx.scope, outer)? {
            for element in ctx.dom.query_within(container, inner)? {
                if !found.contains(&element) {
                    found.push(element);
                }
            }
        }
        Ok(found)
    }

    fn locator_type(&self) -> LocatorType {
        LocatorType::Contextual
    }
}

/// Block-selector expressions, answered through the editor state.
pub struct BlockStrategy {
    editor: Arc<dyn EditorStore>,
    session: PlaybackSession,
}

impl BlockStrategy {
    pub fn new(editor: Arc<dyn EditorStore>, session: PlaybackSession) -> Self {
        Self { editor, session }
    }
}

#[async_trait]
impl Strategy for BlockStrategy {
    async fn find(
        &self,
        ctx: SearchContext<'_>,
        value: &str,
    ) -> Result<Vec<ElementHandle>, LocatorError> {
        let selector: BlockSelector = value.parse()?;
        let elements = selector
            .elements(ctx.dom, self.editor.as_ref(), &self.session)
            .await?;
        debug!(selector = %selector, found = elements.len(), "block selector");
        Ok(elements)
    }

    fn locator_type(&self) -> LocatorType {
        LocatorType::WpBlock
    }
}
