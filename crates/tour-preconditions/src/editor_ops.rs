//! Editor-chrome preconditions driven through the editor store

use tracing::debug;

use tour_dom::{query_everywhere, DomPort};
use tour_editor_state::{EditorStore, EditorStoreError};
use tour_locator::{block_element, BlockSelector};

use crate::engine::{normalize_sidebar, PreconditionEngine};
use crate::errors::PreconditionError;
use crate::types::Applied;

impl PreconditionEngine {
    /// Store reports ready and the editor canvas has rendered.
    pub(crate) async fn ensure_editor(&self) -> Result<Applied, PreconditionError> {
        let editor = self.editor.as_ref();
        let dom = self.dom.as_ref();
        let roots = &self.config.editor_root_selectors;
        self.wait_until("editor ready", move || async move {
            Ok::<_, EditorStoreError>(
                editor.is_editor_ready().await?
                    && (roots.is_empty()
                        || roots
                            .iter()
                            .any(|selector| !query_everywhere(dom, selector).is_empty())),
            )
        })
        .await?;
        Ok(Applied::nothing())
    }

    pub(crate) async fn ensure_sidebar_open(
        &self,
        sidebar: Option<&str>,
    ) -> Result<Applied, PreconditionError> {
        let editor = self.editor.as_ref();
        let wanted = sidebar.map(normalize_sidebar);

        if editor.is_sidebar_open().await? {
            let active = editor.active_sidebar().await?;
            match &wanted {
                None => return Ok(Applied::nothing()),
                Some(name) if active.as_deref() == Some(name.as_str()) => {
                    return Ok(Applied::nothing())
                }
                Some(_) => {}
            }
        }

        let target = wanted.unwrap_or_else(|| normalize_sidebar(&self.config.default_sidebar));
        debug!(sidebar = %target, "opening sidebar");
        editor.open_sidebar(&target).await?;

        let target = target.as_str();
        self.wait_until(&format!("sidebar {target} to open"), move || async move {
            Ok::<_, EditorStoreError>(
                editor.is_sidebar_open().await?
                    && editor.active_sidebar().await?.as_deref() == Some(target),
            )
        })
        .await?;
        Ok(Applied::nothing())
    }

    pub(crate) async fn ensure_sidebar_closed(&self) -> Result<Applied, PreconditionError> {
        let editor = self.editor.as_ref();
        if !editor.is_sidebar_open().await? {
            return Ok(Applied::nothing());
        }
        editor.close_sidebar().await?;
        self.wait_until("sidebar to close", move || async move {
            Ok::<_, EditorStoreError>(!editor.is_sidebar_open().await?)
        })
        .await?;
        Ok(Applied::nothing())
    }

    /// Switch the settings sidebar to `tab`. The store is asked first; if it
    /// refuses, the tab button in the document is clicked instead.
    pub(crate) async fn select_sidebar_tab(&self, tab: &str) -> Result<Applied, PreconditionError> {
        let editor = self.editor.as_ref();
        let dom = self.dom.as_ref();
        let target = normalize_sidebar(tab);
        let tab_selector = self.config.sidebar_tab_selector_for(&target);

        let current = match (editor.is_sidebar_open().await, editor.active_sidebar().await) {
            (Ok(open), Ok(active)) => open && active.as_deref() == Some(target.as_str()),
            _ => false,
        };
        if current || tab_is_selected(dom, &tab_selector) {
            return Ok(Applied::nothing());
        }

        if let Err(err) = editor.open_sidebar(&target).await {
            debug!(tab = %target, error = %err, "store refused tab switch, clicking tab");
            let button = query_everywhere(dom, &tab_selector)
                .into_iter()
                .next()
                .ok_or_else(|| PreconditionError::ElementNotFound(tab_selector.clone()))?;
            dom.click(button)?;
        }

        let (target, tab_selector) = (target.as_str(), tab_selector.as_str());
        self.wait_until(&format!("sidebar tab {target}"), move || async move {
            Ok::<_, EditorStoreError>(
                tab_is_selected(dom, tab_selector)
                    || editor.active_sidebar().await?.as_deref() == Some(target),
            )
        })
        .await?;
        Ok(Applied::nothing())
    }

    pub(crate) async fn set_inserter(&self, open: bool) -> Result<Applied, PreconditionError> {
        let editor = self.editor.as_ref();
        if editor.is_inserter_open().await? == open {
            return Ok(Applied::nothing());
        }
        editor.set_inserter_open(open).await?;
        let condition = if open { "inserter to open" } else { "inserter to close" };
        self.wait_until(condition, move || async move {
            Ok::<_, EditorStoreError>(editor.is_inserter_open().await? == open)
        })
        .await?;
        Ok(Applied::nothing())
    }

    /// Select a block by client id or block-selector expression.
    pub(crate) async fn select_block(&self, block: &str) -> Result<Applied, PreconditionError> {
        let editor = self.editor.as_ref();
        let dom = self.dom.as_ref();

        let client_id = match block.parse::<BlockSelector>() {
            Ok(selector) => selector
                .block_ids(editor, &self.session)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| PreconditionError::ElementNotFound(format!("block {selector}")))?,
            Err(_) => block.to_string(),
        };

        if editor.selected_block_id().await?.as_deref() != Some(client_id.as_str()) {
            editor.select_block(&client_id).await?;
            let id = client_id.as_str();
            self.wait_until(&format!("block {id} to be selected"), move || async move {
                Ok::<_, EditorStoreError>(editor.selected_block_id().await?.as_deref() == Some(id))
            })
            .await?;
        }

        Ok(Applied::block(client_id.clone(), block_element(dom, &client_id)))
    }
}

/// The tab button exists and reports itself selected.
fn tab_is_selected(dom: &dyn DomPort, selector: &str) -> bool {
    query_everywhere(dom, selector).into_iter().any(|tab| {
        dom.attribute(tab, "aria-selected").as_deref() == Some("true")
            || dom
                .attribute(tab, "class")
                .map(|class| class.split_whitespace().any(|c| c == "is-active"))
                .unwrap_or(false)
    })
}
