//! Document preconditions: focus, scroll and modals

use tracing::debug;

use tour_dom::{is_visible, query_everywhere, scroll_into_view, selector, DomError, DomPort, ElementHandle};

use crate::engine::PreconditionEngine;
use crate::errors::PreconditionError;
use crate::types::Applied;

/// Dialog frames matched when a step does not name its modal.
pub const DEFAULT_MODAL_SELECTOR: &str = ".components-modal__frame, [role=\"dialog\"]";

const FOCUSABLE: &str = "input, textarea, select, button, a[href], [tabindex]";

impl PreconditionEngine {
    pub(crate) async fn focus_element(&self, selector: &str) -> Result<Applied, PreconditionError> {
        let dom = self.dom.as_ref();
        let element = self.wait_for_element(selector).await?;

        let already_focused = dom
            .scope_of(element)
            .and_then(|scope| dom.active_element(scope))
            == Some(element);
        if !already_focused {
            dom.focus(element)?;
            if dom.is_content_editable(element) {
                dom.place_caret_at_end(element)?;
            }
        }
        Ok(Applied::element(element))
    }

    pub(crate) async fn scroll_to(&self, selector: &str) -> Result<Applied, PreconditionError> {
        let element = self.wait_for_element(selector).await?;
        scroll_into_view(self.dom.as_ref(), element);
        Ok(Applied::element(element))
    }

    pub(crate) async fn open_modal(
        &self,
        trigger: &str,
        modal: Option<&str>,
    ) -> Result<Applied, PreconditionError> {
        let dom = self.dom.as_ref();
        let modal = modal.unwrap_or(DEFAULT_MODAL_SELECTOR);
        check_selector(modal)?;
        if let Some(open) = visible_match(dom, modal) {
            return Ok(Applied::element(open));
        }

        let trigger = self.wait_for_element(trigger).await?;
        debug!(%trigger, "clicking modal trigger");
        dom.click(trigger)?;

        let element = self
            .wait_for(
                &format!("modal {modal}"),
                self.config.precondition_timeout(),
                move || async move { Ok::<_, DomError>(visible_match(dom, modal)) },
            )
            .await?;
        Ok(Applied::element(element))
    }

    pub(crate) async fn close_modal(&self, modal: Option<&str>) -> Result<Applied, PreconditionError> {
        let dom = self.dom.as_ref();
        let modal = modal.unwrap_or(DEFAULT_MODAL_SELECTOR);
        check_selector(modal)?;
        let Some(open) = visible_match(dom, modal) else {
            return Ok(Applied::nothing());
        };

        let close = dom
            .query_within(open, &self.config.modal_close_selector)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                PreconditionError::ElementNotFound(format!(
                    "{} inside {}",
                    self.config.modal_close_selector, modal
                ))
            })?;
        dom.click(close)?;

        self.wait_until(&format!("modal {modal} to close"), move || async move {
            Ok::<_, DomError>(visible_match(dom, modal).is_none())
        })
        .await?;
        Ok(Applied::nothing())
    }

    /// First match of `selector` in either document, polled until present.
    pub(crate) async fn wait_for_element(
        &self,
        selector: &str,
    ) -> Result<ElementHandle, PreconditionError> {
        check_selector(selector)?;
        let dom = self.dom.as_ref();
        self.wait_for(
            &format!("element {selector}"),
            self.config.precondition_timeout(),
            move || async move { Ok::<_, DomError>(query_everywhere(dom, selector).into_iter().next()) },
        )
        .await
        .map_err(|_| PreconditionError::ElementNotFound(selector.to_string()))
    }

    /// Move focus into a block wrapper: its first editable descendant with
    /// the caret at the end, else its first focusable descendant.
    pub(crate) fn focus_into(&self, wrapper: ElementHandle) -> Option<ElementHandle> {
        let dom = self.dom.as_ref();
        let first = |selector: &str| {
            dom.query_within(wrapper, selector)
                .ok()
                .and_then(|found| found.into_iter().next())
        };

        let editable = if dom.is_content_editable(wrapper) {
            Some(wrapper)
        } else {
            first("[contenteditable=\"true\"]")
        };
        if let Some(editable) = editable {
            if let Err(err) = dom
                .focus(editable)
                .and_then(|_| dom.place_caret_at_end(editable))
            {
                debug!(element = %editable, error = %err, "could not place caret");
            }
            return Some(editable);
        }

        let focusable = first(FOCUSABLE)?;
        if let Err(err) = dom.focus(focusable) {
            debug!(element = %focusable, error = %err, "could not focus block control");
        }
        Some(focusable)
    }
}

fn check_selector(value: &str) -> Result<(), PreconditionError> {
    selector::parse(value)?;
    Ok(())
}

fn visible_match(dom: &dyn DomPort, selector: &str) -> Option<ElementHandle> {
    query_everywhere(dom, selector)
        .into_iter()
        .find(|element| is_visible(dom, *element))
}
