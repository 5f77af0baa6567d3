//! `insertBlock`: reuse before create
//!
//! Lookup order:
//! 1. the block this step recorded under the marker
//! 2. the block recorded under the marker by any step
//! 3. an unclaimed block of the exact requested type
//! 4. the last block in the document, when it and the requested type are
//!    both text-like
//!
//! Only when all four miss is a new block inserted and recorded. Blocks
//! recorded under another marker are never adopted. Nothing is created or
//! recorded once the run is cancelled or the session has been cleared.

use serde_json::Value;
use tracing::{debug, info};

use tour_dom::DomError;
use tour_editor_state::{flatten_blocks, is_text_like, Block, EditorStoreError};
use tour_locator::block_element;

use crate::engine::{PreconditionEngine, RunScope};
use crate::errors::PreconditionError;
use crate::types::Applied;

/// How an existing block was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reuse {
    StepMarker,
    GlobalMarker,
    SameType,
    TextLike,
}

impl PreconditionEngine {
    pub(crate) async fn insert_block(
        &self,
        name: &str,
        attributes: Value,
        marker: &str,
        scope: &RunScope,
    ) -> Result<Applied, PreconditionError> {
        let blocks = self.editor.blocks().await?;
        scope.ensure_live(&self.session)?;

        if let Some((client_id, how)) = self.find_reusable(&blocks, name, marker, scope.epoch) {
            debug!(block = %client_id, marker, reuse = ?how, "reusing block");
            if how != Reuse::StepMarker && !self.session.record_adopted_at(scope.epoch, marker, &client_id) {
                return Err(PreconditionError::Cancelled);
            }
            return self.settle_on_block(&client_id, scope).await;
        }

        let block = self.editor.insert_block(name, attributes).await?;
        info!(block = %block.client_id, name, marker, "inserted block");
        if !self.session.record_insert_at(scope.epoch, marker, &block.client_id) {
            debug!(block = %block.client_id, marker, "session cleared; insert not recorded");
            return Err(PreconditionError::Cancelled);
        }
        self.settle_on_block(&block.client_id, scope).await
    }

    fn find_reusable(
        &self,
        blocks: &[Block],
        name: &str,
        marker: &str,
        epoch: u64,
    ) -> Option<(String, Reuse)> {
        let all = flatten_blocks(blocks);
        let exists = |id: &str| {
            all.iter().any(|block| block.client_id == id)
                || block_element(self.dom.as_ref(), id).is_some()
        };

        if let Some(id) = self.session.current_step_marker(marker) {
            if exists(&id) {
                return Some((id, Reuse::StepMarker));
            }
            debug!(block = %id, marker, "recorded block is gone");
            self.session.forget_marker_at(epoch, marker);
        }

        if let Some(id) = self.session.global_marker(marker) {
            if exists(&id) {
                return Some((id, Reuse::GlobalMarker));
            }
            self.session.forget_marker_at(epoch, marker);
        }

        let unclaimed = |block: &&Block| !self.session.is_claimed_by_other(&block.client_id, marker);

        if let Some(block) = all.iter().copied().filter(unclaimed).find(|block| block.name == name) {
            return Some((block.client_id.clone(), Reuse::SameType));
        }

        if is_text_like(name) {
            if let Some(last) = all.last().copied().filter(unclaimed) {
                if last.is_text_like() {
                    return Some((last.client_id.clone(), Reuse::TextLike));
                }
            }
        }
        None
    }

    /// Wait for the block to render, select it and move focus into it.
    async fn settle_on_block(
        &self,
        client_id: &str,
        scope: &RunScope,
    ) -> Result<Applied, PreconditionError> {
        let dom = self.dom.as_ref();
        let editor = self.editor.as_ref();

        let wrapper = self
            .wait_for(
                &format!("block {client_id} to render"),
                self.config.block_appear_timeout(),
                move || async move { Ok::<_, DomError>(block_element(dom, client_id)) },
            )
            .await?;
        scope.ensure_live(&self.session)?;

        if editor.selected_block_id().await?.as_deref() != Some(client_id) {
            editor.select_block(client_id).await?;
            self.wait_until(&format!("block {client_id} to be selected"), move || async move {
                Ok::<_, EditorStoreError>(editor.selected_block_id().await?.as_deref() == Some(client_id))
            })
            .await?;
        }

        self.focus_into(wrapper);
        Ok(Applied::block(client_id, Some(wrapper)))
    }
}
