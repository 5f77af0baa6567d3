//! Wait for the block a following step expects

use std::time::Duration;

use tracing::{debug, info};

use tour_dom::{attr_selector, query_everywhere, DomPort};
use tour_editor_state::{flatten_blocks, EditorStore, EditorStoreError};
use tour_locator::expected_block_type;
use tourguide_core_types::{poll_until, Step};

use crate::types::LookAhead;

/// Before advancing onto `next`, give the block type its target expects up
/// to `timeout` to exist, in the editor store or in either document.
pub async fn wait_for_next_step_block(
    dom: &dyn DomPort,
    editor: &dyn EditorStore,
    next: &Step,
    timeout: Duration,
    interval: Duration,
) -> LookAhead {
    let Some(block_type) = expected_block_type(&next.target) else {
        return LookAhead::not_needed(None);
    };

    let probe = || {
        let block_type = block_type.as_str();
        async move { block_exists(dom, editor, block_type).await }
    };

    if probe().await.unwrap_or(false) {
        debug!(%block_type, "next step's block already present");
        return LookAhead::not_needed(Some(block_type.clone()));
    }

    debug!(%block_type, ?timeout, "waiting for next step's block");
    let success = poll_until(probe, timeout, interval).await;
    if success {
        info!(%block_type, "next step's block appeared");
    } else {
        debug!(%block_type, "next step's block did not appear in time");
    }
    LookAhead {
        waited: true,
        block_type: Some(block_type),
        success,
    }
}

async fn block_exists(
    dom: &dyn DomPort,
    editor: &dyn EditorStore,
    block_type: &str,
) -> Result<bool, EditorStoreError> {
    if !query_everywhere(dom, &attr_selector("data-type", block_type)).is_empty() {
        return Ok(true);
    }
    let blocks = editor.blocks().await?;
    Ok(flatten_blocks(&blocks)
        .iter()
        .any(|block| block.name == block_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tour_dom::MemoryDom;
    use tour_editor_state::{Block, InMemoryEditorStore};
    use tourguide_core_types::{Locator, LocatorType, Target};

    fn image_step() -> Step {
        Step::new("Add an image").with_target(Target::new(vec![Locator::new(
            LocatorType::WpBlock,
            "type:core/image",
            90,
        )]))
    }

    #[tokio::test(start_paused = true)]
    async fn steps_without_a_block_type_do_not_wait() {
        let dom = MemoryDom::new();
        let editor = InMemoryEditorStore::new();
        let step = Step::new("Plain").with_target(Target::new(vec![Locator::new(
            LocatorType::Css,
            ".publish",
            50,
        )]));
        let result = wait_for_next_step_block(
            &dom,
            &editor,
            &step,
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(result, LookAhead::not_needed(None));
    }

    #[tokio::test(start_paused = true)]
    async fn present_block_is_not_a_wait() {
        let dom = Arc::new(MemoryDom::new());
        let editor = InMemoryEditorStore::with_dom(dom.clone())
            .with_blocks(vec![Block::new("img-1", "core/image")]);
        let result = wait_for_next_step_block(
            dom.as_ref(),
            &editor,
            &image_step(),
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .await;
        assert!(!result.waited);
        assert!(result.success);
        assert_eq!(result.block_type.as_deref(), Some("core/image"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_block_times_out() {
        let dom = MemoryDom::new();
        let editor = InMemoryEditorStore::new();
        let start = tokio::time::Instant::now();
        let result = wait_for_next_step_block(
            &dom,
            &editor,
            &image_step(),
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(
            result,
            LookAhead {
                waited: true,
                block_type: Some("core/image".into()),
                success: false,
            }
        );
    }
}
