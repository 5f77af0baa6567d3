//! Playback timing and editor selector configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables shared by every engine component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Poll-until timeout for each precondition operation.
    pub precondition_timeout_ms: u64,

    /// Interval between condition probes.
    pub poll_interval_ms: u64,

    /// Clicks arriving this soon after arming a `clickTarget` watcher are ignored.
    pub click_grace_ms: u64,

    /// Delay between target resolution and arming the completion watcher.
    pub completion_settle_ms: u64,

    /// Upper bound on waiting for the next step's block before advancing.
    pub lookahead_timeout_ms: u64,

    /// Wait for a freshly inserted block to show up in the document.
    pub block_appear_timeout_ms: u64,

    /// Selectors that only exist inside the embedded editor frame.
    pub iframe_regions: Vec<String>,

    /// Any of these marks the editor canvas as rendered.
    pub editor_root_selectors: Vec<String>,

    /// Sidebar tab buttons; `{tab}` is replaced by the requested tab id.
    pub sidebar_tab_selector: String,

    /// Close buttons searched inside an open modal.
    pub modal_close_selector: String,

    /// Default sidebar opened by `ensureSidebarOpen` without an argument.
    pub default_sidebar: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            precondition_timeout_ms: 2000,
            poll_interval_ms: 100,
            click_grace_ms: 300,
            completion_settle_ms: 100,
            lookahead_timeout_ms: 5000,
            block_appear_timeout_ms: 2000,
            iframe_regions: vec![
                ".editor-styles-wrapper".to_string(),
                ".block-editor-writing-flow".to_string(),
                ".is-root-container".to_string(),
                ".wp-block-post-title".to_string(),
            ],
            editor_root_selectors: vec![
                ".block-editor-writing-flow".to_string(),
                ".editor-styles-wrapper".to_string(),
                ".is-root-container".to_string(),
            ],
            sidebar_tab_selector: "[data-tab-id=\"{tab}\"], [role=\"tab\"][id$=\"{tab}\"]"
                .to_string(),
            modal_close_selector: "button[aria-label=\"Close\"], .components-modal__header button"
                .to_string(),
            default_sidebar: "edit-post/document".to_string(),
        }
    }
}

impl PlaybackConfig {
    pub fn precondition_timeout(&self) -> Duration {
        Duration::from_millis(self.precondition_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn click_grace(&self) -> Duration {
        Duration::from_millis(self.click_grace_ms)
    }

    pub fn completion_settle(&self) -> Duration {
        Duration::from_millis(self.completion_settle_ms)
    }

    pub fn lookahead_timeout(&self) -> Duration {
        Duration::from_millis(self.lookahead_timeout_ms)
    }

    pub fn block_appear_timeout(&self) -> Duration {
        Duration::from_millis(self.block_appear_timeout_ms)
    }

    /// True when `selector` names a region that only exists inside the editor frame.
    pub fn is_iframe_region(&self, selector: &str) -> bool {
        let selector = selector.trim();
        self.iframe_regions
            .iter()
            .any(|region| selector.starts_with(region.as_str()))
    }

    pub fn sidebar_tab_selector_for(&self, tab: &str) -> String {
        self.sidebar_tab_selector.replace("{tab}", tab)
    }
}
