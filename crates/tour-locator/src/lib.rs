//! Locator capture and resolution
//!
//! - [`capture`] turns a live element into a weighted locator bundle
//!   (test id, id, role + name, data attributes, a short CSS path, and
//!   fallback-only aria-label / landmark-contextual locators)
//! - [`LocatorResolver`] walks a bundle in priority order against the main
//!   document or the editor frame, filters by constraints and picks exactly
//!   one element
//! - [`BlockSelector`] is the block-selector mini-language behind `wpBlock`
//!   locators and look-ahead block detection
//! - [`capture_element_context`] summarizes an element for the drafting service

pub mod aria;
pub mod block_selector;
pub mod capture;
pub mod context;
pub mod errors;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use block_selector::{block_element, enclosing_block_id, expected_block_type, BlockSelector};
pub use capture::capture;
pub use context::{capture_element_context, AncestorSummary, ElementContext};
pub use errors::{LocatorError, NO_MATCH_MESSAGE};
pub use resolver::LocatorResolver;
pub use types::{RecoveryHook, Resolution};
