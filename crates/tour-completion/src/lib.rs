//! Completion watchers
//!
//! [`CompletionWatcher::watch`] turns a step's completion rule into a
//! [`CompletionWatch`]: an awaitable that settles exactly once as satisfied,
//! timed out or cancelled. Supported rules are `clickTarget`,
//! `domValueChanged`, `wpData`, `manual`, `elementAppear`,
//! `elementDisappear` and `customEvent`; anything else is watched as
//! `manual`.

pub mod conditions;
pub mod errors;
pub mod types;
pub mod watcher;

pub use conditions::{observe_value, Condition, WpDataQuery};
pub use errors::CompletionError;
pub use types::{is_truthy, CompletionOutcome, WpDataOperator};
pub use watcher::{CompletionWatch, CompletionWatcher, WatchControl};
