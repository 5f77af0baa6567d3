//! Precondition engine
//!
//! A fixed catalog of twelve UI-state operations (`ensureEditor`,
//! `ensureSidebarOpen`, `ensureSidebarClosed`, `selectSidebarTab`,
//! `openInserter`, `closeInserter`, `selectBlock`, `focusElement`,
//! `scrollIntoView`, `openModal`, `closeModal`, `insertBlock`) run before a
//! step is shown. Each is idempotent and backed by a bounded poll; each
//! succeeds or fails on its own.

mod dom_ops;
mod editor_ops;
pub mod engine;
pub mod errors;
mod insert;
pub mod types;

pub use dom_ops::DEFAULT_MODAL_SELECTOR;
pub use engine::{normalize_sidebar, PreconditionEngine};
pub use errors::PreconditionError;
pub use types::{Applied, PreconditionBatch, PreconditionResult};
